use std::fs;
use std::path::{Path, PathBuf};

use sln_merge::{BuildTree, Merger, SolutionWriter};

const HEADER: &str = "\u{feff}\r\nMicrosoft Visual Studio Solution File, Format Version 12.00\r\n\
# Visual Studio Version 17\r\n\
VisualStudioVersion = 17.0.31903.59\r\n\
MinimumVisualStudioVersion = 10.0.40219.1\r\n";

const CSHARP: &str = "{9A19103F-16F7-4668-BE54-9A1E7A4F7556}";

fn project_line(name: &str, path: &str, guid: &str) -> String {
    format!("Project(\"{CSHARP}\") = \"{name}\", \"{path}\", \"{guid}\"\r\nEndProject\r\n")
}

fn global(config_lines: &[&str]) -> String {
    let mut out = String::from("Global\r\n\tGlobalSection(SolutionConfigurationPlatforms) = preSolution\r\n");
    out.push_str("\t\tDebug|Any CPU = Debug|Any CPU\r\n");
    out.push_str("\tEndGlobalSection\r\n\tGlobalSection(ProjectConfigurationPlatforms) = postSolution\r\n");
    for line in config_lines {
        out.push_str(&format!("\t\t{line}\r\n"));
    }
    out.push_str("\tEndGlobalSection\r\n\tGlobalSection(SolutionProperties) = preSolution\r\n");
    out.push_str("\t\tHideSolutionNode = FALSE\r\n\tEndGlobalSection\r\nEndGlobal\r\n");
    out
}

fn csproj(items: &str) -> String {
    format!(
        "<Project Sdk=\"Microsoft.NET.Sdk\">\n  <PropertyGroup>\n    <TargetFramework>net8.0</TargetFramework>\n  </PropertyGroup>\n  <ItemGroup>\n{items}\n  </ItemGroup>\n</Project>\n"
    )
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Two repositories on disk: `a` (App → Utils package, Shared) and `b`
/// (Utils, another Shared).
fn fixture(root: &Path) -> (PathBuf, PathBuf) {
    let a = root.join("a");
    write(
        &a.join("src").join("App").join("App.csproj"),
        &csproj("    <PackageReference Include=\"Utils\" Version=\"1.0.0\" />\n    <PackageReference Include=\"Serilog\" Version=\"3.1.1\" />"),
    );
    write(&a.join("Shared").join("Shared.csproj"), &csproj("    <None Include=\"notes.txt\" />"));
    let first = a.join("First.sln");
    write(
        &first,
        &format!(
            "{HEADER}{}{}{}",
            project_line("App", "src\\App\\App.csproj", "{AAAAAAAA-0000-0000-0000-000000000001}"),
            project_line("Shared", "Shared\\Shared.csproj", "{AAAAAAAA-0000-0000-0000-000000000002}"),
            global(&["{AAAAAAAA-0000-0000-0000-000000000001}.Debug|Any CPU.ActiveCfg = Debug|Any CPU"]),
        ),
    );

    let b = root.join("b");
    write(&b.join("Utils").join("Utils.csproj"), &csproj("    <None Include=\"utils.md\" />"));
    write(&b.join("Shared").join("Shared.csproj"), &csproj("    <None Include=\"other.txt\" />"));
    let second = b.join("Second.sln");
    write(
        &second,
        &format!(
            "{HEADER}{}{}{}",
            project_line("Utils", "Utils\\Utils.csproj", "{BBBBBBBB-0000-0000-0000-000000000001}"),
            project_line("Shared", "Shared\\Shared.csproj", "{BBBBBBBB-0000-0000-0000-000000000002}"),
            global(&["{BBBBBBBB-0000-0000-0000-000000000001}.Debug|Any CPU.ActiveCfg = Debug|Any CPU"]),
        ),
    );

    (first, second)
}

fn files_ending_with(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(files_ending_with(&path, suffix));
        } else if path.to_string_lossy().ends_with(suffix) {
            found.push(path);
        }
    }
    found
}

fn includes(tree: &BuildTree, element: &str) -> Vec<String> {
    tree.descendants_named(element)
        .into_iter()
        .filter_map(|n| tree.attribute(n, "Include").map(str::to_string))
        .collect()
}

#[test]
fn merge_and_materialize_two_solutions() {
    let dir = tempfile::tempdir().unwrap();
    let (first, second) = fixture(dir.path());

    let merged = Merger::new().separator('/').merge_files([&first, &second]).unwrap();

    let names: Vec<_> = merged.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["App", "Shared", "Utils", "Shared_Second"]);
    assert_eq!(merged.project("Shared_Second").unwrap().file_path, "Shared_Second\\Shared_Second.csproj");

    let configs = merged.section("ProjectConfigurationPlatforms").unwrap();
    assert_eq!(configs.lines.len(), 2);
    assert_eq!(merged.section("SolutionConfigurationPlatforms").unwrap().lines.len(), 1);

    let app = merged.project("App").unwrap();
    assert_eq!(app.package_references.names().collect::<Vec<_>>(), ["Serilog"]);
    assert_eq!(app.project_references.names().collect::<Vec<_>>(), ["Utils"]);

    let out = dir.path().join("out");
    let sln_path = SolutionWriter::new()
        .separator('/')
        .case_sensitive_paths(true)
        .write_to(&out, &merged)
        .unwrap();
    assert!(sln_path.ends_with("Merged.sln"));

    let text = fs::read_to_string(&sln_path).unwrap();
    assert!(text.starts_with("\u{feff}\r\nMicrosoft Visual Studio Solution File, Format Version 12.00\r\n"));
    assert!(text.contains("\"Shared_Second\", \"Shared_Second\\Shared_Second.csproj\""));
    assert!(text.contains("\t\tHideSolutionNode = FALSE\r\n"));

    let app = BuildTree::from_file(out.join("src").join("App").join("App.csproj")).unwrap();
    assert_eq!(includes(&app, "ProjectReference"), ["../../Utils/Utils.csproj"]);
    assert_eq!(includes(&app, "PackageReference"), ["Serilog"]);
    assert_eq!(includes(&app, "Compile"), ["../../../a/src/App/**/*.cs"]);

    let shared = BuildTree::from_file(out.join("Shared_Second").join("Shared_Second.csproj")).unwrap();
    assert_eq!(includes(&shared, "None"), ["../../b/Shared/other.txt"]);
    assert!(out.join("Utils").join("Utils.csproj").exists());

    // A second identical run changes nothing and leaves no snapshots.
    SolutionWriter::new()
        .separator('/')
        .case_sensitive_paths(true)
        .write_to(&out, &merged)
        .unwrap();
    assert!(files_ending_with(&out, ".back").is_empty());
    assert!(files_ending_with(&out, ".source").is_empty());
}

#[test]
fn mismatched_format_versions_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _) = fixture(dir.path());
    let old = dir.path().join("old").join("Old.sln");
    write(&old, "Microsoft Visual Studio Solution File, Format Version 11.00\r\nGlobal\r\nEndGlobal\r\n");

    let err = Merger::new().merge_files([&first, &old]).unwrap_err();
    assert!(matches!(err, sln_merge::Error::UnsupportedVersionMerge { .. }));
}
