//! Visual Studio solution (`.sln`) reader and writer.
//!
//! A solution file is line oriented:
//!
//! ```text
//! Microsoft Visual Studio Solution File, Format Version 12.00
//! # Visual Studio Version 17
//! VisualStudioVersion = 17.0.31903.59
//! MinimumVisualStudioVersion = 10.0.40219.1
//! Project("{FAE04EC0-…}") = "Core", "Core\Core.csproj", "{0C1E…}"
//!     ProjectSection(ProjectDependencies) = postProject
//!         {A…} = {A…}
//!     EndProjectSection
//! EndProject
//! Global
//!     GlobalSection(SolutionConfigurationPlatforms) = preSolution
//!         Debug|Any CPU = Debug|Any CPU
//!     EndGlobalSection
//! EndGlobal
//! ```
//!
//! The structured header lines (`Project(…) = …` and `…Section(…) = …`) are
//! parsed with [`chumsky`]; block structure is tracked line by line.

use std::path::{Path, PathBuf};

use chumsky::prelude::*;

use crate::error::{Error, Result};
use crate::model::{Project, Section, SolutionConfiguration};
use crate::msbuild::BuildTree;

const FILE_HEADER: &str = "Microsoft Visual Studio Solution File, Format Version";
const TARGET_VERSION_KEY: &str = "VisualStudioVersion";
const MINIMAL_VERSION_KEY: &str = "MinimumVisualStudioVersion";

// ═══════════════════════════════════════════════════════════════════════════════
//  Header-line grammar
// ═══════════════════════════════════════════════════════════════════════════════

type ParseErr<'a> = extra::Err<Simple<'a, char>>;

/// `Project("{type}") = "name", "path", "{guid}"`
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProjectHeader<'a> {
    type_guid: &'a str,
    name: &'a str,
    path: &'a str,
    guid: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Global,
    Project,
}

/// `GlobalSection(Name) = position` or `ProjectSection(Name) = position`
#[derive(Debug, Clone, PartialEq, Eq)]
struct SectionHeader<'a> {
    kind: SectionKind,
    name: &'a str,
    position: &'a str,
}

fn quoted<'a>() -> impl Parser<'a, &'a str, &'a str, ParseErr<'a>> {
    just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
}

fn project_header_parser<'a>() -> impl Parser<'a, &'a str, ProjectHeader<'a>, ParseErr<'a>> {
    just("Project")
        .ignore_then(quoted().delimited_by(just('(').padded(), just(')').padded()))
        .then_ignore(just('=').padded())
        .then(quoted())
        .then_ignore(just(',').padded())
        .then(quoted())
        .then_ignore(just(',').padded())
        .then(quoted())
        .padded()
        .map(|(((type_guid, name), path), guid)| ProjectHeader { type_guid, name, path, guid })
}

fn section_header_parser<'a>() -> impl Parser<'a, &'a str, SectionHeader<'a>, ParseErr<'a>> {
    let kind = just("GlobalSection")
        .to(SectionKind::Global)
        .or(just("ProjectSection").to(SectionKind::Project));

    let name = none_of(')')
        .repeated()
        .at_least(1)
        .to_slice()
        .delimited_by(just('('), just(')'));

    let position = any()
        .filter(|c: &char| !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice();

    kind.then(name)
        .then_ignore(just('=').padded())
        .then(position)
        .padded()
        .map(|((kind, name), position): ((SectionKind, &'a str), &'a str)| SectionHeader {
            kind,
            name: name.trim(),
            position,
        })
}

fn run<'a, T>(
    parser: impl Parser<'a, &'a str, T, ParseErr<'a>>,
    input: &'a str,
    path: &Path,
    line: usize,
) -> Result<T> {
    parser.parse(input).into_result().map_err(|errs| {
        let messages: Vec<String> = errs.iter().map(|e| format!("{e}")).collect();
        Error::SolutionSyntax {
            path: path.to_path_buf(),
            line,
            message: format!("Failed to parse '{input}': {}", messages.join("; ")),
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Reading
// ═══════════════════════════════════════════════════════════════════════════════

/// Read and parse a solution file, loading the build file of every project
/// that has one.
pub fn parse_solution_file(path: impl AsRef<Path>) -> Result<SolutionConfiguration> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_solution(&source, path)
}

/// Parse solution text.  `path` is where the solution lives: project paths
/// resolve against its directory, and build files that exist there are
/// loaded.
pub fn parse_solution(source: &str, path: impl AsRef<Path>) -> Result<SolutionConfiguration> {
    let path = path.as_ref();
    let source_path = std::path::absolute(path).map_err(|e| Error::io(path, e))?;
    let source_directory = source_path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut conf = SolutionConfiguration {
        source_path,
        source_directory,
        ..Default::default()
    };

    let syntax = |line: usize, message: &str| Error::SolutionSyntax {
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    };

    let mut project: Option<Project> = None;
    let mut section: Option<(SectionKind, Section)> = None;
    let mut last_line = 0;

    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        last_line = line_no;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((kind, current)) = section.as_mut() {
            if line == "EndGlobalSection" || line == "EndProjectSection" {
                let kind = *kind;
                let Some((_, done)) = section.take() else { continue };
                match (kind, project.as_mut()) {
                    (SectionKind::Project, Some(p)) => p.sections.push(done),
                    (SectionKind::Project, None) => {
                        return Err(syntax(line_no, "ProjectSection outside of a Project"));
                    }
                    (SectionKind::Global, _) => conf.sections.push(done),
                }
            } else {
                current.lines.push(line.to_string());
            }
            continue;
        }

        if let Some(version) = line.strip_prefix(FILE_HEADER) {
            conf.format_version = version.trim().to_string();
        } else if line.starts_with('#') {
            if conf.product_comment.is_none() {
                conf.product_comment = Some(line.to_string());
            }
        } else if line.starts_with("Project(") {
            if project.is_some() {
                return Err(syntax(line_no, "nested Project entry"));
            }
            let header = run(project_header_parser(), line, path, line_no)?;
            project = Some(new_project(&conf.source_directory, &header));
        } else if line == "EndProject" {
            let done = project.take().ok_or_else(|| syntax(line_no, "EndProject without Project"))?;
            conf.projects.push(load_build_file(done)?);
        } else if line.starts_with("GlobalSection(") || line.starts_with("ProjectSection(") {
            let header = run(section_header_parser(), line, path, line_no)?;
            section = Some((header.kind, Section::new(header.name, header.position)));
        } else if line == "Global" || line == "EndGlobal" {
            continue;
        } else if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().to_string();
            match key.trim() {
                TARGET_VERSION_KEY => conf.target_version = Some(value),
                MINIMAL_VERSION_KEY => conf.minimal_version = Some(value),
                other => return Err(syntax(line_no, &format!("unexpected setting '{other}'"))),
            }
        } else {
            return Err(syntax(line_no, &format!("unexpected line '{line}'")));
        }
    }

    if section.is_some() {
        return Err(syntax(last_line, "unterminated section"));
    }
    if project.is_some() {
        return Err(syntax(last_line, "unterminated Project entry"));
    }
    if conf.format_version.is_empty() {
        return Err(syntax(1, "missing solution file header"));
    }

    tracing::debug!(
        path = %path.display(),
        projects = conf.projects.len(),
        sections = conf.sections.len(),
        "parsed solution"
    );
    Ok(conf)
}

fn new_project(solution_dir: &Path, header: &ProjectHeader) -> Project {
    let file_path = relative_form(header.path);
    let absolute_file_path = solution_dir.join(native_separators(file_path));
    let absolute_original_directory = absolute_file_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| solution_dir.to_path_buf());
    Project {
        type_guid: header.type_guid.to_string(),
        guid: header.guid.to_string(),
        name: header.name.to_string(),
        original_name: header.name.to_string(),
        file_path: file_path.to_string(),
        absolute_file_path,
        absolute_original_directory,
        ..Default::default()
    }
}

/// Attach the build-file tree when the project points at an existing
/// `*proj` file.  Solution folders and loose items stay tree-less.
fn load_build_file(project: Project) -> Result<Project> {
    let path = &project.absolute_file_path;
    let is_build_file = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.to_ascii_lowercase().ends_with("proj"));
    if !is_build_file || !path.is_file() {
        return Ok(project);
    }
    let tree = BuildTree::from_file(path)?;
    tracing::debug!(project = %project.name, path = %path.display(), "loaded build file");
    Ok(project.with_tree(tree))
}

/// Drop leading `.\` / `./` hops so the separator count is the directory depth.
fn relative_form(path: &str) -> &str {
    let mut path = path;
    while let Some(rest) = path.strip_prefix(".\\").or_else(|| path.strip_prefix("./")) {
        path = rest;
    }
    path
}

pub(crate) fn native_separators(path: &str) -> PathBuf {
    PathBuf::from(path.replace(['\\', '/'], std::path::MAIN_SEPARATOR_STR))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Writing
// ═══════════════════════════════════════════════════════════════════════════════

/// Render a solution in the toolchain's own layout: UTF-8 BOM, CRLF line
/// endings, tab indentation.
pub fn write_solution(conf: &SolutionConfiguration) -> String {
    let mut out = String::from("\u{feff}\r\n");
    out.push_str(&format!("{FILE_HEADER} {}\r\n", conf.format_version));
    if let Some(comment) = &conf.product_comment {
        out.push_str(&format!("{comment}\r\n"));
    }
    if let Some(v) = &conf.target_version {
        out.push_str(&format!("{TARGET_VERSION_KEY} = {v}\r\n"));
    }
    if let Some(v) = &conf.minimal_version {
        out.push_str(&format!("{MINIMAL_VERSION_KEY} = {v}\r\n"));
    }

    for p in &conf.projects {
        out.push_str(&format!(
            "Project(\"{}\") = \"{}\", \"{}\", \"{}\"\r\n",
            p.type_guid, p.name, p.file_path, p.guid
        ));
        for s in &p.sections {
            render_section(&mut out, "ProjectSection", "EndProjectSection", s);
        }
        out.push_str("EndProject\r\n");
    }

    out.push_str("Global\r\n");
    for s in &conf.sections {
        render_section(&mut out, "GlobalSection", "EndGlobalSection", s);
    }
    out.push_str("EndGlobal\r\n");
    out
}

fn render_section(out: &mut String, open: &str, close: &str, section: &Section) {
    out.push_str(&format!("\t{open}({}) = {}\r\n", section.name, section.position));
    for line in &section.lines {
        out.push_str(&format!("\t\t{line}\r\n"));
    }
    out.push_str(&format!("\t{close}\r\n"));
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
