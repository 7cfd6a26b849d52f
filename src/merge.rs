//! Combine several solutions into one.
//!
//! The first input is cloned as the accumulating result; every further input
//! contributes its projects (renamed on name collision) and its global
//! sections (merged per [`SectionPolicy`]).  Afterwards package references
//! that point at merged projects are turned into project references by
//! [`crate::references`].

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{compare_versions, Project, Section, SectionPolicy, SolutionConfiguration};
use crate::progress::{NoProgress, Progress};
use crate::references;
use crate::sln;

// ═══════════════════════════════════════════════════════════════════════════════
//  Merger – entry point with options
// ═══════════════════════════════════════════════════════════════════════════════

/// Configurable merge.
///
/// # Example
/// ```no_run
/// use sln_merge::{Merger, TracingProgress};
///
/// let merged = Merger::new()
///     .progress(&TracingProgress)
///     .merge_files(["a/First.sln", "b/Second.sln"])
///     .unwrap();
/// assert!(merged.projects.len() >= 2);
/// ```
#[derive(Clone, Copy)]
pub struct Merger<'p> {
    progress: &'p dyn Progress,
    separator: char,
}

impl Default for Merger<'_> {
    fn default() -> Self {
        Self { progress: &NoProgress, separator: std::path::MAIN_SEPARATOR }
    }
}

impl<'p> Merger<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where status lines go.  Silent by default.
    pub fn progress(mut self, progress: &'p dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Separator used in synthesized `<ProjectReference Include>` paths.
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Merge parsed solutions, in order.
    pub fn merge(&self, inputs: &[SolutionConfiguration]) -> Result<SolutionConfiguration> {
        if inputs.is_empty() {
            return Err(Error::NoInput);
        }

        self.progress.report(&format!("Merging {} sln files", inputs.len()));
        let mut result = merge_solutions(inputs)?;

        self.progress.report("Replacing packages by projects, adding dependant projects");
        references::link_project_references(&mut result, self.separator)?;

        self.progress.report("Cleaning packages");
        references::prune_package_references(&mut result);

        Ok(result)
    }

    /// Parse every solution file, then [`merge`](Self::merge) them.
    pub fn merge_files<P: AsRef<Path>>(
        &self,
        paths: impl IntoIterator<Item = P>,
    ) -> Result<SolutionConfiguration> {
        let inputs = paths
            .into_iter()
            .map(sln::parse_solution_file)
            .collect::<Result<Vec<_>>>()?;
        self.merge(&inputs)
    }
}

/// Merge with default options.
pub fn merge(inputs: &[SolutionConfiguration]) -> Result<SolutionConfiguration> {
    Merger::new().merge(inputs)
}

/// Parse and merge solution files with default options.
pub fn merge_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<SolutionConfiguration> {
    Merger::new().merge_files(paths)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Solution merge
// ═══════════════════════════════════════════════════════════════════════════════

/// Combine solutions without touching build-file references.
pub fn merge_solutions(inputs: &[SolutionConfiguration]) -> Result<SolutionConfiguration> {
    let (first, rest) = inputs.split_first().ok_or(Error::NoInput)?;
    let mut result = first.clone();
    let mut common = path_segments(&result.source_directory);

    for conf in rest {
        if result.format_version != conf.format_version {
            return Err(Error::UnsupportedVersionMerge {
                expected: result.format_version.clone(),
                found: conf.format_version.clone(),
                path: conf.source_path.clone(),
            });
        }

        merge_tool_versions(&mut result, conf);
        common = common_prefix(common, &path_segments(&conf.source_directory));
        merge_projects(&mut result.projects, conf);
        merge_sections(&mut result.sections, &conf.sections)?;

        tracing::debug!(
            from = %conf.source_path.display(),
            projects = result.projects.len(),
            "merged solution"
        );
    }

    result.recalculated_directory = Some(PathBuf::from(common.join(std::path::MAIN_SEPARATOR_STR)));
    Ok(result)
}

/// Raise the minimal version to the most demanding input and lower the
/// target version to the least capable one.
fn merge_tool_versions(result: &mut SolutionConfiguration, conf: &SolutionConfiguration) {
    if let Some(incoming) = &conf.minimal_version {
        let widen = result
            .minimal_version
            .as_deref()
            .is_none_or(|current| compare_versions(current, incoming) == Ordering::Less);
        if widen {
            result.minimal_version = Some(incoming.clone());
        }
    }

    let lower = matches!(
        (&result.target_version, &conf.target_version),
        (Some(current), Some(incoming)) if compare_versions(current, incoming) == Ordering::Greater
    );
    if lower {
        result.target_version = conf.target_version.clone();
        if conf.product_comment.is_some() {
            result.product_comment = conf.product_comment.clone();
        }
    }
}

fn path_segments(dir: &Path) -> Vec<String> {
    dir.to_string_lossy()
        .split(['\\', '/'])
        .map(String::from)
        .collect()
}

/// Longest shared leading run of segments.
fn common_prefix(mut current: Vec<String>, other: &[String]) -> Vec<String> {
    let shared = current
        .iter()
        .zip(other)
        .take_while(|(a, b)| a == b)
        .count();
    current.truncate(shared);
    current
}

fn merge_projects(projects: &mut Vec<Project>, conf: &SolutionConfiguration) {
    let suffix = conf.base_name();
    for project in &conf.projects {
        let duplicated = projects
            .iter()
            .any(|p| p.name.to_lowercase() == project.name.to_lowercase());
        let mut copy = project.clone();
        if duplicated {
            let new_name = format!("{}_{suffix}", copy.name);
            tracing::debug!(from = %copy.name, to = %new_name, "renamed colliding project");
            copy.rename(&new_name);
        }
        projects.push(copy);
    }
}

fn merge_sections(sections: &mut Vec<Section>, incoming: &[Section]) -> Result<()> {
    for section in incoming {
        let idx = match sections.iter().position(|s| s.name.eq_ignore_ascii_case(&section.name)) {
            Some(idx) => idx,
            None => {
                sections.push(section.empty_clone());
                sections.len() - 1
            }
        };
        let target = &mut sections[idx];

        match SectionPolicy::for_section(&section.name)? {
            SectionPolicy::Strict => {
                for line in &section.lines {
                    check_strict_line(target, line)?;
                }
            }
            SectionPolicy::Union => {
                for line in &section.lines {
                    if !target.lines.contains(line) {
                        target.lines.push(line.clone());
                    }
                }
            }
        }
    }
    Ok(())
}

/// A strict `key = value` line must agree with the line already present for
/// the same key.  Absent keys are not added.
fn check_strict_line(target: &Section, line: &str) -> Result<()> {
    let (key, value) = split_key_value(line);
    let existing = target.lines.iter().find(|l| split_key_value(l).0 == key);
    if let Some(existing) = existing {
        let (_, existing_value) = split_key_value(existing);
        if existing_value != value {
            return Err(Error::ConflictingValue {
                section: target.name.clone(),
                key: key.to_string(),
                existing: existing_value.to_string(),
                incoming: value.to_string(),
            });
        }
    }
    Ok(())
}

fn split_key_value(line: &str) -> (&str, &str) {
    match line.split_once('=') {
        Some((k, v)) => (k.trim(), v.trim()),
        None => (line.trim(), ""),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn solution(path: &str, projects: &[(&str, &str)], sections: Vec<Section>) -> SolutionConfiguration {
        let source_path = PathBuf::from(path);
        let source_directory = source_path.parent().unwrap().to_path_buf();
        let projects = projects
            .iter()
            .map(|(name, file)| Project {
                name: name.to_string(),
                original_name: name.to_string(),
                file_path: file.to_string(),
                absolute_file_path: source_directory.join(file),
                ..Default::default()
            })
            .collect();
        SolutionConfiguration {
            format_version: "12.00".into(),
            target_version: Some("17.0.31903.59".into()),
            minimal_version: Some("10.0.40219.1".into()),
            source_path,
            source_directory,
            projects,
            sections,
            ..Default::default()
        }
    }

    fn section(name: &str, lines: &[&str]) -> Section {
        Section {
            name: name.into(),
            position: "preSolution".into(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    // ── Inputs & versions ────────────────────────────────────────────────

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(merge(&[]), Err(Error::NoInput)));
        assert!(matches!(merge_solutions(&[]), Err(Error::NoInput)));
    }

    #[test]
    fn format_version_mismatch_is_fatal() {
        let a = solution("/repo/a/A.sln", &[], vec![]);
        let mut b = solution("/repo/b/B.sln", &[], vec![]);
        b.format_version = "11.00".into();
        let err = merge_solutions(&[a, b]).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedVersionMerge { ref expected, ref found, .. } if expected == "12.00" && found == "11.00"
        ));
    }

    #[test]
    fn tool_versions_take_the_safe_bounds() {
        let a = solution("/repo/a/A.sln", &[], vec![]);
        let mut b = solution("/repo/b/B.sln", &[], vec![]);
        b.target_version = Some("16.0.28701.123".into());
        b.product_comment = Some("# Visual Studio Version 16".into());
        b.minimal_version = Some("15.0.26124.0".into());

        let merged = merge_solutions(&[a, b]).unwrap();
        assert_eq!(merged.target_version.as_deref(), Some("16.0.28701.123"));
        assert_eq!(merged.product_comment.as_deref(), Some("# Visual Studio Version 16"));
        assert_eq!(merged.minimal_version.as_deref(), Some("15.0.26124.0"));
    }

    #[test]
    fn newer_target_does_not_raise() {
        let a = solution("/repo/a/A.sln", &[], vec![]);
        let mut b = solution("/repo/b/B.sln", &[], vec![]);
        b.target_version = Some("18.0.1".into());
        b.minimal_version = Some("9.0".into());
        let merged = merge_solutions(&[a, b]).unwrap();
        assert_eq!(merged.target_version.as_deref(), Some("17.0.31903.59"));
        assert_eq!(merged.minimal_version.as_deref(), Some("10.0.40219.1"));
    }

    // ── Common directory ─────────────────────────────────────────────────

    #[test]
    fn common_directory_is_shared_prefix() {
        let a = solution("/repo/a/A.sln", &[], vec![]);
        let b = solution("/repo/a/b/B.sln", &[], vec![]);
        let merged = merge_solutions(&[a, b]).unwrap();
        assert_eq!(merged.recalculated_directory, Some(PathBuf::from("/repo/a")));
    }

    #[test]
    fn common_directory_stops_at_first_mismatch() {
        let a = solution("/repo/a/x/A.sln", &[], vec![]);
        let b = solution("/repo/b/x/B.sln", &[], vec![]);
        let c = solution("/repo/a/x/C.sln", &[], vec![]);
        let merged = merge_solutions(&[a, b, c]).unwrap();
        assert_eq!(merged.recalculated_directory, Some(PathBuf::from("/repo")));
    }

    // ── Projects ─────────────────────────────────────────────────────────

    #[test]
    fn unique_names_are_kept() {
        let a = solution("/repo/a/A.sln", &[("App", r"App\App.csproj")], vec![]);
        let b = solution("/repo/b/B.sln", &[("Utils", r"Utils\Utils.csproj")], vec![]);
        let merged = merge_solutions(&[a, b]).unwrap();
        let names: Vec<_> = merged.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["App", "Utils"]);
    }

    #[test]
    fn colliding_name_gets_solution_suffix() {
        let a = solution("/repo/a/First.sln", &[("Core", r"Core\Core.csproj")], vec![]);
        let b = solution("/repo/b/Second.sln", &[("core", r"src\core\core.csproj")], vec![]);
        let merged = merge_solutions(&[a, b]).unwrap();

        let renamed = &merged.projects[1];
        assert_eq!(renamed.name, "core_Second");
        assert_eq!(renamed.original_name, "core");
        assert_eq!(renamed.file_path, r"src\core_Second\core_Second.csproj");
        assert!(renamed.absolute_file_path.to_string_lossy().contains("core_Second"));
        // The first occurrence is untouched.
        assert_eq!(merged.projects[0].name, "Core");
    }

    #[test]
    fn spec_like_core_collision() {
        let a = solution("/repo/a/A.sln", &[("Core", "Core/Core.csproj")], vec![]);
        let b = solution("/repo/b/Other.sln", &[("Core", "Core/Core.csproj")], vec![]);
        let merged = merge_solutions(&[a, b]).unwrap();
        assert_eq!(merged.projects[1].name, "Core_Other");
        assert_eq!(merged.projects[1].file_path, "Core_Other/Core_Other.csproj");
    }

    // ── Sections ─────────────────────────────────────────────────────────

    #[test]
    fn strict_conflict_is_fatal() {
        let a = solution("/repo/a/A.sln", &[], vec![section("SolutionProperties", &["Debug|Any CPU = Debug|Any CPU"])]);
        let b = solution("/repo/b/B.sln", &[], vec![section("SolutionProperties", &["Debug|Any CPU = Release|Any CPU"])]);
        let err = merge_solutions(&[a, b]).unwrap_err();
        match err {
            Error::ConflictingValue { section, key, existing, incoming } => {
                assert_eq!(section, "SolutionProperties");
                assert_eq!(key, "Debug|Any CPU");
                assert_eq!(existing, "Debug|Any CPU");
                assert_eq!(incoming, "Release|Any CPU");
            }
            other => panic!("expected ConflictingValue, got {other:?}"),
        }
    }

    #[test]
    fn strict_equal_values_pass_and_new_keys_are_not_added() {
        let a = solution("/repo/a/A.sln", &[], vec![section("SolutionProperties", &["HideSolutionNode = FALSE"])]);
        let b = solution(
            "/repo/b/B.sln",
            &[],
            vec![section("SolutionProperties", &["HideSolutionNode=FALSE", "Extra = 1"])],
        );
        let merged = merge_solutions(&[a, b]).unwrap();
        assert_eq!(merged.sections[0].lines, vec!["HideSolutionNode = FALSE"]);
    }

    #[test]
    fn strict_section_only_in_later_input_stays_empty() {
        let a = solution("/repo/a/A.sln", &[], vec![]);
        let b = solution("/repo/b/B.sln", &[], vec![section("SolutionProperties", &["HideSolutionNode = FALSE"])]);
        let merged = merge_solutions(&[a, b]).unwrap();
        let props = merged.section("SolutionProperties").unwrap();
        assert!(props.lines.is_empty());
        assert_eq!(props.position, "preSolution");
    }

    #[test]
    fn union_is_idempotent_and_ordered() {
        let lines_a = ["Debug|Any CPU = Debug|Any CPU", "Release|Any CPU = Release|Any CPU"];
        let lines_b = ["Release|Any CPU = Release|Any CPU", "Staging|Any CPU = Staging|Any CPU"];
        let a = solution("/repo/a/A.sln", &[], vec![section("SolutionConfigurationPlatforms", &lines_a)]);
        let b = solution("/repo/b/B.sln", &[], vec![section("SolutionConfigurationPlatforms", &lines_b)]);
        let merged = merge_solutions(&[a, b]).unwrap();
        assert_eq!(
            merged.sections[0].lines,
            vec![
                "Debug|Any CPU = Debug|Any CPU",
                "Release|Any CPU = Release|Any CPU",
                "Staging|Any CPU = Staging|Any CPU",
            ]
        );
    }

    #[test]
    fn unknown_section_is_fatal() {
        let a = solution("/repo/a/A.sln", &[], vec![]);
        let b = solution("/repo/b/B.sln", &[], vec![section("TeamFoundationVersionControl", &["SccNumberOfProjects = 2"])]);
        let err = merge_solutions(&[a, b]).unwrap_err();
        assert!(matches!(err, Error::UnknownSection { .. }));
    }

    #[test]
    fn progress_reports_phases() {
        let lines = std::cell::RefCell::new(Vec::new());
        let reporter = |m: &str| lines.borrow_mut().push(m.to_string());
        let a = solution("/repo/a/A.sln", &[("App", "App/App.csproj")], vec![]);
        Merger::new().progress(&reporter).merge(&[a]).unwrap();
        assert_eq!(lines.borrow()[0], "Merging 1 sln files");
        assert_eq!(lines.borrow().len(), 3);
    }
}
