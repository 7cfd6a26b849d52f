//! Materialize a merged solution on disk.
//!
//! The `.sln` lands at the destination; every project with a build file is
//! re-serialized at `destination/<file path>`.  Sources stay where they are:
//! the rewritten build file points back at them through relative paths, and
//! recursive `Compile`/`Page` globs pull in whatever the original folder
//! holds.  Every write goes through [`copier`] so no distinct content is lost.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::copier::{self, CopyMode, CopyOptions};
use crate::error::{Error, Result};
use crate::model::{file_stem, FileReplacement, Project, SolutionConfiguration};
use crate::msbuild::{self, BuildTree, NodeId};
use crate::progress::{NoProgress, Progress};
use crate::sln::{self, native_separators};

/// File name used when the destination is a directory.
pub const DEFAULT_SOLUTION_NAME: &str = "Merged.sln";

const RECURSIVE_LINK: &str = "%(RecursiveDir)%(Filename)%(Extension)";

// ═══════════════════════════════════════════════════════════════════════════════
//  SolutionWriter – entry point with options
// ═══════════════════════════════════════════════════════════════════════════════

/// Configurable materialization.
///
/// # Example
/// ```no_run
/// use sln_merge::{merge_files, SolutionWriter, TracingProgress};
///
/// let merged = merge_files(["a/First.sln", "b/Second.sln"]).unwrap();
/// let written = SolutionWriter::new()
///     .progress(&TracingProgress)
///     .copy_sibling_files(true)
///     .write_to("out", &merged)
///     .unwrap();
/// assert!(written.ends_with("Merged.sln"));
/// ```
#[derive(Clone)]
pub struct SolutionWriter<'p> {
    progress: &'p dyn Progress,
    copy_sibling_files: bool,
    replacements: HashMap<String, Option<String>>,
    copy_options: CopyOptions,
    separator: char,
}

impl Default for SolutionWriter<'_> {
    fn default() -> Self {
        Self {
            progress: &NoProgress,
            copy_sibling_files: false,
            replacements: HashMap::new(),
            copy_options: CopyOptions::default(),
            separator: std::path::MAIN_SEPARATOR,
        }
    }
}

impl<'p> SolutionWriter<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where status lines go.  Silent by default.
    pub fn progress(mut self, progress: &'p dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Also copy the other files of the first input's directory next to the
    /// written solution.
    pub fn copy_sibling_files(mut self, yes: bool) -> Self {
        self.copy_sibling_files = yes;
        self
    }

    /// Files to swap in (or skip) instead of re-pointing at the original.
    pub fn file_replacements(mut self, replacements: impl IntoIterator<Item = FileReplacement>) -> Self {
        self.replacements.extend(
            replacements
                .into_iter()
                .map(|r| (r.project_file_path, r.replace_with)),
        );
        self
    }

    pub fn case_sensitive_paths(mut self, yes: bool) -> Self {
        self.copy_options.case_sensitive_paths = yes;
        self
    }

    /// Separator used in rewritten build-file paths.
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Write `conf` under `destination`.  A destination without a `.sln`
    /// extension is taken as a directory and receives [`DEFAULT_SOLUTION_NAME`].
    ///
    /// Returns the absolute path of the written solution.
    pub fn write_to(&self, destination: impl AsRef<Path>, conf: &SolutionConfiguration) -> Result<PathBuf> {
        let sln_path = solution_path(destination.as_ref())?;
        let dest_dir = sln_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::invariant(format!("{} has no parent directory", sln_path.display())))?;
        fs::create_dir_all(&dest_dir).map_err(|e| Error::io(&dest_dir, e))?;

        self.progress.report("Writing result sln file and projects");
        let outcome = copier::write_with_backup(
            sln::write_solution(conf).as_bytes(),
            &sln_path,
            CopyMode::Replace,
            self.copy_options,
        )?;
        tracing::info!(path = %sln_path.display(), ?outcome, "solution written");

        if self.copy_sibling_files {
            self.copy_siblings(conf, &sln_path, &dest_dir)?;
        }

        self.progress.report(&format!("Merging projects to {}", sln_path.display()));
        for project in &conf.projects {
            if let Some(tree) = &project.tree {
                self.write_project(project, tree, &dest_dir)?;
            }
        }

        self.progress.report("Done");
        Ok(sln_path)
    }

    fn copy_siblings(&self, conf: &SolutionConfiguration, sln_path: &Path, dest_dir: &Path) -> Result<()> {
        let source_name = conf.base_name();
        let new_name = file_stem(sln_path);

        let dir = &conf.source_directory;
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if path.is_file() && !copier::same_path(&path, &conf.source_path, self.copy_options) {
                files.push(path);
            }
        }
        files.sort();

        for file in files {
            let Some(file_name) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let file_name = if source_name.is_empty() {
                file_name
            } else {
                file_name.replace(&source_name, &new_name)
            };
            let outcome =
                copier::copy_with_backup(&file, dest_dir.join(&file_name), CopyMode::Preserve, self.copy_options)?;
            tracing::debug!(file = %file.display(), ?outcome, "sibling copied");
        }
        Ok(())
    }

    fn write_project(&self, project: &Project, tree: &BuildTree, dest_dir: &Path) -> Result<()> {
        self.progress.report(&project.name);

        let trimmed = project.file_path.trim_start_matches(['.', '\\', '/']);
        let to_proj_file = dest_dir.join(native_separators(trimmed));
        let to_proj_dir = to_proj_file.parent().unwrap_or(dest_dir);
        fs::create_dir_all(to_proj_dir).map_err(|e| Error::io(to_proj_dir, e))?;

        let ctx = RewriteContext {
            project,
            relative_path: relative_path(to_proj_dir, &project.absolute_original_directory, self.separator),
            project_directory: to_proj_dir,
            replacements: &self.replacements,
            separator: self.separator,
            copy_options: self.copy_options,
            progress: self.progress,
        };
        let rewritten = rewrite_build_tree(tree, &ctx)?;
        let xml = rewritten.to_xml_string()?;
        let outcome = copier::write_with_backup(xml.as_bytes(), &to_proj_file, CopyMode::Replace, self.copy_options)?;
        tracing::debug!(project = %project.name, path = %to_proj_file.display(), ?outcome, "build file written");
        Ok(())
    }
}

/// Write with default options.
pub fn write_to(
    destination: impl AsRef<Path>,
    conf: &SolutionConfiguration,
    copy_sibling_files: bool,
    file_replacements: Option<&[FileReplacement]>,
) -> Result<PathBuf> {
    SolutionWriter::new()
        .copy_sibling_files(copy_sibling_files)
        .file_replacements(file_replacements.unwrap_or_default().iter().cloned())
        .write_to(destination, conf)
}

fn solution_path(destination: &Path) -> Result<PathBuf> {
    let is_sln = destination
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sln"));
    let path = if is_sln {
        destination.to_path_buf()
    } else {
        destination.join(DEFAULT_SOLUTION_NAME)
    };
    std::path::absolute(&path).map_err(|e| Error::io(&path, e))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Build-file rewrite
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the tree rewrite needs to know about where the project goes.
pub struct RewriteContext<'a> {
    pub project: &'a Project,
    /// From the output project directory back to the original one.
    pub relative_path: String,
    /// Directory the rewritten build file is written to.
    pub project_directory: &'a Path,
    pub replacements: &'a HashMap<String, Option<String>>,
    pub separator: char,
    pub copy_options: CopyOptions,
    pub progress: &'a dyn Progress,
}

/// Deep-copy `from` so that it still works from its new location.
///
/// - the root gets two leading item groups that glob `*.cs` (as `Compile`)
///   and `*.xaml` (as `Page`) from the original folder, excluding `bin`/`obj`
/// - every `Include`/`Update`/`Remove` outside package, project and
///   framework references is prefixed with the relative path, unless a
///   replacement is registered for it
/// - `EmbeddedResource` items get a `Link` child holding their original
///   `Include`
pub fn rewrite_build_tree(from: &BuildTree, ctx: &RewriteContext<'_>) -> Result<BuildTree> {
    let root = from.root();
    let mut to = BuildTree::new(from.name(root).unwrap_or(msbuild::PROJECT));
    let to_root = to.root();
    copy_element(from, root, &mut to, to_root, ctx)?;
    Ok(to)
}

fn copy_element(from: &BuildTree, src: NodeId, to: &mut BuildTree, dst: NodeId, ctx: &RewriteContext<'_>) -> Result<()> {
    for attr in from.attributes(src) {
        to.set_attribute(dst, &attr.name, &attr.value);
    }
    for attr in [msbuild::UPDATE, msbuild::INCLUDE, msbuild::REMOVE] {
        replace_file_attribute(to, dst, attr, ctx)?;
    }

    if from.name(src) == Some(msbuild::PROJECT) {
        add_recursive_items(to, dst, "Compile", "cs", ctx);
        add_recursive_items(to, dst, "Page", "xaml", ctx);
    }

    for &child in from.children(src) {
        if let Some(name) = from.name(child) {
            let copy = to.create_element(name);
            if name == msbuild::EMBEDDED_RESOURCE {
                if let Some(include) = from.attribute(child, msbuild::INCLUDE).filter(|v| !v.is_empty()) {
                    let link = to.create_element(msbuild::LINK);
                    to.set_text(link, include);
                    to.append_child(copy, link);
                }
            }
            to.append_child(dst, copy);
            copy_element(from, child, to, copy, ctx)?;
        } else if let Some(text) = from.as_text(child) {
            to.set_text(dst, text);
        }
    }
    Ok(())
}

fn replace_file_attribute(to: &mut BuildTree, node: NodeId, attr: &str, ctx: &RewriteContext<'_>) -> Result<()> {
    if matches!(
        to.name(node),
        Some(msbuild::PACKAGE_REFERENCE | msbuild::PROJECT_REFERENCE | msbuild::FRAMEWORK_REFERENCE)
    ) {
        return Ok(());
    }
    let Some(value) = to.attribute(node, attr).map(str::to_string) else {
        return Ok(());
    };
    if value.trim().is_empty() {
        return Ok(());
    }

    match ctx.replacements.get(&value) {
        Some(Some(source)) if !source.trim().is_empty() => {
            let target = ctx.project_directory.join(native_separators(&value));
            let outcome = copier::copy_with_backup(source, &target, CopyMode::Replace, ctx.copy_options)?;
            tracing::debug!(%value, target = %target.display(), ?outcome, "replacement copied");
        }
        Some(_) => {
            ctx.progress.report(&format!("Copy of {value} is ignored."));
            tracing::warn!(project = %ctx.project.name, %value, "replacement without source, copy ignored");
        }
        None => {
            let rewritten = combine(&ctx.relative_path, &value, ctx.separator);
            to.set_attribute(node, attr, &rewritten);
        }
    }
    Ok(())
}

fn add_recursive_items(to: &mut BuildTree, parent: NodeId, item: &str, ext: &str, ctx: &RewriteContext<'_>) {
    let sep = ctx.separator;
    let rel = &ctx.relative_path;
    let group = to.create_element(msbuild::ITEM_GROUP);
    to.append_child(parent, group);

    let include = to.create_element(item);
    to.set_attribute(include, msbuild::INCLUDE, &format!("{rel}{sep}**{sep}*.{ext}"));
    let link = to.create_element(msbuild::LINK);
    to.set_text(link, RECURSIVE_LINK);
    to.append_child(include, link);
    to.append_child(group, include);

    for build_dir in ["bin", "obj"] {
        let remove = to.create_element(item);
        to.set_attribute(remove, msbuild::REMOVE, &format!("{rel}{sep}{build_dir}{sep}**{sep}*.{ext}"));
        to.append_child(group, remove);
    }
}

/// Join `value` onto `base`, leaving rooted values alone.
fn combine(base: &str, value: &str, separator: char) -> String {
    let value = value.replace(['\\', '/'], &separator.to_string());
    let rooted = value.starts_with(separator) || value.as_bytes().get(1) == Some(&b':');
    if rooted || base.is_empty() {
        value
    } else if base.ends_with(separator) {
        format!("{base}{value}")
    } else {
        format!("{base}{separator}{value}")
    }
}

/// Relative path from directory `from` to directory `to`, `.` when equal.
pub fn relative_path(from: &Path, to: &Path, separator: char) -> String {
    let from: Vec<Component> = from.components().filter(|c| *c != Component::CurDir).collect();
    let to: Vec<Component> = to.components().filter(|c| *c != Component::CurDir).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let segments: Vec<String> = std::iter::repeat_n("..".to_string(), from.len() - common)
        .chain(to[common..].iter().map(|c| c.as_os_str().to_string_lossy().into_owned()))
        .collect();
    if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join(&separator.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
