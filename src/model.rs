//! Reference model: solutions, projects, sections and the references a
//! project's build file declares.
//!
//! Everything here is plain owned data.  Deep copies are `Clone`, which
//! duplicates the whole build-file arena along with the handles into it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::msbuild::{self, BuildTree, NodeId};

// ═══════════════════════════════════════════════════════════════════════════════
//  SolutionConfiguration
// ═══════════════════════════════════════════════════════════════════════════════

/// One solution definition, either parsed from disk or produced by a merge.
#[derive(Debug, Clone, Default)]
pub struct SolutionConfiguration {
    /// `Format Version` from the file header (e.g. `"12.00"`).
    pub format_version: String,
    /// `# Visual Studio Version 17` comment line, kept verbatim.
    pub product_comment: Option<String>,
    /// `VisualStudioVersion`: the toolchain the solution targets.
    pub target_version: Option<String>,
    /// `MinimumVisualStudioVersion`.
    pub minimal_version: Option<String>,
    /// Path of the `.sln` file this configuration was read from.
    pub source_path: PathBuf,
    pub source_directory: PathBuf,
    /// Longest directory prefix shared by every merged input.  Set by the
    /// merge; `None` for a configuration that was only parsed.
    pub recalculated_directory: Option<PathBuf>,
    pub projects: Vec<Project>,
    pub sections: Vec<Section>,
}

impl SolutionConfiguration {
    /// File name of the source solution without its extension.
    pub fn base_name(&self) -> String {
        file_stem(&self.source_path)
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Project
// ═══════════════════════════════════════════════════════════════════════════════

/// Project-type GUID of a solution folder (no build file behind it).
pub const SOLUTION_FOLDER_TYPE: &str = "{2150E333-8FDC-42A3-9474-1A3956D46DE8}";

#[derive(Debug, Clone, Default)]
pub struct Project {
    pub type_guid: String,
    pub guid: String,
    /// Display name, unique (case-insensitive) within a merged solution.
    pub name: String,
    /// Name before any collision rename.
    pub original_name: String,
    /// Path relative to the solution directory, as written in the `.sln`.
    pub file_path: String,
    pub absolute_file_path: PathBuf,
    pub absolute_original_directory: PathBuf,
    /// `ProjectSection(…)` blocks nested in the `Project` entry.
    pub sections: Vec<Section>,
    /// Build-file tree, absent for solution folders and non-MSBuild items.
    pub tree: Option<BuildTree>,
    pub package_references: PackageReferences,
    pub project_references: ProjectReferences,
}

impl Project {
    /// Attach a parsed build file and index its references.
    pub fn with_tree(mut self, tree: BuildTree) -> Self {
        self.package_references = PackageReferences::from_tree(&tree);
        self.project_references = ProjectReferences::from_tree(&tree);
        self.tree = Some(tree);
        self
    }

    /// Number of path separators in the relative file path, i.e. how many
    /// `..` hops lead from the project's directory back to the solution's.
    pub fn depth(&self) -> usize {
        self.file_path.chars().filter(|c| matches!(c, '\\' | '/')).count()
    }

    /// Rename the project and substitute the old name inside both of its
    /// file paths.
    pub fn rename(&mut self, new_name: &str) {
        let old = std::mem::replace(&mut self.name, new_name.to_string());
        self.file_path = self.file_path.replace(&old, new_name);
        self.absolute_file_path =
            PathBuf::from(self.absolute_file_path.to_string_lossy().replace(&old, new_name));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Section
// ═══════════════════════════════════════════════════════════════════════════════

/// A `GlobalSection(Name) = position` / `ProjectSection(Name) = position`
/// block of raw lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// `preSolution`, `postSolution`, `preProject` or `postProject`.
    pub position: String,
    pub lines: Vec<String>,
}

impl Section {
    pub fn new(name: impl Into<String>, position: impl Into<String>) -> Self {
        Self { name: name.into(), position: position.into(), lines: Vec::new() }
    }

    /// Same name and position, no lines.
    pub fn empty_clone(&self) -> Self {
        Self::new(self.name.clone(), self.position.clone())
    }
}

/// How lines of a global section combine when solutions are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionPolicy {
    /// `key = value` lines; a key already present must keep its value.
    Strict,
    /// Order-preserving, deduplicated set of lines.
    Union,
}

impl SectionPolicy {
    pub fn for_section(name: &str) -> Result<Self> {
        match name {
            "SolutionConfigurationPlatforms"
            | "ProjectConfigurationPlatforms"
            | "NestedProjects"
            | "MonoDevelopProperties"
            | "ExtensibilityGlobals" => Ok(Self::Union),
            "SolutionProperties" => Ok(Self::Strict),
            _ => Err(Error::UnknownSection { name: name.to_string() }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  References
// ═══════════════════════════════════════════════════════════════════════════════

/// A named dependency backed by an element of a project's build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub node: NodeId,
}

/// `<PackageReference Include="…">` entries of one build file.
#[derive(Debug, Clone, Default)]
pub struct PackageReferences {
    root: Option<NodeId>,
    items: Vec<Reference>,
}

impl PackageReferences {
    pub fn from_tree(tree: &BuildTree) -> Self {
        let (root, items) = collect(tree, msbuild::PACKAGE_REFERENCE, |include| include.to_string());
        Self { root, items }
    }

    /// The group holding the first package reference.
    pub fn root_node(&self) -> Option<NodeId> {
        self.root
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.items.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|r| r.name == name)
    }

    /// Drop every reference named `name`, detaching its element from `tree`.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, tree: &mut BuildTree, name: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|r| {
            if r.name == name {
                tree.detach(r.node);
                false
            } else {
                true
            }
        });
        before != self.items.len()
    }
}

/// `<ProjectReference Include="…">` entries of one build file, at most one
/// per target name.
#[derive(Debug, Clone, Default)]
pub struct ProjectReferences {
    root: Option<NodeId>,
    items: Vec<Reference>,
}

impl ProjectReferences {
    pub fn from_tree(tree: &BuildTree) -> Self {
        let (root, mut items) = collect(tree, msbuild::PROJECT_REFERENCE, reference_name);
        let mut seen: Vec<String> = Vec::new();
        items.retain(|r| {
            let dup = seen.iter().any(|s| s.eq_ignore_ascii_case(&r.name));
            seen.push(r.name.clone());
            !dup
        });
        Self { root, items }
    }

    /// The group holding the project references.
    pub fn root_node(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root_node(&mut self, node: NodeId) {
        self.root = Some(node);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.items.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Register the `<ProjectReference>` element `node`.  Returns `false`
    /// without inserting when a reference to the same project already exists.
    pub fn add(&mut self, tree: &BuildTree, node: NodeId) -> bool {
        let name = reference_name(tree.attribute(node, msbuild::INCLUDE).unwrap_or(""));
        if self.contains(&name) {
            return false;
        }
        self.items.push(Reference { name, node });
        true
    }
}

fn collect(
    tree: &BuildTree,
    element: &str,
    name_of: impl Fn(&str) -> String,
) -> (Option<NodeId>, Vec<Reference>) {
    let nodes = tree.descendants_named(element);
    let root = nodes.first().and_then(|&n| tree.parent(n));
    let items = nodes
        .into_iter()
        .filter_map(|node| {
            let include = tree.attribute(node, msbuild::INCLUDE)?;
            Some(Reference { name: name_of(include), node })
        })
        .collect();
    (root, items)
}

/// Project name a `<ProjectReference Include>` points at: the file stem of
/// the path, whichever separator it uses.
pub fn reference_name(include: &str) -> String {
    let file = include.rsplit(['\\', '/']).next().unwrap_or(include);
    match file.rfind('.') {
        Some(dot) if dot > 0 => file[..dot].to_string(),
        _ => file.to_string(),
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tool versions
// ═══════════════════════════════════════════════════════════════════════════════

/// Compare dotted tool versions (`"17.0.31903.59"`) numerically, component
/// by component.  Missing components count as zero; non-numeric components
/// fall back to string comparison.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.trim().split('.');
    let mut right = b.trim().split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let l = l.unwrap_or("0");
                let r = r.unwrap_or("0");
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  FileReplacement
// ═══════════════════════════════════════════════════════════════════════════════

/// Substitution applied while materializing build files.
///
/// `project_file_path` is matched against `Include`/`Update`/`Remove` values
/// verbatim.  With `replace_with` set, that file is copied into the output
/// project folder instead; with `None` (or an empty path) the copy is
/// skipped and only reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReplacement {
    pub project_file_path: String,
    pub replace_with: Option<String>,
}

impl FileReplacement {
    pub fn new(project_file_path: impl Into<String>, replace_with: Option<String>) -> Self {
        Self { project_file_path: project_file_path.into(), replace_with }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
