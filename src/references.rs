//! Reference graph: turn package references that name a merged project into
//! direct project references.
//!
//! Every project with a build file gets one `<ItemGroup>` holding its project
//! references, placed right after its last top-level `<PropertyGroup>`.  The
//! walk then follows package and project references depth first from each
//! project, adding a `<ProjectReference>` for every merged project reachable
//! from it.  Finally the package references that are now covered by a
//! project are dropped.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::{Project, SolutionConfiguration};
use crate::msbuild::{self, NodeId};

/// Add project references for every merged project reachable from each
/// project's package/project references.
pub fn link_project_references(solution: &mut SolutionConfiguration, separator: char) -> Result<()> {
    let projects = &mut solution.projects;
    for root in 0..projects.len() {
        let Some(group) = anchor_reference_group(&mut projects[root])? else {
            continue;
        };
        let mut visited = HashSet::new();
        expand(projects, root, root, group, separator, &mut visited)?;
        tracing::debug!(
            project = %projects[root].name,
            references = projects[root].project_references.len(),
            "linked project references"
        );
    }
    Ok(())
}

/// Detach (or create) the project-reference group and re-insert it after
/// the last top-level `<PropertyGroup>`, falling back to the package
/// reference group.  `None` for projects without a build file.
fn anchor_reference_group(project: &mut Project) -> Result<Option<NodeId>> {
    let Some(tree) = project.tree.as_mut() else {
        return Ok(None);
    };

    let group = match project.project_references.root_node() {
        Some(existing) => {
            tree.detach(existing);
            existing
        }
        None => tree.create_element(msbuild::ITEM_GROUP),
    };
    if tree.name(group) != Some(msbuild::ITEM_GROUP) {
        return Err(Error::invariant(format!(
            "{}: project references live in <{}>, expected <{}>",
            project.name,
            tree.name(group).unwrap_or("?"),
            msbuild::ITEM_GROUP
        )));
    }

    let root = tree.root();
    let anchor = tree
        .child_elements(root, msbuild::PROPERTY_GROUP)
        .last()
        .or(project.package_references.root_node())
        .ok_or_else(|| {
            Error::invariant(format!(
                "{}: no <PropertyGroup> or package reference group to place project references after",
                project.name
            ))
        })?;
    tree.insert_after(anchor, group)?;
    project.project_references.set_root_node(group);
    Ok(Some(group))
}

/// Depth-first walk from `current`, adding references to `root`'s group.
/// `visited` holds the targets already expanded for this root.
fn expand(
    projects: &mut [Project],
    root: usize,
    current: usize,
    group: NodeId,
    separator: char,
    visited: &mut HashSet<usize>,
) -> Result<()> {
    let names: Vec<String> = {
        let p = &projects[current];
        p.package_references
            .names()
            .chain(p.project_references.names())
            .map(String::from)
            .collect()
    };

    for name in names {
        // Unresolved names are external dependencies.
        let Some(target) = resolve(projects, &name) else {
            continue;
        };
        if target == root || !visited.insert(target) {
            continue;
        }

        let include = relative_include(&projects[root], &projects[target], separator);
        let root_project = &mut projects[root];
        let tree = root_project
            .tree
            .as_mut()
            .ok_or_else(|| Error::invariant(format!("{} lost its build file", root_project.name)))?;

        let node = tree.create_element(msbuild::PROJECT_REFERENCE);
        tree.set_attribute(node, msbuild::INCLUDE, &include);
        tree.append_child(group, node);
        if root_project.project_references.add(tree, node) {
            tracing::debug!(project = %root_project.name, include = %include, "added project reference");
        } else {
            tree.detach(node);
        }

        expand(projects, root, target, group, separator, visited)?;
    }
    Ok(())
}

/// `..` once per directory level of `from`, then the path of `to`.
fn relative_include(from: &Project, to: &Project, separator: char) -> String {
    let mut include = format!("..{separator}").repeat(from.depth());
    include.push_str(&to.file_path.replace(['\\', '/'], &separator.to_string()));
    include
}

/// The merged project a reference name stands for: the project currently
/// carrying that name, else the one renamed away from it.
fn resolve(projects: &[Project], name: &str) -> Option<usize> {
    projects
        .iter()
        .position(|p| p.name == name)
        .or_else(|| projects.iter().position(|p| p.original_name == name))
}

/// Drop package references that resolve to a merged project.
pub fn prune_package_references(solution: &mut SolutionConfiguration) {
    let superseded: Vec<Vec<String>> = solution
        .projects
        .iter()
        .map(|p| {
            p.package_references
                .names()
                .filter(|n| resolve(&solution.projects, n).is_some())
                .map(String::from)
                .collect()
        })
        .collect();

    for (project, names) in solution.projects.iter_mut().zip(superseded) {
        let Some(tree) = project.tree.as_mut() else {
            continue;
        };
        for name in names {
            project.package_references.remove(tree, &name);
            tracing::debug!(project = %project.name, package = %name, "removed package reference");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
