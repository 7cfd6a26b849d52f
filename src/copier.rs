//! Content-aware file copy that never silently drops a distinct version of
//! the destination.
//!
//! Equality is decided on exact bytes.  When the destination already holds
//! something different, a timestamped sibling (`{destination}_{yyyyMMdd_HHmmss}.back`
//! or `.source`) keeps the version that would otherwise be lost, unless a
//! sibling with the same bytes already exists.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use glob::MatchOptions;

use crate::error::{Error, Result};
use crate::sln::native_separators;

/// What to do when the destination exists with different content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Back the destination up to `*.back`, then overwrite it.
    Replace,
    /// Leave the destination alone and park the new content in `*.source`.
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Destination did not exist and was written.
    Created,
    /// Destination already held identical bytes.
    Unchanged,
    /// Destination was overwritten.  `backup` is the snapshot written for
    /// its previous content, `None` when an identical sibling already
    /// existed.
    Replaced { backup: Option<PathBuf> },
    /// Destination was kept.  `snapshot` holds the bypassed content, `None`
    /// when an identical sibling already existed.
    Bypassed { snapshot: Option<PathBuf> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Whether two paths differing only by case name different files.
    pub case_sensitive_paths: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self { case_sensitive_paths: !cfg!(windows) }
    }
}

/// Copy `origin` onto `destination`, keeping every distinct version.
///
/// Both paths may use either separator style.
pub fn copy_with_backup(
    origin: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    mode: CopyMode,
    options: CopyOptions,
) -> Result<CopyOutcome> {
    let origin = normalize(origin.as_ref());
    let destination = normalize(destination.as_ref());

    if !destination.exists() {
        create_parent(&destination)?;
        fs::copy(&origin, &destination).map_err(|e| Error::io(&origin, e))?;
        tracing::debug!(origin = %origin.display(), destination = %destination.display(), "copied");
        return Ok(CopyOutcome::Created);
    }

    let content = fs::read(&origin).map_err(|e| Error::io(&origin, e))?;
    write_existing(&content, &destination, mode, options)
}

/// Same contract as [`copy_with_backup`] with in-memory content as origin.
pub fn write_with_backup(
    content: &[u8],
    destination: impl AsRef<Path>,
    mode: CopyMode,
    options: CopyOptions,
) -> Result<CopyOutcome> {
    let destination = normalize(destination.as_ref());

    if !destination.exists() {
        create_parent(&destination)?;
        fs::write(&destination, content).map_err(|e| Error::io(&destination, e))?;
        tracing::debug!(destination = %destination.display(), "written");
        return Ok(CopyOutcome::Created);
    }

    write_existing(content, &destination, mode, options)
}

fn write_existing(
    content: &[u8],
    destination: &Path,
    mode: CopyMode,
    options: CopyOptions,
) -> Result<CopyOutcome> {
    let current = fs::read(destination).map_err(|e| Error::io(destination, e))?;
    if current == content {
        tracing::debug!(destination = %destination.display(), "unchanged");
        return Ok(CopyOutcome::Unchanged);
    }

    let compare: &[u8] = match mode {
        CopyMode::Replace => &current,
        CopyMode::Preserve => content,
    };
    let already_kept = sibling_with_content(destination, compare, options)?;

    match mode {
        CopyMode::Replace => {
            let backup = match already_kept {
                Some(_) => None,
                None => Some(snapshot(destination, &current, "back")?),
            };
            fs::write(destination, content).map_err(|e| Error::io(destination, e))?;
            tracing::info!(
                destination = %destination.display(),
                backup = ?backup,
                "replaced"
            );
            Ok(CopyOutcome::Replaced { backup })
        }
        CopyMode::Preserve => {
            let snapshot = match already_kept {
                Some(_) => None,
                None => Some(snapshot(destination, content, "source")?),
            };
            tracing::info!(
                destination = %destination.display(),
                snapshot = ?snapshot,
                "kept existing file"
            );
            Ok(CopyOutcome::Bypassed { snapshot })
        }
    }
}

/// First `{stem}*` sibling of `destination` (other than itself) whose bytes
/// equal `content`.
fn sibling_with_content(destination: &Path, content: &[u8], options: CopyOptions) -> Result<Option<PathBuf>> {
    let dir = match destination.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pattern = format!(
        "{}{}{}*",
        glob::Pattern::escape(&dir.to_string_lossy()),
        std::path::MAIN_SEPARATOR,
        glob::Pattern::escape(&stem)
    );

    let match_options = MatchOptions {
        case_sensitive: options.case_sensitive_paths,
        ..MatchOptions::new()
    };
    let entries = glob::glob_with(&pattern, match_options).map_err(|e| {
        Error::io(dir, std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
    })?;

    for entry in entries {
        let candidate = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            Error::io(path, e.into())
        })?;
        let is_destination = match (candidate.file_name(), destination.file_name()) {
            (Some(a), Some(b)) => same_path(Path::new(a), Path::new(b), options),
            _ => false,
        };
        if is_destination || !candidate.is_file() {
            continue;
        }
        let bytes = fs::read(&candidate).map_err(|e| Error::io(&candidate, e))?;
        if bytes == content {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Write `content` next to `destination` as `{destination}_{timestamp}.{ext}`.
fn snapshot(destination: &Path, content: &[u8], ext: &str) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut attempt = 0usize;
    let path = loop {
        let mut name = OsString::from(destination.as_os_str());
        match attempt {
            0 => name.push(format!("_{stamp}.{ext}")),
            n => name.push(format!("_{stamp}_{n}.{ext}")),
        }
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            break candidate;
        }
        attempt += 1;
    };
    fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}

pub(crate) fn same_path(a: &Path, b: &Path, options: CopyOptions) -> bool {
    if options.case_sensitive_paths {
        a == b
    } else {
        a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
    }
}

fn normalize(path: &Path) -> PathBuf {
    native_separators(&path.to_string_lossy())
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
        }
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
