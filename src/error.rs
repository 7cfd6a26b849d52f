//! Error kinds raised while merging solutions and materializing the result.
//!
//! Every variant is fatal for the operation in progress: merging stops at the
//! first violation and nothing is rolled back.

use std::path::{Path, PathBuf};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `merge` was called with an empty input list.
    #[error("At least one solution is needed")]
    NoInput,

    /// Two inputs declare different solution format versions.
    #[error("Cannot merge format version {found} ({}) into format version {expected}", path.display())]
    UnsupportedVersionMerge {
        expected: String,
        found: String,
        path: PathBuf,
    },

    /// A global section with no known merge policy.
    #[error("No merge policy for section '{name}'")]
    UnknownSection { name: String },

    /// A strict section key carries different values across inputs.
    #[error("Conflicting values for '{key}' in section '{section}': '{existing}' vs '{incoming}'")]
    ConflictingValue {
        section: String,
        key: String,
        existing: String,
        incoming: String,
    },

    /// A build-file tree does not have the shape the merge relies on.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("IO Error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A build file could not be parsed or serialized.
    #[error("XML Error in {}: {message}", path.display())]
    Xml { path: PathBuf, message: String },

    /// A solution-definition line could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    SolutionSyntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub(crate) fn xml(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Xml { path: path.as_ref().to_path_buf(), message: message.into() }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}
