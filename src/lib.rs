pub mod copier;
pub mod error;
pub mod merge;
pub mod model;
pub mod msbuild;
pub mod progress;
pub mod references;
pub mod rewrite;
pub mod sln;

pub use copier::{copy_with_backup, write_with_backup, CopyMode, CopyOptions, CopyOutcome};
pub use error::{Error, Result};
pub use merge::{merge, merge_files, Merger};
pub use model::{FileReplacement, Project, Section, SectionPolicy, SolutionConfiguration};
pub use msbuild::{BuildTree, NodeId};
pub use progress::{NoProgress, Progress, TracingProgress};
pub use rewrite::{write_to, SolutionWriter};
pub use sln::{parse_solution, parse_solution_file, write_solution};
