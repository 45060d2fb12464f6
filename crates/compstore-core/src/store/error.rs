//! # Compstore Store Errors
//!
//! Failures that abort a whole load or save cycle of a component store:
//! format version problems, declined migrations, read-only targets and
//! lifecycle misuse.
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::error::Error;
use crate::storage::session::SaveOutcome;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{path}' has format version {found}; this build supports up to {supported}")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("Migration from version {from} to {to} was declined ({} file(s) left untouched)", files.len())]
    MigrationDeclined {
        files: Vec<PathBuf>,
        from: u32,
        to: u32,
    },

    #[error("'{path}' has an invalid version attribute '{value}'")]
    InvalidVersion { path: PathBuf, value: String },

    #[error("Cannot save, read-only file(s): {}", display_paths(.0))]
    ReadOnlyFiles(Vec<PathBuf>),

    #[error("Component '{0}' is already registered")]
    DuplicateComponent(String),

    #[error("Component '{0}' is not registered")]
    UnknownComponent(String),

    #[error("Store is not loaded")]
    NotLoaded,

    #[error("Store has been disposed")]
    Disposed,

    /// Project-level save failed after its modules were saved
    #[error("Project save failed: {error}")]
    ProjectSaveFailed {
        error: Box<Error>,
        modules: SaveOutcome,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
