// error.rs — Error types for the changeset subsystem.

use std::path::PathBuf;
use thiserror::Error;

use weave_workspace::WorkspaceError;

/// Errors that can occur while reporting on or applying a change-set.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The apply plan file does not exist.
    #[error("apply plan not found: {path}")]
    PlanMissing { path: PathBuf },

    /// The apply plan file exists but cannot be parsed.
    #[error("invalid apply plan {path}: {reason}")]
    InvalidPlan { path: PathBuf, reason: String },

    /// Backing up an original file failed; nothing was written to the target.
    #[error("backup of '{file}' into {backup_dir} failed: {source}")]
    BackupFailed {
        file: String,
        backup_dir: PathBuf,
        source: std::io::Error,
    },

    /// The backup directory to restore from does not exist.
    #[error("backup directory not found: {path}")]
    BackupMissing { path: PathBuf },

    /// A planned path escapes the project or workspace root.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
