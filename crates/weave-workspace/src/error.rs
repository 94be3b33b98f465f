// error.rs — Error types for the workspace subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing an isolated workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The project to copy is not a directory.
    #[error("target project '{path}' is not a directory")]
    TargetNotDirectory { path: PathBuf },

    /// A previous workspace copy could not be removed.
    #[error("cannot remove previous workspace at {path}: {source}")]
    StaleWorkspace {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A relative path escapes the directory it is meant to stay in.
    #[error("path traversal detected: '{path}' resolves outside {root}")]
    PathTraversal { path: String, root: PathBuf },

    /// An exclude pattern is not a valid glob.
    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
