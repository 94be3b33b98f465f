//! # weave-workspace
//!
//! Isolated, disposable copies of a target project.
//!
//! Agents edit and builds run against the copy only; the real project is
//! touched later by the finalizer, after review artifacts exist.
//!
//! ## Key components
//!
//! - [`Workspace`] — prepare (delete + copy), open, cleanup.
//! - [`ExcludePatterns`] — glob-based name excludes, defaults or
//!   `.weaveignore`.
//! - [`resolve_within`] — refuses relative paths that escape their root.

pub mod error;
pub mod excludes;
pub mod paths;
pub mod workspace;

pub use error::WorkspaceError;
pub use excludes::{ExcludePatterns, DEFAULT_EXCLUDES, IGNORE_FILE};
pub use paths::{normalize_relative, resolve_within};
pub use workspace::{Workspace, WORKSPACE_SUBDIR};
