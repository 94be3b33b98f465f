// paths.rs — Keeping relative paths inside their root.
//
// Paths handed to the engine by agents and apply plans are relative to a
// project root. Absolute paths and `..` components are refused.

use std::path::{Component, Path, PathBuf};

use crate::error::WorkspaceError;

/// Join `rel` onto `root`, refusing anything that could land outside it.
pub fn resolve_within(root: &Path, rel: &str) -> Result<PathBuf, WorkspaceError> {
    let traversal = || WorkspaceError::PathTraversal {
        path: rel.to_string(),
        root: root.to_path_buf(),
    };
    if rel.trim().is_empty() {
        return Err(traversal());
    }
    let mut joined = root.to_path_buf();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(traversal())
            }
        }
    }
    if joined == root {
        return Err(traversal());
    }
    Ok(joined)
}

/// Normalise a relative path to forward slashes without `./` segments.
pub fn normalize_relative(rel: &str) -> String {
    Path::new(rel)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
