// workspace.rs — Isolated copy of the target project.
//
// Each modification run owns one workspace: `<workspace_root>/<subdir>/`.
// Preparing it deletes whatever a previous run left there and copies the
// target project in, minus excluded entries. A copy that fails halfway is
// removed again so a half-populated directory is never handed out.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;
use crate::excludes::ExcludePatterns;

/// Reserved name of the project copy inside the workspace root.
pub const WORKSPACE_SUBDIR: &str = "current_project_state";

#[derive(Debug, Clone)]
pub struct Workspace {
    target_root: PathBuf,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh copy of `target_root` at `workspace_root/subdir`.
    pub fn prepare(
        target_root: impl AsRef<Path>,
        workspace_root: impl AsRef<Path>,
        subdir: &str,
        excludes: &ExcludePatterns,
    ) -> Result<Self, WorkspaceError> {
        let target_root = target_root.as_ref();
        let workspace_root = workspace_root.as_ref();
        if !target_root.is_dir() {
            return Err(WorkspaceError::TargetNotDirectory {
                path: target_root.to_path_buf(),
            });
        }

        let dest = workspace_root.join(subdir);
        if dest.exists() {
            tracing::info!(path = %dest.display(), "removing previous workspace copy");
            fs::remove_dir_all(&dest).map_err(|source| WorkspaceError::StaleWorkspace {
                path: dest.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&dest).map_err(|source| WorkspaceError::IoError {
            path: dest.clone(),
            source,
        })?;

        // The workspace may live inside the target; never copy it into itself.
        let guard = workspace_root.canonicalize().ok();

        tracing::info!(
            target = %target_root.display(),
            workspace = %dest.display(),
            "copying target project into workspace"
        );
        if let Err(e) = copy_dir_recursive(target_root, &dest, excludes, guard.as_deref()) {
            tracing::error!(error = %e, "workspace copy failed, cleaning up");
            if let Err(cleanup) = fs::remove_dir_all(&dest) {
                tracing::error!(path = %dest.display(), error = %cleanup, "cleanup of partial workspace failed");
            }
            return Err(e);
        }

        let path = dest.canonicalize().map_err(|source| WorkspaceError::IoError {
            path: dest.clone(),
            source,
        })?;
        Ok(Self {
            target_root: target_root.to_path_buf(),
            path,
        })
    }

    /// Wrap an existing workspace copy (e.g., one named by an apply plan).
    pub fn open(target_root: impl AsRef<Path>, path: impl AsRef<Path>) -> Self {
        Self {
            target_root: target_root.as_ref().to_path_buf(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Final path component of the copy (the subdir name).
    pub fn subdir_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| WORKSPACE_SUBDIR.to_string())
    }

    /// Delete the workspace copy.
    pub fn cleanup(self) -> Result<(), WorkspaceError> {
        if self.path.exists() {
            fs::remove_dir_all(&self.path).map_err(|source| WorkspaceError::IoError {
                path: self.path,
                source,
            })?;
        }
        Ok(())
    }
}

// ── Directory copy ──────────────────────────────────────────────

fn copy_dir_recursive(
    src: &Path,
    dst: &Path,
    excludes: &ExcludePatterns,
    guard: Option<&Path>,
) -> Result<(), WorkspaceError> {
    let entries = fs::read_dir(src).map_err(|source| WorkspaceError::IoError {
        path: src.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::IoError {
            path: src.to_path_buf(),
            source,
        })?;
        let file_name = entry.file_name();
        if excludes.should_exclude(&file_name.to_string_lossy()) {
            continue;
        }

        let src_path = entry.path();
        let dst_path = dst.join(&file_name);
        let file_type = entry.file_type().map_err(|source| WorkspaceError::IoError {
            path: src_path.clone(),
            source,
        })?;

        if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else if file_type.is_dir() {
            if let Some(guard) = guard {
                if src_path.canonicalize().ok().as_deref() == Some(guard) {
                    continue;
                }
            }
            fs::create_dir_all(&dst_path).map_err(|source| WorkspaceError::IoError {
                path: dst_path.clone(),
                source,
            })?;
            copy_dir_recursive(&src_path, &dst_path, excludes, guard)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|source| WorkspaceError::IoError {
                path: src_path.clone(),
                source,
            })?;
        }
    }

    Ok(())
}

/// Recreate a symlink as a link; its target is never followed.
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), WorkspaceError> {
    let link = fs::read_link(src).map_err(|source| WorkspaceError::IoError {
        path: src.to_path_buf(),
        source,
    })?;
    std::os::unix::fs::symlink(&link, dst).map_err(|source| WorkspaceError::IoError {
        path: dst.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<(), WorkspaceError> {
    tracing::warn!(path = %src.display(), "symlink left out of workspace copy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_target_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module example.com/app\n").unwrap();
        fs::create_dir_all(dir.path().join("internal/api")).unwrap();
        fs::write(dir.path().join("internal/api/api.go"), "package api\n").unwrap();
        fs::write(dir.path().join("internal/api/api_test.go"), "package api\n").unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/left-pad")).unwrap();
        fs::write(dir.path().join("node_modules/left-pad/index.js"), "").unwrap();
        dir
    }

    #[test]
    fn prepare_copies_project_without_excluded_entries() {
        let target = create_target_project();
        let ws_root = TempDir::new().unwrap();

        let ws = Workspace::prepare(
            target.path(),
            ws_root.path(),
            WORKSPACE_SUBDIR,
            &ExcludePatterns::defaults(),
        )
        .unwrap();

        assert!(ws.path().join("go.mod").exists());
        assert!(ws.path().join("internal/api/api.go").exists());
        assert!(!ws.path().join("internal/api/api_test.go").exists());
        assert!(!ws.path().join(".git").exists());
        assert!(!ws.path().join("node_modules").exists());
        assert_eq!(ws.subdir_name(), WORKSPACE_SUBDIR);
    }

    #[test]
    fn prepare_replaces_previous_copy() {
        let target = create_target_project();
        let ws_root = TempDir::new().unwrap();
        let stale = ws_root.path().join(WORKSPACE_SUBDIR);
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("leftover.go"), "package old\n").unwrap();

        let ws = Workspace::prepare(
            target.path(),
            ws_root.path(),
            WORKSPACE_SUBDIR,
            &ExcludePatterns::defaults(),
        )
        .unwrap();
        assert!(!ws.path().join("leftover.go").exists());
        assert!(ws.path().join("go.mod").exists());
    }

    #[test]
    fn workspace_nested_in_target_is_not_copied_into_itself() {
        let target = create_target_project();
        let ws_root = target.path().join(".weave-runs");

        let ws = Workspace::prepare(
            target.path(),
            &ws_root,
            WORKSPACE_SUBDIR,
            &ExcludePatterns::none(),
        )
        .unwrap();
        assert!(ws.path().join("go.mod").exists());
        assert!(!ws.path().join(".weave-runs").exists());
    }

    #[test]
    fn missing_target_is_an_error() {
        let ws_root = TempDir::new().unwrap();
        let err = Workspace::prepare(
            ws_root.path().join("nope"),
            ws_root.path(),
            WORKSPACE_SUBDIR,
            &ExcludePatterns::defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkspaceError::TargetNotDirectory { .. }));
        assert!(!ws_root.path().join(WORKSPACE_SUBDIR).exists());
    }

    #[test]
    fn cleanup_removes_copy() {
        let target = create_target_project();
        let ws_root = TempDir::new().unwrap();
        let ws = Workspace::prepare(
            target.path(),
            ws_root.path(),
            WORKSPACE_SUBDIR,
            &ExcludePatterns::defaults(),
        )
        .unwrap();
        let path = ws.path().to_path_buf();
        ws.cleanup().unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_copy_leaves_no_partial_workspace() {
        use std::os::unix::fs::PermissionsExt;

        let target = create_target_project();
        let locked = target.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("secret.go"), "package locked\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; nothing to assert in that case.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let ws_root = TempDir::new().unwrap();
        let result = Workspace::prepare(
            target.path(),
            ws_root.path(),
            WORKSPACE_SUBDIR,
            &ExcludePatterns::defaults(),
        );
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_err());
        assert!(!ws_root.path().join(WORKSPACE_SUBDIR).exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_copied_as_links_without_following() {
        use std::os::unix::fs::symlink;

        let target = create_target_project();
        symlink(target.path(), target.path().join("internal/api/loop")).unwrap();
        symlink("api.go", target.path().join("internal/api/alias.go")).unwrap();

        let ws_root = TempDir::new().unwrap();
        let ws = Workspace::prepare(
            target.path(),
            ws_root.path(),
            WORKSPACE_SUBDIR,
            &ExcludePatterns::defaults(),
        )
        .unwrap();

        let copied_loop = ws.path().join("internal/api/loop");
        assert!(fs::symlink_metadata(&copied_loop).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&copied_loop).unwrap(), target.path());

        let alias = ws.path().join("internal/api/alias.go");
        assert_eq!(fs::read_link(&alias).unwrap(), PathBuf::from("api.go"));
        assert_eq!(fs::read_to_string(&alias).unwrap(), "package api\n");
    }
}
