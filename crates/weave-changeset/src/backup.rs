// backup.rs — Copies of original files taken before the finalizer writes.
//
// Backups mirror the project layout: `<backup_dir>/<relative path>`. Only
// files that exist in the target are backed up; files the plan creates have
// nothing to preserve.

use std::fs;
use std::path::{Path, PathBuf};

use weave_workspace::resolve_within;

use crate::error::ChangeSetError;

/// Directory under the workspace root that holds backup runs.
pub const BACKUPS_DIR: &str = "backups";

/// `backup_modifier_apply_<%Y%m%d_%H%M%S_micros>`.
pub fn backup_dir_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("backup_modifier_apply_{}", now.format("%Y%m%d_%H%M%S_%6f"))
}

/// Back up every existing file among `rel_paths` from `target_root` into
/// `backup_dir`. Returns the paths actually backed up.
///
/// The first failure aborts; callers must not write anything afterwards.
pub fn backup_files(
    target_root: &Path,
    rel_paths: &[String],
    backup_dir: &Path,
) -> Result<Vec<String>, ChangeSetError> {
    let mut pending = Vec::new();
    for rel in rel_paths {
        let src = resolve_within(target_root, rel)?;
        if src.is_file() {
            pending.push((rel.clone(), src));
        }
    }
    if pending.is_empty() {
        tracing::info!("no existing target files to back up");
        return Ok(Vec::new());
    }

    let fail = |file: &str, source: std::io::Error| ChangeSetError::BackupFailed {
        file: file.to_string(),
        backup_dir: backup_dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(backup_dir).map_err(|e| fail("", e))?;

    let mut saved = Vec::with_capacity(pending.len());
    for (rel, src) in pending {
        let dst = resolve_within(backup_dir, &rel)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(&rel, e))?;
        }
        fs::copy(&src, &dst).map_err(|e| fail(&rel, e))?;
        tracing::debug!(file = %rel, "backed up");
        saved.push(rel);
    }
    tracing::info!(
        count = saved.len(),
        backup_dir = %backup_dir.display(),
        "original files backed up"
    );
    Ok(saved)
}

/// Result of [`restore_from_backup`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreOutcome {
    pub restored: Vec<String>,
    /// Requested paths with no copy in the backup.
    pub missing: Vec<String>,
    /// Paths whose copy back into the target failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl RestoreOutcome {
    pub fn success(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}

/// Copy backed-up files back into `target_root`.
///
/// `files = None` restores everything in the backup.
pub fn restore_from_backup(
    backup_dir: &Path,
    target_root: &Path,
    files: Option<&[String]>,
) -> Result<RestoreOutcome, ChangeSetError> {
    if !backup_dir.is_dir() {
        return Err(ChangeSetError::BackupMissing {
            path: backup_dir.to_path_buf(),
        });
    }
    let requested = match files {
        Some(files) => files.to_vec(),
        None => {
            let mut all = Vec::new();
            walk_files(backup_dir, backup_dir, &mut all)?;
            all.sort();
            all
        }
    };
    tracing::info!(
        backup_dir = %backup_dir.display(),
        files = requested.len(),
        "restoring from backup"
    );

    let mut outcome = RestoreOutcome::default();
    for rel in requested {
        let src = resolve_within(backup_dir, &rel)?;
        let dst = resolve_within(target_root, &rel)?;
        if !src.is_file() {
            tracing::warn!(file = %rel, "no backup copy, not restored");
            outcome.missing.push(rel);
            continue;
        }
        let copied = match dst.parent() {
            Some(parent) => fs::create_dir_all(parent).and_then(|_| fs::copy(&src, &dst)),
            None => fs::copy(&src, &dst),
        };
        match copied {
            Ok(_) => outcome.restored.push(rel),
            Err(e) => {
                tracing::error!(file = %rel, error = %e, "restore failed");
                outcome.failed.push((rel, e.to_string()));
            }
        }
    }
    tracing::info!(
        restored = outcome.restored.len(),
        missing = outcome.missing.len(),
        failed = outcome.failed.len(),
        "restore finished"
    );
    Ok(outcome)
}

fn walk_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), ChangeSetError> {
    let entries = fs::read_dir(dir).map_err(|source| ChangeSetError::IoError {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ChangeSetError::IoError {
            path: dir.to_path_buf(),
            source,
        })?;
        let path: PathBuf = entry.path();
        if path.is_dir() {
            walk_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }
    Ok(())
}
