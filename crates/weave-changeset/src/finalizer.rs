// finalizer.rs — Promoting workspace files into the real project.
//
// This is the only place that writes to the target project. Every original
// file about to be overwritten is backed up first; if the backup fails the
// target is left untouched. Copying is best-effort per file: a missing
// workspace source is recorded and the remaining files are still applied.

use std::fs;
use std::path::{Path, PathBuf};

use weave_workspace::resolve_within;

use crate::apply_plan::ApplyPlan;
use crate::backup::{backup_dir_name, backup_files, BACKUPS_DIR};
use crate::error::ChangeSetError;

/// Result of applying a plan.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub applied: Vec<String>,
    /// Planned paths that could not be copied, with the reason.
    pub failed: Vec<(String, String)>,
    /// Set when at least one original file was backed up.
    pub backup_dir: Option<PathBuf>,
}

impl ApplyOutcome {
    /// True when every planned file reached the target.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies plans from one workspace root onto one target project.
#[derive(Debug, Clone)]
pub struct Finalizer {
    workspace_root: PathBuf,
    target_root: PathBuf,
}

impl Finalizer {
    pub fn new(workspace_root: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            target_root: target_root.into(),
        }
    }

    /// Load the plan at `plan_path` and apply it.
    pub fn apply_file(&self, plan_path: &Path) -> Result<ApplyOutcome, ChangeSetError> {
        let plan = ApplyPlan::load(plan_path)?;
        tracing::info!(plan = %plan_path.display(), files = plan.files_to_apply.len(), "applying plan");
        self.apply(&plan)
    }

    pub fn apply(&self, plan: &ApplyPlan) -> Result<ApplyOutcome, ChangeSetError> {
        let mut outcome = ApplyOutcome::default();
        if plan.is_empty() {
            tracing::info!("apply plan is empty, nothing to apply");
            return Ok(outcome);
        }

        let source_dir = resolve_within(&self.workspace_root, &plan.source_workspace_subpath)?;
        let backup_dir = self
            .workspace_root
            .join(BACKUPS_DIR)
            .join(backup_dir_name(chrono::Local::now()));

        let backed_up = backup_files(&self.target_root, &plan.files_to_apply, &backup_dir)
            .inspect_err(|e| {
                tracing::error!(error = %e, "backup failed, no changes applied");
            })?;
        if !backed_up.is_empty() {
            outcome.backup_dir = Some(backup_dir);
        }

        for rel in &plan.files_to_apply {
            match self.copy_one(&source_dir, rel) {
                Ok(()) => {
                    tracing::debug!(file = %rel, "applied");
                    outcome.applied.push(rel.clone());
                }
                Err(reason) => {
                    tracing::error!(file = %rel, error = %reason, "failed to apply file");
                    outcome.failed.push((rel.clone(), reason));
                }
            }
        }

        if outcome.success() {
            tracing::info!(applied = outcome.applied.len(), "apply plan completed");
        } else {
            tracing::error!(
                applied = outcome.applied.len(),
                failed = outcome.failed.len(),
                backup_dir = ?outcome.backup_dir,
                "apply plan partially applied, check the backup"
            );
        }
        Ok(outcome)
    }

    fn copy_one(&self, source_dir: &Path, rel: &str) -> Result<(), String> {
        let src = resolve_within(source_dir, rel).map_err(|e| e.to_string())?;
        let dst = resolve_within(&self.target_root, rel).map_err(|e| e.to_string())?;
        if !src.is_file() {
            return Err(format!("source '{}' not found in workspace", src.display()));
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        fs::copy(&src, &dst).map_err(|e| e.to_string())?;
        Ok(())
    }
}
