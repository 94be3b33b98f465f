// apply_plan.rs — The record of which workspace files go back to the project.
//
// An apply plan is produced once, after a successful build, and names the
// files only. The workspace copy stays the source of truth for their
// content until the finalizer runs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use weave_workspace::WORKSPACE_SUBDIR;

use crate::error::ChangeSetError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyPlan {
    /// `%Y%m%d_%H%M%S` of the report run; also part of the file names.
    #[serde(default)]
    pub report_timestamp: String,
    /// Name of the project copy inside the workspace root.
    #[serde(default = "default_subpath")]
    pub source_workspace_subpath: String,
    /// Informational only; the finalizer is told its target explicitly.
    #[serde(default)]
    pub target_project_path_at_generation: String,
    /// Sorted, workspace-relative.
    #[serde(default, deserialize_with = "lenient_paths")]
    pub files_to_apply: Vec<String>,
    /// `None` when the diff report was empty and therefore not written.
    #[serde(default)]
    pub diff_report_filename: Option<String>,
}

// Serde default functions

fn default_subpath() -> String {
    WORKSPACE_SUBDIR.to_string()
}

/// A missing or non-list `files_to_apply` reads as "nothing to apply".
fn lenient_paths<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    })
}

impl ApplyPlan {
    pub fn new(
        report_timestamp: impl Into<String>,
        source_workspace_subpath: impl Into<String>,
        target_project: &Path,
        mut files: Vec<String>,
        diff_report_filename: Option<String>,
    ) -> Self {
        files.sort();
        files.dedup();
        Self {
            report_timestamp: report_timestamp.into(),
            source_workspace_subpath: source_workspace_subpath.into(),
            target_project_path_at_generation: target_project.display().to_string(),
            files_to_apply: files,
            diff_report_filename,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ChangeSetError> {
        if !path.is_file() {
            return Err(ChangeSetError::PlanMissing {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| ChangeSetError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| ChangeSetError::InvalidPlan {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ChangeSetError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ChangeSetError::IoError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.files_to_apply.is_empty()
    }
}
