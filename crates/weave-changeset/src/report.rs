// report.rs — Reviewable diff report and apply plan for a finished run.
//
// After a successful build the touched paths are compared between the real
// project and the workspace copy. The result is two files under
// `<workspace_root>/modification_reports/`: a plain-text unified diff
// (only written when it has content) and the apply plan that the
// finalizer consumes.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use crate::apply_plan::ApplyPlan;
use crate::error::ChangeSetError;

/// Directory under the workspace root that holds reports and plans.
pub const REPORTS_DIR: &str = "modification_reports";

/// Timestamp format shared by report and plan file names.
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths of the files produced by [`write_report`].
#[derive(Debug, Clone)]
pub struct ChangeReport {
    pub timestamp: String,
    pub diff_report_path: Option<PathBuf>,
    pub apply_plan_path: PathBuf,
    pub plan: ApplyPlan,
}

fn read_lossy(path: &Path) -> Result<String, ChangeSetError> {
    let bytes = fs::read(path).map_err(|source| ChangeSetError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render one section per touched path, sorted.
pub fn diff_report_text(
    original_root: &Path,
    workspace_dir: &Path,
    touched: &BTreeSet<String>,
) -> Result<String, ChangeSetError> {
    if touched.is_empty() {
        return Ok("No files marked as modified in the workspace.\n".to_string());
    }

    let mut out = String::new();
    for rel in touched {
        let original = original_root.join(rel);
        let modified = workspace_dir.join(rel);
        out.push_str(&format!("--- Diff for {} ---\n", rel));

        if !modified.is_file() {
            out.push_str(&format!(
                "ERROR: modified file '{}' not found in workspace.\n\n",
                modified.display()
            ));
            continue;
        }

        let new_text = read_lossy(&modified)?;
        let existed = original.is_file();
        let (old_text, from_label) = if existed {
            (read_lossy(&original)?, format!("a/{}", rel))
        } else {
            out.push_str(&format!("+++ New file: {}\n", rel));
            (String::new(), "/dev/null".to_string())
        };

        let diff = TextDiff::from_lines(old_text.as_str(), new_text.as_str())
            .unified_diff()
            .context_radius(3)
            .header(&from_label, &format!("b/{}", rel))
            .to_string();
        if !diff.is_empty() {
            out.push_str(&diff);
        } else if existed {
            out.push_str("No textual difference.\n");
        }
        out.push_str("\n\n");
    }
    Ok(out)
}

/// Write the diff report and apply plan for `touched` into
/// `<workspace_root>/modification_reports/`.
///
/// A diff report that cannot be written is logged and left out of the plan;
/// a plan that cannot be written is an error.
pub fn write_report(
    original_root: &Path,
    workspace_dir: &Path,
    touched: &BTreeSet<String>,
    workspace_root: &Path,
) -> Result<ChangeReport, ChangeSetError> {
    let reports_dir = workspace_root.join(REPORTS_DIR);
    fs::create_dir_all(&reports_dir).map_err(|source| ChangeSetError::IoError {
        path: reports_dir.clone(),
        source,
    })?;
    let timestamp = chrono::Local::now()
        .format(REPORT_TIMESTAMP_FORMAT)
        .to_string();
    tracing::info!(timestamp = %timestamp, files = touched.len(), "generating diff report and apply plan");

    let text = diff_report_text(original_root, workspace_dir, touched)?;
    let mut diff_report_path = None;
    if text.trim().is_empty() {
        tracing::info!("diff report is empty, not written");
    } else {
        let path = reports_dir.join(format!("diff_report_{}.txt", timestamp));
        match fs::write(&path, &text) {
            Ok(()) => diff_report_path = Some(path),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to write diff report");
            }
        }
    }

    let subpath = workspace_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let plan = ApplyPlan::new(
        timestamp.clone(),
        subpath,
        original_root,
        touched.iter().cloned().collect(),
        diff_report_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string()),
    );
    let apply_plan_path = reports_dir.join(format!("apply_plan_{}.json", timestamp));
    plan.save(&apply_plan_path)?;
    tracing::info!(path = %apply_plan_path.display(), "apply plan saved");

    Ok(ChangeReport {
        timestamp,
        diff_report_path,
        apply_plan_path,
        plan,
    })
}
