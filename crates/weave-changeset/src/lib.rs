//! # weave-changeset
//!
//! Turning a successful workspace run into something a human can review,
//! then applying it to the real project.
//!
//! ## Key components
//!
//! - [`diff_report_text`] / [`write_report`] — unified diff per touched file
//!   plus the apply plan, under `modification_reports/`.
//! - [`ApplyPlan`] — the static record of which workspace files to copy back.
//! - [`Finalizer`] — backup-then-copy; the single point that writes to the
//!   target project.
//! - [`restore_from_backup`] — undo a finalization from its backup directory.

pub mod apply_plan;
pub mod backup;
pub mod error;
pub mod finalizer;
pub mod report;

pub use apply_plan::ApplyPlan;
pub use backup::{backup_dir_name, backup_files, restore_from_backup, RestoreOutcome, BACKUPS_DIR};
pub use error::ChangeSetError;
pub use finalizer::{ApplyOutcome, Finalizer};
pub use report::{diff_report_text, write_report, ChangeReport, REPORTS_DIR};
