// error.rs — Error types for the execution engine.

use std::path::PathBuf;
use thiserror::Error;

use weave_changeset::ChangeSetError;
use weave_index::IndexError;
use weave_workspace::WorkspaceError;

/// Errors that can occur while planning or executing a modification run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No agent is registered under this name.
    #[error("unknown agent '{name}'")]
    UnknownAgent { name: String },

    /// A plan step does not name an agent.
    #[error("step {step_id} does not name an agent")]
    MissingAgentName { step_id: String },

    /// The agent process or call failed before producing a response.
    #[error("agent '{agent}' failed: {message}")]
    AgentFailed { agent: String, message: String },

    /// The agent answered, but not with a usable response.
    #[error("agent '{agent}' returned an invalid response: {reason}")]
    InvalidResponse { agent: String, reason: String },

    /// The agent did not answer within its time budget.
    #[error("agent '{agent}' timed out after {secs}s")]
    AgentTimeout { agent: String, secs: u64 },

    /// The planner did not produce a usable plan.
    #[error("planning failed: {0}")]
    PlanningFailed(String),

    /// A plan file does not exist.
    #[error("plan file not found: {path}")]
    PlanMissing { path: PathBuf },

    /// A plan file cannot be parsed.
    #[error("invalid plan {path}: {reason}")]
    InvalidPlan { path: PathBuf, reason: String },

    /// The build/retry loop attempted an impossible state change.
    #[error("invalid loop transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Unknown `--stop-after` stage.
    #[error("unknown stage '{0}' (expected optimization, planning, workspace_prep or execution)")]
    UnknownStage(String),

    /// Unknown quality task name.
    #[error("unknown quality task '{0}' (expected docstrings or filesplit)")]
    UnknownQualityTask(String),

    /// A quality report does not exist.
    #[error("quality report not found: {path}")]
    QualityReportMissing { path: PathBuf },

    /// A quality report cannot be parsed.
    #[error("invalid quality report {path}: {reason}")]
    InvalidQualityReport { path: PathBuf, reason: String },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
