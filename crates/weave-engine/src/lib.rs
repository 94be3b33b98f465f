//! # weave-engine
//!
//! Plans, agent steps and the build/retry loop that turn a natural-language
//! change request into an applied change set.
//!
//! Agents never touch the target project. They edit an isolated workspace
//! copy; a build command decides whether an attempt is good; only a passing
//! run produces a diff report and apply plan, and only the finalizer writes
//! into the real tree.
//!
//! ## Key components
//!
//! - [`Agent`] / [`AgentRegistry`] — named agents resolved at startup;
//!   [`CommandAgent`] runs an external process speaking JSON on stdio.
//! - [`WorkflowPlan`] — ordered steps from the planner or a plan file.
//! - [`StepExecutor`] — context assembly, agent call, workspace writes.
//! - [`BuildLoop`] — bounded attempts, build verification, error feedback.
//! - [`Pipeline`] — selection → planning → workspace → execution → apply,
//!   with [`StopAfter`] checkpoints.
//! - [`QualityAnalyzer`] — docstring and file-split proposals per inventory
//!   item, written as reviewable [`QualityReport`]s.

pub mod agent;
pub mod agents;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod plan;
pub mod quality;
pub mod retry_loop;

pub use agent::{Agent, AgentRegistry, AgentResponse, FileMutation, MutationEntry};
pub use agents::CommandAgent;
pub use command::{run_shell_command, CommandOutput, SourceFormatter};
pub use config::{AgentConfig, BuildConfig, FormatterConfig, QualityConfig};
pub use context::{assemble_expert_context, build_planner_context, ExpertContext, PlannerContext};
pub use error::EngineError;
pub use executor::{StepExecutor, StepOutcome};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome, StopAfter, PLANNER_AGENT, PLAN_FILE};
pub use plan::{PlanStep, WorkflowPlan};
pub use quality::{
    QualityAnalyzer, QualityEntry, QualityReport, QualityRun, QualityTask, QUALITY_REPORTS_DIR,
};
pub use retry_loop::{BuildLoop, LoopOutcome, LoopState};
