// pipeline.rs — End-to-end modification run.
//
// Stages, in order: load the inventory, select relevant fragments, plan,
// prepare the workspace copy, run the build/retry loop, write the diff
// report and apply plan, finalize into the target project. A run can stop
// cleanly after any of the first four named stages.
//
// Structural problems (no inventory, selection or planning failure, a
// workspace that cannot be copied) come back as `Err`. A loop that never
// reaches a green build, or a finalization that does not fully apply, is an
// ordinary `success = false` outcome carrying the last error.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use weave_changeset::{write_report, ApplyOutcome, ChangeReport, Finalizer};
use weave_index::{FragmentSelector, Inventory, Selection, SelectionConfig};
use weave_workspace::{ExcludePatterns, Workspace, WORKSPACE_SUBDIR};

use crate::agent::AgentRegistry;
use crate::config::BuildConfig;
use crate::context::{build_planner_context, to_value};
use crate::error::EngineError;
use crate::executor::StepExecutor;
use crate::plan::WorkflowPlan;
use crate::retry_loop::BuildLoop;

/// Registry name of the planning agent.
pub const PLANNER_AGENT: &str = "planner";

/// File the raw planner response is saved to, under the workspace root.
pub const PLAN_FILE: &str = "workflow_plan.json";

/// Stage after which a run may stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAfter {
    Optimization,
    Planning,
    WorkspacePrep,
    Execution,
}

impl fmt::Display for StopAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopAfter::Optimization => write!(f, "optimization"),
            StopAfter::Planning => write!(f, "planning"),
            StopAfter::WorkspacePrep => write!(f, "workspace_prep"),
            StopAfter::Execution => write!(f, "execution"),
        }
    }
}

impl FromStr for StopAfter {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "optimization" => Ok(StopAfter::Optimization),
            "planning" => Ok(StopAfter::Planning),
            "workspace_prep" => Ok(StopAfter::WorkspacePrep),
            "execution" => Ok(StopAfter::Execution),
            _ => Err(EngineError::UnknownStage(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub target_root: PathBuf,
    pub workspace_root: PathBuf,
    pub inventory_path: PathBuf,
    /// Name of the project copy under `workspace_root`.
    pub subdir: String,
    pub excludes: ExcludePatterns,
    pub selection: SelectionConfig,
    pub build: BuildConfig,
    pub stop_after: Option<StopAfter>,
    /// Use this plan instead of calling the planner.
    pub plan_file: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(
        target_root: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
        inventory_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            target_root: target_root.into(),
            workspace_root: workspace_root.into(),
            inventory_path: inventory_path.into(),
            subdir: WORKSPACE_SUBDIR.to_string(),
            excludes: ExcludePatterns::defaults(),
            selection: SelectionConfig::default(),
            build: BuildConfig::default(),
            stop_after: None,
            plan_file: None,
        }
    }
}

/// What a run did and how far it got.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub success: bool,
    /// Set when the run ended early on request.
    pub stopped_after: Option<StopAfter>,
    pub last_error: Option<String>,
    pub selection: Selection,
    pub plan: Option<WorkflowPlan>,
    pub workspace_dir: Option<PathBuf>,
    pub touched: BTreeSet<String>,
    pub report: Option<ChangeReport>,
    pub apply: Option<ApplyOutcome>,
}

impl PipelineOutcome {
    fn stop(mut self, stage: StopAfter) -> Self {
        tracing::info!(stage = %stage, "stopping after requested stage");
        self.stopped_after = Some(stage);
        self
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<AgentRegistry>,
    selector: FragmentSelector,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<AgentRegistry>,
        selector: FragmentSelector,
    ) -> Self {
        Self {
            config,
            registry,
            selector,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&mut self, request: &str) -> Result<PipelineOutcome, EngineError> {
        let stop = self.config.stop_after;
        tracing::info!(
            target = %self.config.target_root.display(),
            workspace = %self.config.workspace_root.display(),
            stop_after = ?stop.map(|s| s.to_string()),
            "starting modification run"
        );

        // ── Inventory ───────────────────────────────────────────────
        let inventory = Arc::new(Inventory::load(&self.config.inventory_path)?);
        tracing::info!(fragments = inventory.len(), "inventory loaded");

        // ── Selection ───────────────────────────────────────────────
        let mut outcome = PipelineOutcome::default();
        if self.config.plan_file.is_none() || stop == Some(StopAfter::Optimization) {
            let selection = self
                .selector
                .select(request, self.config.selection.top_k, self.config.selection.threshold)
                .await?;
            if selection.is_empty() {
                tracing::warn!("selection found no relevant fragments, planning with none");
            }
            outcome.selection = selection;
        }
        if stop == Some(StopAfter::Optimization) {
            outcome.success = true;
            return Ok(outcome.stop(StopAfter::Optimization));
        }

        // ── Planning ────────────────────────────────────────────────
        let plan = match &self.config.plan_file {
            Some(path) => {
                tracing::info!(path = %path.display(), "using supplied plan");
                WorkflowPlan::load(path)?
            }
            None => self.plan(request, &outcome.selection, &inventory).await?,
        };
        tracing::info!(steps = plan.steps.len(), "plan ready");
        outcome.plan = Some(plan.clone());
        if stop == Some(StopAfter::Planning) {
            outcome.success = true;
            return Ok(outcome.stop(StopAfter::Planning));
        }

        // ── Workspace ───────────────────────────────────────────────
        let workspace = Workspace::prepare(
            &self.config.target_root,
            &self.config.workspace_root,
            &self.config.subdir,
            &self.config.excludes,
        )?;
        outcome.workspace_dir = Some(workspace.path().to_path_buf());
        if stop == Some(StopAfter::WorkspacePrep) {
            outcome.success = true;
            return Ok(outcome.stop(StopAfter::WorkspacePrep));
        }

        // ── Execution ───────────────────────────────────────────────
        let executor = StepExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&inventory),
            workspace.path(),
            &self.config.build,
        );
        let loop_outcome = BuildLoop::new(executor, &self.config.build)
            .run(&plan)
            .await?;
        outcome.touched = loop_outcome.touched;
        outcome.last_error = loop_outcome.last_error;
        outcome.success = loop_outcome.success;

        if !outcome.success {
            tracing::error!(attempts = loop_outcome.attempts, "execution did not reach a passing build");
        } else if outcome.touched.is_empty() {
            tracing::info!("build passed and no files changed, nothing to apply");
        } else {
            match write_report(
                &self.config.target_root,
                workspace.path(),
                &outcome.touched,
                &self.config.workspace_root,
            ) {
                Ok(report) => outcome.report = Some(report),
                Err(e) => {
                    tracing::error!(error = %e, "cannot write apply plan");
                    outcome.success = false;
                    outcome.last_error = Some(e.to_string());
                }
            }
        }
        if stop == Some(StopAfter::Execution) {
            return Ok(outcome.stop(StopAfter::Execution));
        }

        // ── Finalization ────────────────────────────────────────────
        if !outcome.success {
            return Ok(outcome);
        }
        let Some(plan_path) = outcome.report.as_ref().map(|r| r.apply_plan_path.clone()) else {
            return Ok(outcome);
        };
        let finalizer = Finalizer::new(&self.config.workspace_root, &self.config.target_root);
        match finalizer.apply_file(&plan_path) {
            Ok(applied) => {
                if !applied.success() {
                    outcome.success = false;
                    outcome.last_error = Some(format!(
                        "{} file(s) could not be applied; originals are in {}",
                        applied.failed.len(),
                        applied
                            .backup_dir
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "no backup".to_string())
                    ));
                }
                outcome.apply = Some(applied);
            }
            Err(e) => {
                tracing::error!(error = %e, "finalization failed");
                outcome.success = false;
                outcome.last_error = Some(e.to_string());
            }
        }
        Ok(outcome)
    }

    /// Ask the planner agent for a plan. The raw response is saved when it
    /// is an object, whether or not it is usable.
    async fn plan(
        &self,
        request: &str,
        selection: &Selection,
        inventory: &Inventory,
    ) -> Result<WorkflowPlan, EngineError> {
        let planner = self.registry.resolve(PLANNER_AGENT)?;
        let context = build_planner_context(
            request,
            Some(selection.rationale.as_str()),
            &selection.ids,
            inventory,
            &self.config.target_root,
        );
        tracing::info!(agent = PLANNER_AGENT, fragments = context.relevant_code_fragments.len(), "calling planner");
        let response = planner
            .run(&to_value(&context)?)
            .await
            .map_err(|e| EngineError::PlanningFailed(e.to_string()))?;

        if response.is_object() {
            self.save_planner_response(&response)?;
        }
        WorkflowPlan::from_planner_response(&response)
    }

    fn save_planner_response(&self, response: &Value) -> Result<(), EngineError> {
        let root = &self.config.workspace_root;
        fs::create_dir_all(root).map_err(|source| EngineError::IoError {
            path: root.clone(),
            source,
        })?;
        let path = root.join(PLAN_FILE);
        fs::write(&path, serde_json::to_string_pretty(response)?)
            .map_err(|source| EngineError::IoError {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "planner response saved");
        Ok(())
    }
}
