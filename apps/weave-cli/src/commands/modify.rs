// modify.rs — `weave modify`: the full request-to-change workflow.

use std::path::PathBuf;
use std::sync::Arc;

use weave_engine::{AgentRegistry, Pipeline, PipelineConfig, PipelineOutcome, StopAfter, PLANNER_AGENT};
use weave_index::{FragmentSelector, OllamaEmbedder};

use crate::config::WeaveConfig;

pub async fn execute(
    config: &WeaveConfig,
    request: &str,
    stop_after: Option<StopAfter>,
    plan_file: Option<PathBuf>,
) -> anyhow::Result<bool> {
    let target_root = config.target_root()?;

    let registry = AgentRegistry::from_config(&config.agents);
    if plan_file.is_none() && !registry.contains(PLANNER_AGENT) {
        tracing::warn!("no [agents.planner] configured; planning will fail");
    }

    let mut pipeline_config = PipelineConfig::new(
        &target_root,
        config.workspace_root(),
        config.inventory_path(),
    );
    pipeline_config.subdir = config.workspace.subdir.clone();
    pipeline_config.excludes = config.excludes(&target_root)?;
    pipeline_config.selection = config.selection.clone();
    pipeline_config.build = config.build.clone();
    pipeline_config.stop_after = stop_after;
    pipeline_config.plan_file = plan_file;

    let selector = FragmentSelector::new(
        config.embedding_store(),
        config.inventory_path(),
        Arc::new(OllamaEmbedder::new(&config.embedding)?),
        config.embedding.clone(),
    );

    let mut pipeline = Pipeline::new(pipeline_config, Arc::new(registry), selector);
    let outcome = pipeline.run(request).await?;
    print_summary(&outcome);
    Ok(outcome.success)
}

fn print_summary(outcome: &PipelineOutcome) {
    if !outcome.selection.is_empty() {
        println!("Selected {} fragment(s):", outcome.selection.ids.len());
        for (id, distance) in outcome.selection.ids.iter().zip(&outcome.selection.distances) {
            println!("  {:.4}  {}", distance, id);
        }
    }
    if let Some(plan) = &outcome.plan {
        println!("Plan: {} step(s).", plan.steps.len());
    }
    if let Some(dir) = &outcome.workspace_dir {
        println!("Workspace: {}", dir.display());
    }
    if !outcome.touched.is_empty() {
        println!("Changed in workspace:");
        for path in &outcome.touched {
            println!("  {}", path);
        }
    }
    if let Some(report) = &outcome.report {
        if let Some(diff) = &report.diff_report_path {
            println!("Diff report: {}", diff.display());
        }
        println!("Apply plan: {}", report.apply_plan_path.display());
    }
    if let Some(applied) = &outcome.apply {
        println!("Applied {} file(s).", applied.applied.len());
        if let Some(backup) = &applied.backup_dir {
            println!("Backup: {}", backup.display());
        }
        for (path, reason) in &applied.failed {
            println!("  FAILED {}: {}", path, reason);
        }
    }

    match (outcome.stopped_after, outcome.success) {
        (Some(stage), true) => println!("Stopped after '{}' as requested.", stage),
        (Some(stage), false) => println!(
            "Stopped after '{}' with errors: {}",
            stage,
            outcome.last_error.as_deref().unwrap_or("unspecified")
        ),
        (None, true) => println!("Modification workflow succeeded."),
        (None, false) => println!(
            "Modification workflow failed: {}",
            outcome.last_error.as_deref().unwrap_or("unspecified")
        ),
    }
}
