// quality.rs — `weave quality`: docstring and file-split proposals.

use std::path::Path;
use std::sync::Arc;

use weave_engine::{AgentRegistry, QualityAnalyzer, QualityRun, QualityTask};
use weave_index::Inventory;

use crate::config::WeaveConfig;

pub async fn execute(
    config: &WeaveConfig,
    task: Option<QualityTask>,
    only: Option<&str>,
    retry_errors: Option<&Path>,
) -> anyhow::Result<bool> {
    let target_root = config.target_root()?;
    let inventory = Inventory::load(&config.inventory_path())?;
    let analyzer = QualityAnalyzer::new(
        Arc::new(AgentRegistry::from_config(&config.agents)),
        Arc::new(inventory),
        target_root,
        config.workspace_root(),
        config.quality.clone(),
    );

    let run = match (retry_errors, task) {
        (Some(report), _) => analyzer.retry_errors(report).await?,
        (None, Some(task)) => analyzer.analyze(task, only).await?,
        (None, None) => anyhow::bail!("name a quality task (docstrings or filesplit) or pass --retry-errors"),
    };
    print_summary(&run);
    Ok(run.success())
}

fn print_summary(run: &QualityRun) {
    println!(
        "Quality '{}': {} item(s) analysed, {} proposal(s), {} error(s).",
        run.task,
        run.analyzed,
        run.proposals(),
        run.report.error_count()
    );
    for entry in run.report.entries.iter().filter(|e| e.is_error()) {
        let reason = entry
            .agent_response
            .get("error_message")
            .and_then(|m| m.as_str())
            .unwrap_or("unspecified");
        println!("  ERROR {}: {}", entry.item, reason);
    }
    println!("Report: {}", run.report_path.display());
    if !run.success() {
        println!(
            "Re-run the failed entries with: weave quality --retry-errors {}",
            run.report_path.display()
        );
    }
}
