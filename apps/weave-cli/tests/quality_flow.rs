//! Quality analyses with agents running as real processes: report
//! contents, and re-running the entries a report marked as errors.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use weave_engine::{
    AgentConfig, AgentRegistry, QualityAnalyzer, QualityConfig, QualityReport, QualityTask,
    QUALITY_REPORTS_DIR,
};
use weave_index::{FragmentInfo, Inventory};

struct Project {
    _dir: TempDir,
    root: PathBuf,
    target: PathBuf,
    workspace: PathBuf,
    inventory: Arc<Inventory>,
}

fn project() -> Project {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let target = root.join("app");
    let workspace = root.join("runs");
    fs::create_dir_all(&target).unwrap();
    fs::create_dir_all(&workspace).unwrap();
    fs::write(
        target.join("main.go"),
        "package main\n\nfunc Start() {\n}\n\nfunc Broken() {\n}\n",
    )
    .unwrap();
    let long: String = std::iter::once("package store\n".to_string())
        .chain((0..30).map(|i| format!("var v{} = {}\n", i, i)))
        .collect();
    fs::write(target.join("store.go"), long).unwrap();

    let mut inventory = Inventory::default();
    for (id, path, start, end) in [
        ("main.Start", "main.go", 3, 4),
        ("main.Broken", "main.go", 6, 7),
        ("store.v0", "store.go", 2, 2),
    ] {
        inventory.fragments.insert(
            id.into(),
            FragmentInfo {
                original_path: Some(path.into()),
                fragment_type: Some("function".into()),
                start_line: Some(start),
                end_line: Some(end),
                ..Default::default()
            },
        );
    }

    Project {
        _dir: dir,
        root,
        target,
        workspace,
        inventory: Arc::new(inventory),
    }
}

/// An agent process that answers with an error for any context mentioning
/// `Broken`, until `fixed.marker` exists next to the project.
fn flaky_agent(p: &Project, success: &str) -> AgentConfig {
    let marker = p.root.join("fixed.marker");
    let script = format!(
        "input=$(cat); \
         if [ -f '{marker}' ] || ! printf '%s' \"$input\" | grep -q Broken; then \
           echo '{success}'; \
         else \
           echo '{{\"status\": \"error\", \"error_message\": \"model refused\"}}'; \
         fi",
        marker = marker.display(),
        success = success,
    );
    AgentConfig {
        command: "sh".into(),
        args: vec!["-c".into(), script],
        timeout_secs: 30,
        env: BTreeMap::new(),
    }
}

fn analyzer(p: &Project, max_file_lines: usize) -> QualityAnalyzer {
    let mut agents = BTreeMap::new();
    agents.insert(
        "docstring_enricher".to_string(),
        flaky_agent(p, r#"{"status": "success", "proposed_docstring": "// Documented."}"#),
    );
    agents.insert(
        "file_splitter".to_string(),
        flaky_agent(p, r#"{"status": "success_plan_generated", "files": []}"#),
    );
    QualityAnalyzer::new(
        Arc::new(AgentRegistry::from_config(&agents)),
        Arc::clone(&p.inventory),
        &p.target,
        &p.workspace,
        QualityConfig {
            max_file_lines,
            ..Default::default()
        },
    )
}

fn report_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn docstring_errors_can_be_retried_from_the_report() {
    let p = project();
    let first = analyzer(&p, 500)
        .analyze(QualityTask::Docstrings, None)
        .await
        .unwrap();

    assert_eq!(first.report.entries.len(), 3);
    assert_eq!(first.proposals(), 2);
    assert!(!first.success());
    let broken = first
        .report
        .entries
        .iter()
        .find(|e| e.item == "main.Broken")
        .unwrap();
    assert!(broken.is_error());
    assert_eq!(broken.agent_response["error_message"], "model refused");

    let on_disk = QualityReport::load(&first.report_path).unwrap();
    assert_eq!(on_disk.task, QualityTask::Docstrings);
    assert_eq!(on_disk.error_count(), 1);

    fs::write(p.root.join("fixed.marker"), "").unwrap();
    let retried = analyzer(&p, 500)
        .retry_errors(&first.report_path)
        .await
        .unwrap();
    assert_eq!(retried.analyzed, 1);
    assert!(retried.success());
    assert_eq!(retried.proposals(), 3);
    assert_eq!(
        retried.report.retried_from.as_deref(),
        Some(first.report_path.as_path())
    );

    let reports = report_files(&p.workspace.join(QUALITY_REPORTS_DIR));
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|n| n.starts_with("docstring_proposals_")));
    assert!(reports.iter().any(|n| n.contains("retried_")));
}

#[tokio::test]
async fn file_split_reports_only_long_files() {
    let p = project();
    let run = analyzer(&p, 20)
        .analyze(QualityTask::FileSplit, None)
        .await
        .unwrap();

    assert!(run.success());
    assert_eq!(run.report.entries.len(), 1);
    let entry = &run.report.entries[0];
    assert_eq!(entry.item, "store.go");
    assert_eq!(entry.line_count, Some(31));
    assert_eq!(entry.status(), Some("success_plan_generated"));
    assert_eq!(run.proposals(), 1);
}

#[tokio::test]
async fn retry_without_errors_changes_nothing() {
    let p = project();
    let first = analyzer(&p, 500)
        .analyze(QualityTask::Docstrings, Some("main.Start"))
        .await
        .unwrap();
    assert!(first.success());

    let retried = analyzer(&p, 500)
        .retry_errors(&first.report_path)
        .await
        .unwrap();
    assert_eq!(retried.analyzed, 0);
    assert_eq!(retried.report.entries, first.report.entries);
}
