// quality.rs — Code-quality analyses over the fragment inventory.
//
// An analysis walks the inventory, hands one item at a time to a registered
// agent and records each answer in a JSON report under
// `<workspace_root>/quality_proposals/`. Nothing is written to the project;
// reports are proposals for review. Entries whose answer has status "error"
// can be analysed again from an earlier report, which produces a new report
// and leaves the old one untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use weave_changeset::report::REPORT_TIMESTAMP_FORMAT;
use weave_index::{read_fragment_source, FragmentInfo, FragmentKind, Inventory};
use weave_workspace::resolve_within;

use crate::agent::{Agent, AgentRegistry};
use crate::config::QualityConfig;
use crate::context::to_value;
use crate::error::EngineError;

/// Directory under the workspace root that holds quality reports.
pub const QUALITY_REPORTS_DIR: &str = "quality_proposals";

/// Lines of headroom below `max_file_lines` asked of a split proposal.
const SPLIT_TARGET_MARGIN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTask {
    /// Propose docstrings for functions, methods, types and components.
    Docstrings,
    /// Propose how to split files longer than `max_file_lines`.
    FileSplit,
}

impl QualityTask {
    fn report_prefix(self) -> &'static str {
        match self {
            QualityTask::Docstrings => "docstring_proposals_",
            QualityTask::FileSplit => "filesplit_plans_",
        }
    }

    fn agent_name(self, config: &QualityConfig) -> &str {
        match self {
            QualityTask::Docstrings => &config.docstring_agent,
            QualityTask::FileSplit => &config.filesplit_agent,
        }
    }
}

impl fmt::Display for QualityTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityTask::Docstrings => write!(f, "docstrings"),
            QualityTask::FileSplit => write!(f, "filesplit"),
        }
    }
}

impl FromStr for QualityTask {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "docstrings" | "docstring" => Ok(QualityTask::Docstrings),
            "filesplit" => Ok(QualityTask::FileSplit),
            _ => Err(EngineError::UnknownQualityTask(s.to_string())),
        }
    }
}

// ── Report ──────────────────────────────────────────────────────

/// One analysed item and the agent's answer for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEntry {
    /// Fragment id for docstrings, relative file path for file splits.
    pub item: String,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub is_templ_source: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
    /// The agent's response object as returned, or a local error object.
    pub agent_response: Value,
}

impl QualityEntry {
    pub fn status(&self) -> Option<&str> {
        self.agent_response.get("status").and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.status() == Some("error")
    }

    /// The agent proposed a change (as opposed to "nothing to do").
    pub fn is_proposal(&self) -> bool {
        matches!(self.status(), Some("success" | "success_plan_generated"))
    }

    fn failed(item: &QualityItem<'_>, message: impl Into<String>) -> Self {
        let mut entry = item.entry(Value::Null);
        entry.agent_response = json!({ "status": "error", "error_message": message.into() });
        entry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub task: QualityTask,
    pub generated_at: String,
    /// Report whose error entries this one re-ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retried_from: Option<PathBuf>,
    #[serde(default)]
    pub entries: Vec<QualityEntry>,
}

impl QualityReport {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.is_file() {
            return Err(EngineError::QualityReportMissing {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| EngineError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::InvalidQualityReport {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| EngineError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| EngineError::IoError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }
}

/// Result of one analysis or retry run.
#[derive(Debug, Clone)]
pub struct QualityRun {
    pub task: QualityTask,
    pub report_path: PathBuf,
    pub report: QualityReport,
    /// Entries handed to the agent in this run.
    pub analyzed: usize,
}

impl QualityRun {
    /// True when no entry of the written report is an error.
    pub fn success(&self) -> bool {
        self.report.error_count() == 0
    }

    pub fn proposals(&self) -> usize {
        self.report.entries.iter().filter(|e| e.is_proposal()).count()
    }
}

// ── Agent contexts ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DocstringContext<'a> {
    fragment_id: &'a str,
    original_path: Option<&'a str>,
    is_templ_source: bool,
    code_block: String,
    current_docstring: Option<&'a str>,
    fragment_type: Option<&'a str>,
    identifier: Option<&'a str>,
    package_name: Option<&'a str>,
    signature: Option<&'a str>,
    definition: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct FileSplitContext<'a> {
    original_file_path: &'a str,
    original_file_content: &'a str,
    package_name: String,
    is_templ_source: bool,
    max_lines_per_file_target: usize,
}

// ── Items ───────────────────────────────────────────────────────

enum QualityItem<'a> {
    Fragment {
        id: &'a str,
        info: &'a FragmentInfo,
    },
    File {
        path: String,
        is_templ_source: bool,
        package_name: Option<String>,
    },
}

impl QualityItem<'_> {
    fn entry(&self, agent_response: Value) -> QualityEntry {
        match self {
            QualityItem::Fragment { id, info } => QualityEntry {
                item: id.to_string(),
                source_path: info.source_path().map(str::to_string),
                is_templ_source: info.is_templ_source,
                line_count: None,
                agent_response,
            },
            QualityItem::File {
                path,
                is_templ_source,
                ..
            } => QualityEntry {
                item: path.clone(),
                source_path: Some(path.clone()),
                is_templ_source: *is_templ_source,
                line_count: None,
                agent_response,
            },
        }
    }
}

fn wants_docstring(info: &FragmentInfo) -> bool {
    matches!(
        info.kind(),
        FragmentKind::Function | FragmentKind::Method | FragmentKind::Type
    ) || info
        .fragment_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("component"))
}

/// `package <name>` from the first package clause in `text`.
fn package_clause(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim_start)
        .find_map(|line| line.strip_prefix("package "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
}

// ── Analyzer ────────────────────────────────────────────────────

pub struct QualityAnalyzer {
    registry: Arc<AgentRegistry>,
    inventory: Arc<Inventory>,
    target_root: PathBuf,
    reports_dir: PathBuf,
    config: QualityConfig,
}

impl QualityAnalyzer {
    pub fn new(
        registry: Arc<AgentRegistry>,
        inventory: Arc<Inventory>,
        target_root: impl Into<PathBuf>,
        workspace_root: &Path,
        config: QualityConfig,
    ) -> Self {
        Self {
            registry,
            inventory,
            target_root: target_root.into(),
            reports_dir: workspace_root.join(QUALITY_REPORTS_DIR),
            config,
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Run `task` over the inventory and write a new report.
    ///
    /// `only` narrows the run to one fragment id (docstrings) or one
    /// relative file path (file split).
    pub async fn analyze(
        &self,
        task: QualityTask,
        only: Option<&str>,
    ) -> Result<QualityRun, EngineError> {
        let agent = self.registry.resolve(task.agent_name(&self.config))?;
        let items = match task {
            QualityTask::Docstrings => self.docstring_items(only),
            QualityTask::FileSplit => self.file_items(only),
        };
        tracing::info!(task = %task, candidates = items.len(), "quality analysis started");
        if let Some(only) = only {
            if items.is_empty() {
                tracing::warn!(task = %task, item = %only, "requested item is not in the inventory or not eligible");
            }
        }

        let mut entries = Vec::new();
        for item in &items {
            if let Some(entry) = self.analyze_item(agent.as_ref(), item, false).await {
                entries.push(entry);
            }
        }
        let analyzed = entries.len();
        self.write(task, entries, None, analyzed)
    }

    /// Analyse again every error entry of the report at `report_path`.
    ///
    /// Entries that succeeded are carried over unchanged. File-split items
    /// are re-run regardless of their current length.
    pub async fn retry_errors(&self, report_path: &Path) -> Result<QualityRun, EngineError> {
        let report = QualityReport::load(report_path)?;
        let task = report.task;
        let agent = self.registry.resolve(task.agent_name(&self.config))?;
        tracing::info!(
            task = %task,
            report = %report_path.display(),
            errors = report.error_count(),
            "retrying errored quality entries"
        );

        let mut analyzed = 0;
        let mut entries = Vec::with_capacity(report.entries.len());
        for entry in report.entries {
            if !entry.is_error() {
                entries.push(entry);
                continue;
            }
            let Some(item) = self.item_for(task, &entry) else {
                tracing::warn!(item = %entry.item, "errored entry no longer in the inventory, kept as is");
                entries.push(entry);
                continue;
            };
            analyzed += 1;
            match self.analyze_item(agent.as_ref(), &item, true).await {
                Some(fresh) => entries.push(fresh),
                None => entries.push(entry),
            }
        }

        self.write(task, entries, Some(report_path), analyzed)
    }

    fn docstring_items(&self, only: Option<&str>) -> Vec<QualityItem<'_>> {
        self.inventory
            .fragments
            .iter()
            .filter(|(id, _)| only.map_or(true, |only| only == id.as_str()))
            .filter(|(id, info)| {
                let wanted = wants_docstring(info);
                if !wanted {
                    tracing::debug!(fragment_id = %id, "fragment kind takes no docstring, skipped");
                }
                wanted
            })
            .map(|(id, info)| QualityItem::Fragment { id, info })
            .collect()
    }

    /// One item per distinct source file; metadata comes from the first
    /// fragment (in id order) that lives in it.
    fn file_items(&self, only: Option<&str>) -> Vec<QualityItem<'_>> {
        let mut files: BTreeMap<&str, &FragmentInfo> = BTreeMap::new();
        for info in self.inventory.fragments.values() {
            if let Some(path) = info.source_path() {
                files.entry(path).or_insert(info);
            }
        }
        files
            .into_iter()
            .filter(|(path, _)| only.map_or(true, |only| only == *path))
            .map(|(path, info)| QualityItem::File {
                path: path.to_string(),
                is_templ_source: info.is_templ_source,
                package_name: info.package_name.clone().filter(|p| !p.is_empty()),
            })
            .collect()
    }

    fn item_for<'a>(&'a self, task: QualityTask, entry: &QualityEntry) -> Option<QualityItem<'a>> {
        match task {
            QualityTask::Docstrings => self
                .inventory
                .fragments
                .get_key_value(&entry.item)
                .map(|(id, info)| QualityItem::Fragment { id, info }),
            QualityTask::FileSplit => {
                let known = self.file_items(Some(entry.item.as_str())).into_iter().next();
                Some(known.unwrap_or_else(|| QualityItem::File {
                    path: entry.item.clone(),
                    is_templ_source: entry.is_templ_source,
                    package_name: None,
                }))
            }
        }
    }

    /// `None` when a file is short enough to need no split proposal.
    async fn analyze_item(
        &self,
        agent: &dyn Agent,
        item: &QualityItem<'_>,
        force: bool,
    ) -> Option<QualityEntry> {
        let context = match item {
            QualityItem::Fragment { id, info } => {
                let code = match read_fragment_source(&self.target_root, id, info) {
                    Ok(code) => code,
                    Err(e) => {
                        tracing::warn!(fragment_id = %id, error = %e, "cannot read fragment source");
                        return Some(QualityEntry::failed(item, format!("cannot read source: {}", e)));
                    }
                };
                to_value(&DocstringContext {
                    fragment_id: id,
                    original_path: info.source_path(),
                    is_templ_source: info.is_templ_source,
                    code_block: code,
                    current_docstring: info.docstring.as_deref(),
                    fragment_type: info.fragment_type.as_deref(),
                    identifier: info.identifier.as_deref(),
                    package_name: info.package_name.as_deref(),
                    signature: info.signature.as_deref(),
                    definition: info.definition.as_deref(),
                })
            }
            QualityItem::File {
                path,
                is_templ_source,
                package_name,
            } => {
                let text = match resolve_within(&self.target_root, path)
                    .map_err(EngineError::from)
                    .and_then(|abs| {
                        fs::read_to_string(&abs)
                            .map_err(|source| EngineError::IoError { path: abs, source })
                    }) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "cannot read source file");
                        return Some(QualityEntry::failed(item, format!("cannot read source: {}", e)));
                    }
                };
                let line_count = text.lines().count();
                if line_count <= self.config.max_file_lines && !force {
                    tracing::debug!(path = %path, lines = line_count, "file within line limit, skipped");
                    return None;
                }
                let package_name = package_name
                    .clone()
                    .or_else(|| {
                        if *is_templ_source {
                            Path::new(path)
                                .parent()
                                .and_then(Path::file_name)
                                .map(|n| n.to_string_lossy().to_string())
                        } else {
                            package_clause(&text)
                        }
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                tracing::info!(path = %path, lines = line_count, "analysing long file");
                let context = to_value(&FileSplitContext {
                    original_file_path: path,
                    original_file_content: &text,
                    package_name,
                    is_templ_source: *is_templ_source,
                    max_lines_per_file_target: self
                        .config
                        .max_file_lines
                        .saturating_sub(SPLIT_TARGET_MARGIN)
                        .max(1),
                });
                return Some(self.ask(agent, item, context, Some(line_count)).await);
            }
        };
        Some(self.ask(agent, item, context, None).await)
    }

    async fn ask(
        &self,
        agent: &dyn Agent,
        item: &QualityItem<'_>,
        context: Result<Value, EngineError>,
        line_count: Option<usize>,
    ) -> QualityEntry {
        let response = match context {
            Ok(context) => agent.run(&context).await,
            Err(e) => Err(e),
        };
        let mut entry = match response {
            Ok(value @ Value::Object(_)) if value.get("status").is_some_and(Value::is_string) => {
                item.entry(value)
            }
            Ok(_) => QualityEntry::failed(item, "agent response is not an object with a 'status'"),
            Err(e) => {
                tracing::warn!(agent = agent.name(), error = %e, "quality agent call failed");
                QualityEntry::failed(item, e.to_string())
            }
        };
        entry.line_count = line_count;
        entry
    }

    fn write(
        &self,
        task: QualityTask,
        entries: Vec<QualityEntry>,
        retried_from: Option<&Path>,
        analyzed: usize,
    ) -> Result<QualityRun, EngineError> {
        let timestamp = chrono::Local::now()
            .format(REPORT_TIMESTAMP_FORMAT)
            .to_string();
        let stem = match retried_from {
            Some(_) => format!("{}retried_{}", task.report_prefix(), timestamp),
            None => format!("{}{}", task.report_prefix(), timestamp),
        };
        let report_path = unused_path(&self.reports_dir, &stem);
        let report = QualityReport {
            task,
            generated_at: timestamp,
            retried_from: retried_from.map(Path::to_path_buf),
            entries,
        };
        report.save(&report_path)?;

        let run = QualityRun {
            task,
            report_path,
            report,
            analyzed,
        };
        tracing::info!(
            task = %task,
            analyzed,
            proposals = run.proposals(),
            errors = run.report.error_count(),
            report = %run.report_path.display(),
            "quality report written"
        );
        Ok(run)
    }
}

/// `<dir>/<stem>.json`, or `<stem>_<n>.json` when that name is taken.
fn unused_path(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{}.json", stem));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{}_{}.json", stem, n)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}
