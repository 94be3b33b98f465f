// executor.rs — Running one plan step against the workspace copy.
//
// A step resolves its agent, hands it a context, and writes the files the
// agent proposes into the workspace. The outcome is always a value: every
// failure mode (unknown agent, unreadable fragment, agent error, bad
// response, failed write, failed regeneration) comes back as
// `success = false` with a message for the next attempt.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use weave_index::Inventory;
use weave_workspace::{normalize_relative, resolve_within};

use crate::agent::{AgentRegistry, AgentResponse, FileMutation, MutationEntry};
use crate::command::{run_shell_command, SourceFormatter};
use crate::config::BuildConfig;
use crate::context::{assemble_expert_context, targeted_paths, to_value};
use crate::error::EngineError;
use crate::plan::PlanStep;

/// What one step did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub success: bool,
    /// Paths written on success; on an agent-side failure, the paths the
    /// step targeted.
    pub touched: BTreeSet<String>,
    pub error: Option<String>,
}

impl StepOutcome {
    fn ok(touched: BTreeSet<String>) -> Self {
        Self {
            success: true,
            touched,
            error: None,
        }
    }

    fn failed(touched: BTreeSet<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            touched,
            error: Some(error.into()),
        }
    }
}

/// Executes plan steps for one workspace copy.
#[derive(Debug, Clone)]
pub struct StepExecutor {
    registry: Arc<AgentRegistry>,
    inventory: Arc<Inventory>,
    workspace_dir: PathBuf,
    regenerate_command: String,
    command_timeout: Duration,
    formatter: SourceFormatter,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        inventory: Arc<Inventory>,
        workspace_dir: impl Into<PathBuf>,
        build: &BuildConfig,
    ) -> Self {
        Self {
            registry,
            inventory,
            workspace_dir: workspace_dir.into(),
            regenerate_command: build.regenerate_command.clone(),
            command_timeout: build.command_timeout(),
            formatter: SourceFormatter::new(build.formatters.clone(), build.format_timeout()),
        }
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub async fn execute_step(&self, step: &PlanStep, previous_error: Option<&str>) -> StepOutcome {
        let Some(agent_name) = step.agent_name() else {
            let e = EngineError::MissingAgentName {
                step_id: step.id().to_string(),
            };
            tracing::error!(error = %e, "cannot run step");
            return StepOutcome::failed(BTreeSet::new(), e.to_string());
        };
        tracing::info!(step = step.id(), agent = %agent_name, "executing step");

        let agent = match self.registry.resolve(agent_name) {
            Ok(agent) => agent,
            Err(e) => {
                tracing::error!(step = step.id(), error = %e, "cannot resolve agent");
                return StepOutcome::failed(BTreeSet::new(), e.to_string());
            }
        };

        let targeted = targeted_paths(step, &self.inventory);
        let context = match assemble_expert_context(
            step,
            &self.inventory,
            &self.workspace_dir,
            previous_error,
        )
        .and_then(|ctx| to_value(&ctx))
        {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(step = step.id(), error = %e, "context assembly failed");
                return StepOutcome::failed(targeted, e.to_string());
            }
        };

        let response = match agent
            .run(&context)
            .await
            .and_then(|raw| AgentResponse::from_value(agent_name, raw))
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(step = step.id(), error = %e, "agent call failed");
                return StepOutcome::failed(targeted, e.to_string());
            }
        };

        if !response.is_success() {
            let message = response.message.clone().unwrap_or_else(|| {
                format!("agent '{}' reported status '{}'", agent_name, response.status)
            });
            tracing::error!(step = step.id(), agent = %agent_name, message = %message, "agent reported failure");
            return StepOutcome::failed(targeted, message);
        }

        let entries = match response.mutations(agent_name) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(step = step.id(), error = %e, "unusable mutation list");
                return StepOutcome::failed(targeted, e.to_string());
            }
        };
        if entries.is_empty() {
            tracing::info!(step = step.id(), agent = %agent_name, "agent succeeded without changes");
            return StepOutcome::ok(BTreeSet::new());
        }

        self.apply_mutations(step, entries).await
    }

    async fn apply_mutations(&self, step: &PlanStep, entries: Vec<MutationEntry>) -> StepOutcome {
        tracing::info!(step = step.id(), count = entries.len(), "applying proposed changes");
        let mut written = BTreeSet::new();
        let mut templ_touched = false;

        for entry in entries {
            let mutation = match entry {
                MutationEntry::Valid(m) => m,
                MutationEntry::Invalid(reason) => {
                    tracing::warn!(step = step.id(), reason = %reason, "skipping invalid change entry");
                    continue;
                }
            };
            let target = match resolve_within(&self.workspace_dir, &mutation.path) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!(step = step.id(), error = %e, "skipping change outside the workspace");
                    continue;
                }
            };
            if let Err(e) = self.write_mutation(&mutation, &target).await {
                tracing::error!(step = step.id(), path = %target.display(), error = %e, "write failed");
                return StepOutcome::failed(
                    written,
                    format!("cannot write {}: {}", mutation.path, e),
                );
            }
            written.insert(normalize_relative(&mutation.path));
            templ_touched |= mutation.is_templ_source;
        }

        if templ_touched {
            tracing::info!(command = %self.regenerate_command, "templated sources changed, regenerating");
            let regen = run_shell_command(
                &self.regenerate_command,
                &self.workspace_dir,
                self.command_timeout,
            )
            .await;
            if !regen.success {
                tracing::error!(output = %regen.output, "regeneration failed");
                return StepOutcome::failed(
                    written,
                    format!("'{}' failed:\n{}", self.regenerate_command, regen.output),
                );
            }
        }

        tracing::info!(step = step.id(), files = written.len(), "step applied");
        StepOutcome::ok(written)
    }

    async fn write_mutation(&self, mutation: &FileMutation, target: &Path) -> std::io::Result<()> {
        let content = if mutation.is_templ_source {
            mutation.content.clone()
        } else {
            self.formatter.format(&mutation.path, &mutation.content).await
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, content)
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::agent::Agent;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use weave_index::FragmentInfo;

    /// Replays canned responses, one per call, and records each context.
    pub(crate) struct Scripted {
        pub name: String,
        pub responses: Mutex<Vec<Result<Value, String>>>,
        pub contexts: Mutex<Vec<Value>>,
    }

    impl Scripted {
        pub(crate) fn new(name: &str, responses: Vec<Result<Value, String>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                responses: Mutex::new(responses),
                contexts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Agent for Scripted {
        fn name(&self) -> &str {
            &self.name
        }
        async fn run(&self, context: &Value) -> Result<Value, EngineError> {
            self.contexts.lock().unwrap().push(context.clone());
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Ok(json!({"status": "success"})))
            };
            next.map_err(|message| EngineError::AgentFailed {
                agent: self.name.clone(),
                message,
            })
        }
    }

    pub(crate) fn write_file(path: &str, content: &str) -> Value {
        json!({"path_to_modify": path, "new_content": content, "is_templ_source": false})
    }

    fn build_config(regenerate: &str) -> BuildConfig {
        BuildConfig {
            regenerate_command: regenerate.to_string(),
            command_timeout_secs: 30,
            formatters: Vec::new(),
            ..BuildConfig::default()
        }
    }

    fn setup(agent: Arc<Scripted>, regenerate: &str) -> (TempDir, StepExecutor) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
        let mut inv = Inventory::default();
        inv.fragments.insert(
            "main.main".into(),
            FragmentInfo {
                original_path: Some("main.go".into()),
                fragment_type: Some("function".into()),
                identifier: Some("main".into()),
                start_line: Some(3),
                end_line: Some(3),
                ..Default::default()
            },
        );
        let mut registry = AgentRegistry::new();
        registry.register_instance(agent);
        let exec = StepExecutor::new(
            Arc::new(registry),
            Arc::new(inv),
            dir.path(),
            &build_config(regenerate),
        );
        (dir, exec)
    }

    fn step(agent: &str) -> PlanStep {
        PlanStep {
            step_id: Some("1".into()),
            agent: Some(agent.into()),
            instructions: "edit main".into(),
            target_fragment_ids: vec!["main.main".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn successful_step_writes_files_and_reports_them() {
        let agent = Scripted::new(
            "editor",
            vec![Ok(json!({"status": "success", "modified_fragments": [
                write_file("main.go", "package main\n\nfunc main() { run() }\n"),
                write_file("internal/run/run.go", "package run\n"),
                {"path_to_modify": "bad.go", "new_content": null},
                write_file("../escape.go", "package escape\n"),
            ]}))],
        );
        let (dir, exec) = setup(Arc::clone(&agent), "true");

        let outcome = exec.execute_step(&step("editor"), Some("Exit code: 1")).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(
            outcome.touched.iter().cloned().collect::<Vec<_>>(),
            vec!["internal/run/run.go", "main.go"]
        );
        assert!(fs::read_to_string(dir.path().join("main.go")).unwrap().contains("run()"));
        assert!(dir.path().join("internal/run/run.go").is_file());
        assert!(!dir.path().join("bad.go").exists());
        assert!(!dir.path().parent().unwrap().join("escape.go").exists());

        let ctx = &agent.contexts.lock().unwrap()[0];
        assert_eq!(ctx["previous_build_error"], "Exit code: 1");
        assert_eq!(ctx["target_fragments_with_code"][0]["current_code_block"], "func main() {}\n");
    }

    #[tokio::test]
    async fn agent_reported_failure_returns_targeted_paths() {
        let agent = Scripted::new("editor", vec![Ok(json!({"status": "error", "message": "cannot"}))]);
        let (_dir, exec) = setup(agent, "true");
        let outcome = exec.execute_step(&step("editor"), None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("cannot"));
        assert!(outcome.touched.contains("main.go"));
    }

    #[tokio::test]
    async fn success_without_changes_is_a_no_op() {
        let agent = Scripted::new("editor", vec![Ok(json!({"status": "success", "modified_fragments": []}))]);
        let (_dir, exec) = setup(agent, "true");
        let outcome = exec.execute_step(&step("editor"), None).await;
        assert!(outcome.success);
        assert!(outcome.touched.is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_and_invalid_response_fail_the_step() {
        let agent = Scripted::new("editor", vec![Ok(json!(["not", "an", "object"]))]);
        let (_dir, exec) = setup(agent, "true");

        let unknown = exec.execute_step(&step("nobody"), None).await;
        assert!(!unknown.success);
        assert!(unknown.touched.is_empty());
        assert!(unknown.error.unwrap().contains("unknown agent"));

        let invalid = exec.execute_step(&step("editor"), None).await;
        assert!(!invalid.success);
        assert!(invalid.touched.contains("main.go"));
    }

    #[tokio::test]
    async fn missing_target_fragment_fails_before_the_agent_runs() {
        let agent = Scripted::new("editor", vec![]);
        let (_dir, exec) = setup(Arc::clone(&agent), "true");
        let mut bad = step("editor");
        bad.target_fragment_ids = vec!["ghost".into()];
        let outcome = exec.execute_step(&bad, None).await;
        assert!(!outcome.success);
        assert!(agent.contexts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn templ_changes_trigger_regeneration() {
        let page = json!({"path_to_modify": "views/page.templ", "new_content": "templ Page() {}\n", "is_templ_source": true});
        let agent = Scripted::new("editor", vec![Ok(json!({"status": "success", "modified_fragments": [page]}))]);
        let (dir, exec) = setup(agent, "touch regenerated.marker");
        let outcome = exec.execute_step(&step("editor"), None).await;
        assert!(outcome.success);
        assert!(dir.path().join("regenerated.marker").exists());
    }

    #[tokio::test]
    async fn failed_regeneration_fails_the_step_but_keeps_written_paths() {
        let page = json!({"path_to_modify": "views/page.templ", "new_content": "templ Page() {}\n", "is_templ_source": true});
        let agent = Scripted::new("editor", vec![Ok(json!({"status": "success", "modified_fragments": [page]}))]);
        let (_dir, exec) = setup(agent, "echo 'syntax error' >&2; exit 1");
        let outcome = exec.execute_step(&step("editor"), None).await;
        assert!(!outcome.success);
        assert!(outcome.touched.contains("views/page.templ"));
        assert!(outcome.error.unwrap().contains("syntax error"));
    }
}
