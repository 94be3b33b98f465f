// retry_loop.rs — The build/retry loop around plan execution.
//
// One attempt runs every plan step in order, then the build command. A
// failing step ends the attempt early; a failing build feeds its output to
// the next attempt. The loop stops on the first green build or after
// `max_attempts` attempts, whichever comes first.
//
// Lifecycle:
//   RunningSteps(n) → Building(n) → Success
//                  ↘            ↘ Retry(n) → RunningSteps(n+1)
//                   Retry(n) / Exhausted  ↘ Exhausted

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::command::run_shell_command;
use crate::config::BuildConfig;
use crate::error::EngineError;
use crate::executor::StepExecutor;
use crate::plan::WorkflowPlan;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    RunningSteps { attempt: u32 },
    Building { attempt: u32 },
    /// The attempt failed and another one is allowed.
    Retry { attempt: u32 },
    Success,
    Exhausted,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::RunningSteps { attempt } => write!(f, "running_steps({})", attempt),
            LoopState::Building { attempt } => write!(f, "building({})", attempt),
            LoopState::Retry { attempt } => write!(f, "retry({})", attempt),
            LoopState::Success => write!(f, "success"),
            LoopState::Exhausted => write!(f, "exhausted"),
        }
    }
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Success | LoopState::Exhausted)
    }

    /// Check whether a transition to `next` is valid.
    pub fn can_transition_to(&self, next: &LoopState) -> bool {
        match (self, next) {
            (LoopState::RunningSteps { attempt: a }, LoopState::Building { attempt: b })
            | (LoopState::RunningSteps { attempt: a }, LoopState::Retry { attempt: b })
            | (LoopState::Building { attempt: a }, LoopState::Retry { attempt: b }) => a == b,
            (LoopState::Retry { attempt: a }, LoopState::RunningSteps { attempt: b }) => *b == a + 1,
            (LoopState::RunningSteps { .. }, LoopState::Exhausted)
            | (LoopState::Building { .. }, LoopState::Exhausted)
            | (LoopState::Building { .. }, LoopState::Success) => true,
            _ => false,
        }
    }

    fn transition(&mut self, next: LoopState) -> Result<(), EngineError> {
        if !self.can_transition_to(&next) {
            return Err(EngineError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self, to = %next, "loop transition");
        *self = next;
        Ok(())
    }
}

/// Result of a whole loop run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub success: bool,
    /// The most recent step or build failure; cleared by a green build.
    pub last_error: Option<String>,
    /// Union of every path any step reported, across all attempts.
    pub touched: BTreeSet<String>,
    pub attempts: u32,
    pub state: LoopState,
}

pub struct BuildLoop {
    executor: StepExecutor,
    build_command: String,
    max_attempts: u32,
    command_timeout: Duration,
}

impl BuildLoop {
    pub fn new(executor: StepExecutor, build: &BuildConfig) -> Self {
        Self {
            executor,
            build_command: build.build_command.clone(),
            max_attempts: build.max_attempts.max(1),
            command_timeout: build.command_timeout(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the plan until the build passes or attempts run out.
    ///
    /// Exhaustion is an ordinary `success = false` outcome. `Err` is only
    /// returned for an impossible state change.
    pub async fn run(&self, plan: &WorkflowPlan) -> Result<LoopOutcome, EngineError> {
        if plan.is_empty() {
            tracing::info!("plan has no steps, nothing to execute");
            return Ok(LoopOutcome {
                success: true,
                last_error: None,
                touched: BTreeSet::new(),
                attempts: 0,
                state: LoopState::Success,
            });
        }

        let mut state = LoopState::RunningSteps { attempt: 1 };
        let mut touched = BTreeSet::new();
        let mut previous_error: Option<String> = None;
        let mut last_error: Option<String> = None;
        let mut attempts = 0;

        while let LoopState::RunningSteps { attempt } = state {
            attempts = attempt;
            tracing::info!(attempt, max_attempts = self.max_attempts, steps = plan.steps.len(), "starting attempt");

            let mut step_failure = None;
            for step in &plan.steps {
                let outcome = self
                    .executor
                    .execute_step(step, previous_error.as_deref())
                    .await;
                touched.extend(outcome.touched);
                if !outcome.success {
                    let message = outcome
                        .error
                        .unwrap_or_else(|| format!("step {} failed", step.id()));
                    tracing::warn!(attempt, step = step.id(), "step failed, ending attempt");
                    step_failure = Some(format!("step {} failed: {}", step.id(), message));
                    break;
                }
            }

            if let Some(message) = step_failure {
                if previous_error.is_none() {
                    previous_error = Some(message.clone());
                }
                last_error = Some(message);
                if attempt < self.max_attempts {
                    state.transition(LoopState::Retry { attempt })?;
                    state.transition(LoopState::RunningSteps { attempt: attempt + 1 })?;
                } else {
                    state.transition(LoopState::Exhausted)?;
                }
                continue;
            }

            state.transition(LoopState::Building { attempt })?;
            tracing::info!(attempt, command = %self.build_command, "running build");
            let build = run_shell_command(
                &self.build_command,
                self.executor.workspace_dir(),
                self.command_timeout,
            )
            .await;

            if build.success {
                tracing::info!(attempt, "build succeeded");
                last_error = None;
                state.transition(LoopState::Success)?;
                continue;
            }

            tracing::warn!(attempt, output = %build.output, "build failed");
            previous_error = Some(build.output.clone());
            last_error = Some(build.output);
            if attempt < self.max_attempts {
                state.transition(LoopState::Retry { attempt })?;
                state.transition(LoopState::RunningSteps { attempt: attempt + 1 })?;
            } else {
                state.transition(LoopState::Exhausted)?;
            }
        }

        let success = state == LoopState::Success;
        if !success {
            tracing::error!(attempts, "build loop exhausted");
        }
        Ok(LoopOutcome {
            success,
            last_error,
            touched,
            attempts,
            state,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;
    use crate::executor::tests::{write_file, Scripted};
    use crate::plan::PlanStep;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use weave_index::Inventory;

    fn build_config(command: &str, max_attempts: u32) -> BuildConfig {
        BuildConfig {
            build_command: command.to_string(),
            max_attempts,
            command_timeout_secs: 30,
            formatters: Vec::new(),
            ..BuildConfig::default()
        }
    }

    fn build_loop(dir: &TempDir, agents: Vec<Arc<Scripted>>, build: &BuildConfig) -> BuildLoop {
        let mut registry = AgentRegistry::new();
        for agent in agents {
            registry.register_instance(agent);
        }
        let exec = StepExecutor::new(
            Arc::new(registry),
            Arc::new(Inventory::default()),
            dir.path(),
            build,
        );
        BuildLoop::new(exec, build)
    }

    fn step(id: &str, agent: &str) -> PlanStep {
        PlanStep {
            step_id: Some(id.into()),
            agent: Some(agent.into()),
            instructions: format!("step {}", id),
            ..Default::default()
        }
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        let running = LoopState::RunningSteps { attempt: 1 };
        assert!(running.can_transition_to(&LoopState::Building { attempt: 1 }));
        assert!(running.can_transition_to(&LoopState::Retry { attempt: 1 }));
        assert!(!running.can_transition_to(&LoopState::Success));
        assert!(LoopState::Retry { attempt: 1 }.can_transition_to(&LoopState::RunningSteps { attempt: 2 }));
        assert!(!LoopState::Retry { attempt: 1 }.can_transition_to(&LoopState::RunningSteps { attempt: 3 }));
        assert!(!LoopState::Success.can_transition_to(&LoopState::RunningSteps { attempt: 1 }));
        assert!(!LoopState::Exhausted.can_transition_to(&LoopState::Retry { attempt: 1 }));

        let mut state = LoopState::Success;
        let err = state.transition(LoopState::Building { attempt: 1 }).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn empty_plan_is_an_immediate_success() {
        let dir = TempDir::new().unwrap();
        let lp = build_loop(&dir, vec![], &build_config("false", 3));
        let outcome = lp.run(&WorkflowPlan::default()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.touched.is_empty());
    }

    #[tokio::test]
    async fn failing_step_stops_the_attempt_and_feeds_the_next_one() {
        let dir = TempDir::new().unwrap();
        let writer = Scripted::new(
            "writer",
            vec![Ok(json!({"status": "success", "modified_fragments": [write_file("x.go", "package x\n")]}))],
        );
        let breaker = Scripted::new("breaker", vec![Ok(json!({"status": "error", "message": "cannot do it"}))]);
        let after = Scripted::new("after", vec![]);
        let lp = build_loop(
            &dir,
            vec![Arc::clone(&writer), Arc::clone(&breaker), Arc::clone(&after)],
            &build_config("true", 2),
        );
        let plan = WorkflowPlan::new(vec![step("1", "writer"), step("2", "breaker"), step("3", "after")]);

        let outcome = lp.run(&plan).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.state, LoopState::Exhausted);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.touched.contains("x.go"));
        assert!(outcome.last_error.unwrap().contains("cannot do it"));
        assert!(after.contexts.lock().unwrap().is_empty());

        let contexts = writer.contexts.lock().unwrap();
        assert_eq!(contexts.len(), 2);
        assert!(contexts[0]["previous_build_error"].is_null());
        assert!(contexts[1]["previous_build_error"]
            .as_str()
            .unwrap()
            .contains("cannot do it"));
    }

    #[tokio::test]
    async fn failing_build_never_exceeds_max_attempts() {
        let dir = TempDir::new().unwrap();
        let agent = Scripted::new("editor", vec![Ok(json!({"status": "success"}))]);
        let lp = build_loop(
            &dir,
            vec![Arc::clone(&agent)],
            &build_config("echo 'undefined: run' >&2; exit 2", 3),
        );
        let outcome = lp.run(&WorkflowPlan::new(vec![step("1", "editor")])).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(agent.contexts.lock().unwrap().len(), 3);
        assert_eq!(
            outcome.last_error.as_deref(),
            Some("Exit code: 2\nSTDERR:\nundefined: run")
        );
        let contexts = agent.contexts.lock().unwrap();
        assert_eq!(contexts[2]["previous_build_error"], "Exit code: 2\nSTDERR:\nundefined: run");
    }

    #[tokio::test]
    async fn build_can_pass_on_a_later_attempt() {
        let dir = TempDir::new().unwrap();
        let agent = Scripted::new(
            "editor",
            vec![
                Ok(json!({"status": "success", "modified_fragments": [write_file("a.go", "package a\n")]})),
                Ok(json!({"status": "success", "modified_fragments": [write_file("fixed.marker", "ok\n")]})),
            ],
        );
        let lp = build_loop(&dir, vec![agent], &build_config("test -f fixed.marker", 5));
        let outcome = lp.run(&WorkflowPlan::new(vec![step("1", "editor")])).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.state, LoopState::Success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.last_error, None);
        assert_eq!(
            outcome.touched.iter().cloned().collect::<Vec<_>>(),
            vec!["a.go", "fixed.marker"]
        );
        assert!(fs::read_to_string(dir.path().join("a.go")).is_ok());
    }

    #[tokio::test]
    async fn zero_max_attempts_still_runs_once() {
        let dir = TempDir::new().unwrap();
        let agent = Scripted::new("editor", vec![Ok(json!({"status": "success"}))]);
        let lp = build_loop(&dir, vec![agent], &build_config("true", 0));
        assert_eq!(lp.max_attempts(), 1);
        let outcome = lp.run(&WorkflowPlan::new(vec![step("1", "editor")])).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
    }
}
