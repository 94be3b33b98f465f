// command.rs — Agents that run as external processes.
//
// The context object is written to the process's stdin as JSON; the process
// answers with one JSON document on stdout. Anything on stderr is kept for
// the error message. The whole exchange is bounded by the configured timeout
// and the process is killed when it overruns.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct CommandAgent {
    name: String,
    config: AgentConfig,
}

impl CommandAgent {
    pub fn new(name: impl Into<String>, config: AgentConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    fn failed(&self, message: impl Into<String>) -> EngineError {
        EngineError::AgentFailed {
            agent: self.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, context: &Value) -> Result<Value, EngineError> {
        let input = serde_json::to_vec(context)?;
        tracing::debug!(agent = %self.name, command = %self.config.command, bytes = input.len(), "starting agent process");

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failed(format!("cannot start '{}': {}", self.config.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let agent = self.name.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::warn!(agent = %agent, error = %e, "agent closed stdin early");
                }
            });
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| EngineError::AgentTimeout {
                agent: self.name.clone(),
                secs: self.config.timeout_secs,
            })?
            .map_err(|e| self.failed(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            tracing::debug!(agent = %self.name, stderr = %stderr, "agent stderr");
        }
        if !output.status.success() {
            return Err(self.failed(format!(
                "exited with {:?}: {}",
                output.status.code(),
                stderr
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| EngineError::InvalidResponse {
            agent: self.name.clone(),
            reason: format!("stdout is not JSON: {}", e),
        })
    }
}
