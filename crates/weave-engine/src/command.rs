// command.rs — Shell commands against the workspace, and source formatting.
//
// Build, verify and regenerate commands run through `sh -c` with the
// workspace as working directory. Their outcome is always a plain
// success flag plus text: a non-zero exit, a timeout or a spawn failure
// all come back as failures carrying a message that can be handed to the
// next agent attempt.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::FormatterConfig;

/// Outcome of a shell command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    /// Stdout on success; a diagnostic summary on failure.
    pub output: String,
}

impl CommandOutput {
    fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Run `command` with `sh -c` in `dir`, bounded by `timeout`.
pub async fn run_shell_command(command: &str, dir: &Path, timeout: Duration) -> CommandOutput {
    tracing::info!(dir = %dir.display(), command, "running command");
    if !dir.is_dir() {
        tracing::error!(dir = %dir.display(), "command directory not found");
        return CommandOutput::failed(format!("Directory not found: {}", dir.display()));
    }

    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Err(_) => {
            tracing::error!(command, secs = timeout.as_secs(), "command timed out");
            return CommandOutput::failed(format!(
                "Timeout ({}s) for '{}'.",
                timeout.as_secs(),
                command
            ));
        }
        Ok(Err(e)) => {
            tracing::error!(command, error = %e, "command could not be started");
            return CommandOutput::failed(format!("Error running '{}': {}", command, e));
        }
        Ok(Ok(output)) => output,
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    tracing::debug!(code = ?output.status.code(), stdout = %stdout, stderr = %stderr, "command output");

    if output.status.success() {
        tracing::info!(command, "command succeeded");
        let output = if stdout.is_empty() {
            "Succeeded with no stdout output.".to_string()
        } else {
            stdout
        };
        return CommandOutput {
            success: true,
            output,
        };
    }

    let code = output
        .status
        .code()
        .map_or_else(|| "terminated by signal".to_string(), |c| c.to_string());
    tracing::error!(command, code = %code, "command failed");
    let mut message = format!("Exit code: {}\n", code);
    if !stderr.is_empty() {
        message.push_str(&format!("STDERR:\n{}\n", stderr));
    } else if !stdout.is_empty() {
        message.push_str(&format!("STDOUT:\n{}", stdout));
    }
    CommandOutput::failed(message.trim_end().to_string())
}

// ── Formatting ──────────────────────────────────────────────────

/// Best-effort source formatting by file extension.
#[derive(Debug, Clone, Default)]
pub struct SourceFormatter {
    formatters: Vec<FormatterConfig>,
    timeout: Duration,
}

impl SourceFormatter {
    pub fn new(formatters: Vec<FormatterConfig>, timeout: Duration) -> Self {
        Self {
            formatters,
            timeout,
        }
    }

    fn formatter_for(&self, rel_path: &str) -> Option<&FormatterConfig> {
        self.formatters
            .iter()
            .find(|f| !f.extension.is_empty() && rel_path.ends_with(&f.extension))
    }

    /// Format `content` for `rel_path`. Any failure returns `content` as-is.
    pub async fn format(&self, rel_path: &str, content: &str) -> String {
        let Some(formatter) = self.formatter_for(rel_path) else {
            return content.to_string();
        };
        match self.run_formatter(formatter, content).await {
            Ok(formatted) => {
                tracing::debug!(file = %rel_path, formatter = %formatter.command, "formatted");
                formatted
            }
            Err(reason) => {
                tracing::warn!(
                    file = %rel_path,
                    formatter = %formatter.command,
                    reason = %reason,
                    "formatting failed, keeping unformatted content"
                );
                content.to_string()
            }
        }
    }

    async fn run_formatter(
        &self,
        formatter: &FormatterConfig,
        content: &str,
    ) -> Result<String, String> {
        let binary = which::which(&formatter.command)
            .map_err(|_| format!("'{}' not found on PATH", formatter.command))?;

        let mut child = Command::new(binary)
            .args(&formatter.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| e.to_string())?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = content.as_bytes().to_vec();
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(format!("exit code {:?}: {}", output.status.code(), stderr));
        }
        String::from_utf8(output.stdout).map_err(|e| e.to_string())
    }
}
