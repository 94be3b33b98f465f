//! Build, formatting, quality-analysis and agent process configuration

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Build/verify settings (the `[build]` table of weave.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Shell command that verifies the workspace; success is exit code 0.
    #[serde(default = "default_build_command")]
    pub build_command: String,

    /// Upper bound on step-run + build attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Run after any templated source was written.
    #[serde(default = "default_regenerate_command")]
    pub regenerate_command: String,

    /// Timeout for build and regenerate commands.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Per-extension source formatters.
    #[serde(default = "default_formatters")]
    pub formatters: Vec<FormatterConfig>,

    #[serde(default = "default_format_timeout_secs")]
    pub format_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_command: default_build_command(),
            max_attempts: default_max_attempts(),
            regenerate_command: default_regenerate_command(),
            command_timeout_secs: default_command_timeout_secs(),
            formatters: default_formatters(),
            format_timeout_secs: default_format_timeout_secs(),
        }
    }
}

impl BuildConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn format_timeout(&self) -> Duration {
        Duration::from_secs(self.format_timeout_secs)
    }
}

/// A formatter reading source on stdin and writing the result to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatterConfig {
    /// File suffix this formatter applies to, e.g. `.go`.
    pub extension: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// An external agent process (an `[agents.<name>]` table of weave.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra environment for the process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Code-quality analysis settings (the `[quality]` table of weave.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Registry name of the agent proposing docstrings.
    #[serde(default = "default_docstring_agent")]
    pub docstring_agent: String,

    /// Registry name of the agent proposing file splits.
    #[serde(default = "default_filesplit_agent")]
    pub filesplit_agent: String,

    /// Files longer than this are candidates for splitting.
    #[serde(default = "default_max_file_lines")]
    pub max_file_lines: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            docstring_agent: default_docstring_agent(),
            filesplit_agent: default_filesplit_agent(),
            max_file_lines: default_max_file_lines(),
        }
    }
}

// Serde default functions
fn default_build_command() -> String {
    "make run".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_regenerate_command() -> String {
    "templ generate".to_string()
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_formatters() -> Vec<FormatterConfig> {
    vec![FormatterConfig {
        extension: ".go".to_string(),
        command: "gofmt".to_string(),
        args: Vec::new(),
    }]
}

fn default_format_timeout_secs() -> u64 {
    15
}

fn default_agent_timeout_secs() -> u64 {
    600
}

fn default_docstring_agent() -> String {
    "docstring_enricher".to_string()
}

fn default_filesplit_agent() -> String {
    "file_splitter".to_string()
}

fn default_max_file_lines() -> usize {
    500
}
