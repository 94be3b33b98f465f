//! Embedding and selection configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Embedding service settings (the `[embedding]` table of weave.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model name as known to the service.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Ollama-compatible service.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Cap for the documentation part of a fragment's embedding text.
    /// Signature and definition are each capped at a third of this.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Maximum number of embedding calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Extra attempts after a failed call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Per-call timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            max_text_length: default_max_text_length(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Fragment selection settings (the `[selection]` table of weave.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_top_k")]
    pub top_k: i64,

    /// Drop neighbours whose squared L2 distance exceeds this value.
    #[serde(default)]
    pub threshold: Option<f32>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: None,
        }
    }
}

// Serde default functions
fn default_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_api_base() -> String {
    "http://localhost:11434".to_string()
}

fn default_max_text_length() -> usize {
    512
}

fn default_concurrency() -> usize {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_secs() -> u64 {
    3
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_top_k() -> i64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let config: EmbeddingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.model, "nomic-embed-text");
        assert_eq!(config.max_text_length, 512);
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn selection_threshold_is_optional() {
        let config: SelectionConfig = serde_json::from_str(r#"{"top_k": 3}"#).unwrap();
        assert_eq!(config.top_k, 3);
        assert!(config.threshold.is_none());
    }
}
