// embedder.rs — The embedding gateway: text → vector.
//
// `Embedder` is the seam between the index and whatever service turns text
// into vectors. `OllamaEmbedder` talks to an Ollama-compatible `/api/embed`
// endpoint. `embed_batch` fans a list of texts out over a bounded number of
// concurrent calls; each call succeeds or fails on its own.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EmbeddingConfig;
use crate::error::IndexError;

/// Turns a piece of text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Embed one text. Empty or whitespace-only text is rejected without
    /// contacting the service.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;
}

/// Embedding client for Ollama (`POST {api_base}/api/embed`).
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| IndexError::EmbeddingFailed(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IndexError::EmbeddingFailed(format!("request to {} timed out", url))
                } else if e.is_connect() {
                    IndexError::EmbeddingFailed(format!(
                        "cannot connect to embedding service at {}",
                        self.base_url
                    ))
                } else {
                    IndexError::EmbeddingFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::EmbeddingFailed(format!(
                "embedding service error ({}): {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| IndexError::EmbeddingFailed(format!("unparseable response: {}", e)))?;

        match parsed.embeddings.into_iter().next() {
            Some(vector) if !vector.is_empty() => Ok(vector),
            _ => Err(IndexError::EmbeddingFailed(
                "response carried no embedding".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        if text.trim().is_empty() {
            return Err(IndexError::EmbeddingFailed("empty text".to_string()));
        }

        let mut attempt = 0;
        loop {
            match self.embed_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        model = %self.model,
                        attempt,
                        error = %e,
                        "embedding call failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Embed many `(key, text)` pairs with at most `concurrency` calls in
/// flight. Results come back in completion order, one per input; a failed
/// call yields an `Err` for its key and does not affect the others. A task
/// that panics or is aborted also yields an `Err` for its key.
pub async fn embed_batch(
    embedder: Arc<dyn Embedder>,
    items: Vec<(String, String)>,
    concurrency: usize,
) -> Vec<(String, Result<Vec<f32>, IndexError>)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let mut pending: BTreeSet<String> = BTreeSet::new();

    for (key, text) in items {
        pending.insert(key.clone());
        let semaphore = Arc::clone(&semaphore);
        let embedder = Arc::clone(&embedder);
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        key,
                        Err(IndexError::EmbeddingFailed("scheduler closed".to_string())),
                    )
                }
            };
            let result = embedder.embed(&text).await;
            (key, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(pair) => {
                pending.remove(&pair.0);
                results.push(pair);
            }
            Err(e) => tracing::error!(error = %e, "embedding task aborted"),
        }
    }
    for key in pending {
        results.push((
            key,
            Err(IndexError::EmbeddingFailed("embedding task aborted".to_string())),
        ));
    }
    results
}
