// error.rs — Error types for the semantic index subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading inventories, embedding text,
/// persisting the embedding store, or selecting fragments.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The fragment inventory file does not exist.
    #[error("fragment inventory not found at {path}")]
    InventoryMissing { path: PathBuf },

    /// The fragment inventory exists but could not be parsed.
    #[error("invalid fragment inventory at {path}: {reason}")]
    InvalidInventory { path: PathBuf, reason: String },

    /// A fragment id is not present in the inventory.
    #[error("fragment '{id}' not found in inventory")]
    FragmentNotFound { id: String },

    /// A fragment's line range does not fit the file it points at.
    #[error("invalid line range {start}..={end} for {path} ({line_count} lines)")]
    InvalidLineRange {
        path: PathBuf,
        start: usize,
        end: usize,
        line_count: usize,
    },

    /// A fragment lacks the metadata needed to locate its text.
    #[error("fragment '{id}' is missing {field}")]
    MissingField { id: String, field: &'static str },

    /// The embedding service call failed (after retries).
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A query vector does not match the index dimension.
    #[error("query has dimension {got}, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Nothing could be embedded or reused although fragments exist.
    #[error("no embeddings produced for {fragment_count} fragment(s)")]
    NothingEmbedded { fragment_count: usize },

    /// Failed to serialize/deserialize index data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
