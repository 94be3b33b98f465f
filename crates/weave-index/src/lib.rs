//! # weave-index
//!
//! Incremental semantic index over a code-fragment inventory.
//!
//! Fragments come from an external static analyser as a JSON inventory.
//! Each fragment is turned into a short metadata text, embedded once, and
//! kept in an on-disk store keyed by the fragment's content digest, so
//! repeated runs only pay for fragments whose text actually changed.
//!
//! ## Key components
//!
//! - [`digest`] — SHA-256 fingerprints used for change detection.
//! - [`Inventory`] / [`FragmentInfo`] — the fragment inventory model.
//! - [`Embedder`] — the text → vector seam; [`OllamaEmbedder`] is the HTTP
//!   implementation and [`embed_batch`] the bounded concurrent mode.
//! - [`EmbeddingStore`] — digest-matched reuse, atomic persistence.
//! - [`VectorIndex`] — flat exact squared-L2 search, rebuilt from the store.
//! - [`FragmentSelector`] — request text → ranked fragment ids + rationale.

pub mod config;
pub mod digest;
pub mod embedder;
pub mod embedding_text;
pub mod error;
pub mod inventory;
pub mod selector;
pub mod source;
pub mod store;
pub mod vector_index;

pub use config::{EmbeddingConfig, SelectionConfig};
pub use digest::digest;
pub use embedder::{embed_batch, Embedder, OllamaEmbedder};
pub use error::IndexError;
pub use inventory::{FragmentImport, FragmentInfo, FragmentKind, Inventory};
pub use selector::{FragmentSelector, Selection};
pub use source::{extract_line_range, read_fragment_source};
pub use store::{EmbeddingRecord, EmbeddingStore, UpdateOutcome};
pub use vector_index::{Neighbor, VectorIndex};
