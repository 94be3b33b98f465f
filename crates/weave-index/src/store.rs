// store.rs — Incremental, digest-keyed embedding store.
//
// The store file maps fragment id → {embedding, code_digest}. An update
// diffs the current inventory against the stored records:
//   - digest unchanged   → record carried forward, no service call
//   - new or changed     → (re)embedded, bounded concurrency
//   - gone from inventory → dropped
// Failed fragments are left out of this run's store and retried next run.
// The file is written through a temp file and renamed into place.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::digest::digest;
use crate::embedder::{embed_batch, Embedder};
use crate::embedding_text::embedding_text;
use crate::error::IndexError;
use crate::inventory::Inventory;

/// One fragment's vector and the digest of the text it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub embedding: Vec<f32>,
    pub code_digest: String,
}

/// Counters describing one `update` run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Records carried forward because the digest matched.
    pub reused: usize,
    /// Records produced by a fresh embedding call.
    pub generated: usize,
    /// Fragments whose embedding failed this run (sorted).
    pub failed: Vec<String>,
    /// Stored records removed because their fragment left the inventory.
    pub dropped: usize,
}

/// The on-disk embedding store.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load every well-formed record. A missing or corrupt file reads as an
    /// empty store; malformed entries are skipped individually.
    pub fn load(&self) -> BTreeMap<String, EmbeddingRecord> {
        let mut records = BTreeMap::new();
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return records,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "embedding store unreadable, treating as empty");
                return records;
            }
        };
        let raw: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "embedding store corrupt, treating as empty");
                return records;
            }
        };
        for (id, value) in raw {
            match serde_json::from_value::<EmbeddingRecord>(value) {
                Ok(record) => {
                    records.insert(id, record);
                }
                Err(e) => {
                    tracing::debug!(fragment_id = %id, error = %e, "skipping malformed embedding record");
                }
            }
        }
        records
    }

    /// Write all records, replacing the store file atomically.
    pub fn save(&self, records: &BTreeMap<String, EmbeddingRecord>) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| IndexError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let bytes = serde_json::to_vec(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).map_err(|source| IndexError::IoError {
            path: tmp.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(IndexError::IoError {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Delete the store file if present.
    pub fn remove(&self) -> Result<(), IndexError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(IndexError::IoError {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Bring the store in line with `inventory`.
    ///
    /// Returns `Err(NothingEmbedded)` without touching the file when the
    /// inventory has fragments but not a single record could be reused or
    /// generated. An empty inventory deletes the store.
    pub async fn update(
        &self,
        inventory: &Inventory,
        embedder: Arc<dyn Embedder>,
        config: &EmbeddingConfig,
    ) -> Result<UpdateOutcome, IndexError> {
        if inventory.is_empty() {
            tracing::warn!("inventory is empty, removing embedding store");
            self.remove()?;
            return Ok(UpdateOutcome::default());
        }

        let previous = self.load();
        let mut records: BTreeMap<String, EmbeddingRecord> = BTreeMap::new();
        let mut pending: Vec<(String, String)> = Vec::new();
        let mut pending_digests: HashMap<String, String> = HashMap::new();
        let mut outcome = UpdateOutcome::default();

        for (id, info) in &inventory.fragments {
            let text = embedding_text(id, info, config.max_text_length);
            let current_digest = match info.code_digest.as_deref() {
                Some(d) if !d.is_empty() => d.to_string(),
                _ => {
                    tracing::debug!(fragment_id = %id, "no code_digest in inventory, digesting embedding text");
                    digest(&text)
                }
            };

            match previous.get(id) {
                Some(record)
                    if record.code_digest == current_digest && !record.embedding.is_empty() =>
                {
                    records.insert(id.clone(), record.clone());
                    outcome.reused += 1;
                }
                _ => {
                    pending_digests.insert(id.clone(), current_digest);
                    pending.push((id.clone(), text));
                }
            }
        }

        outcome.dropped = previous
            .keys()
            .filter(|id| !inventory.fragments.contains_key(*id))
            .count();

        tracing::info!(
            reused = outcome.reused,
            pending = pending.len(),
            dropped = outcome.dropped,
            concurrency = config.concurrency,
            "updating embedding store"
        );

        for (id, result) in embed_batch(embedder, pending, config.concurrency).await {
            match result {
                Ok(embedding) => {
                    let code_digest = pending_digests.remove(&id).unwrap_or_default();
                    records.insert(
                        id,
                        EmbeddingRecord {
                            embedding,
                            code_digest,
                        },
                    );
                    outcome.generated += 1;
                }
                Err(e) => {
                    tracing::error!(fragment_id = %id, error = %e, "embedding failed, fragment omitted this run");
                    outcome.failed.push(id);
                }
            }
        }
        outcome.failed.sort();

        if records.is_empty() {
            return Err(IndexError::NothingEmbedded {
                fragment_count: inventory.len(),
            });
        }

        self.save(&records)?;
        tracing::info!(
            records = records.len(),
            generated = outcome.generated,
            failed = outcome.failed.len(),
            path = %self.path.display(),
            "embedding store saved"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::FragmentInfo;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Deterministic embedder that records which texts it was asked for.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
        refuse: Option<&'static str>,
    }

    #[async_trait]
    impl Embedder for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
            self.calls.lock().unwrap().push(text.to_string());
            if self.refuse.is_some_and(|r| text.contains(r)) {
                return Err(IndexError::EmbeddingFailed("refused".into()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn fragment(name: &str, digest: &str) -> FragmentInfo {
        FragmentInfo {
            fragment_type: Some("function".into()),
            identifier: Some(name.into()),
            code_digest: Some(digest.into()),
            ..Default::default()
        }
    }

    fn inventory(entries: &[(&str, &str)]) -> Inventory {
        let mut inv = Inventory::default();
        for (name, d) in entries {
            inv.fragments.insert(name.to_string(), fragment(name, d));
        }
        inv
    }

    #[tokio::test]
    async fn reuses_matching_and_regenerates_stale_and_new() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        let mut seeded = BTreeMap::new();
        seeded.insert(
            "A".to_string(),
            EmbeddingRecord {
                embedding: vec![9.0, 9.0],
                code_digest: "d1".into(),
            },
        );
        seeded.insert(
            "B".to_string(),
            EmbeddingRecord {
                embedding: vec![8.0, 8.0],
                code_digest: "d2_old".into(),
            },
        );
        store.save(&seeded).unwrap();

        let embedder = Arc::new(Recording::default());
        let outcome = store
            .update(
                &inventory(&[("A", "d1"), ("B", "d2"), ("C", "d3")]),
                embedder.clone(),
                &EmbeddingConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.reused, 1);
        assert_eq!(outcome.generated, 2);
        assert_eq!(embedder.calls.lock().unwrap().len(), 2);

        let records = store.load();
        assert_eq!(records["A"].embedding, vec![9.0, 9.0]);
        assert_eq!(records["B"].code_digest, "d2");
        assert_ne!(records["B"].embedding, vec![8.0, 8.0]);
        assert_eq!(records["C"].code_digest, "d3");
    }

    #[tokio::test]
    async fn second_update_is_byte_identical_and_calls_nothing() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        let inv = inventory(&[("A", "d1"), ("B", "d2")]);
        let config = EmbeddingConfig::default();

        store.update(&inv, Arc::new(Recording::default()), &config).await.unwrap();
        let first = fs::read(store.path()).unwrap();

        let embedder = Arc::new(Recording::default());
        let outcome = store.update(&inv, embedder.clone(), &config).await.unwrap();
        let second = fs::read(store.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(outcome.reused, 2);
        assert!(embedder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn orphans_are_dropped_and_failures_omitted() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        let config = EmbeddingConfig::default();
        store
            .update(
                &inventory(&[("Old", "d0"), ("Keep", "d1")]),
                Arc::new(Recording::default()),
                &config,
            )
            .await
            .unwrap();

        let embedder = Arc::new(Recording {
            refuse: Some("Broken"),
            ..Default::default()
        });
        let outcome = store
            .update(&inventory(&[("Keep", "d1"), ("Broken", "d2")]), embedder, &config)
            .await
            .unwrap();

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.failed, vec!["Broken".to_string()]);
        let records = store.load();
        assert!(records.contains_key("Keep"));
        assert!(!records.contains_key("Old"));
        assert!(!records.contains_key("Broken"));
    }

    #[tokio::test]
    async fn total_failure_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        fs::write(store.path(), "{\"X\": {\"embedding\": [1.0], \"code_digest\": \"x\"}}").unwrap();
        let before = fs::read(store.path()).unwrap();

        let embedder = Arc::new(Recording {
            refuse: Some("Name"),
            ..Default::default()
        });
        let err = store
            .update(&inventory(&[("A", "d1")]), embedder, &EmbeddingConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::NothingEmbedded { fragment_count: 1 }));
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn empty_inventory_removes_store() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        fs::write(store.path(), "{}").unwrap();

        let outcome = store
            .update(&Inventory::default(), Arc::new(Recording::default()), &EmbeddingConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
        assert!(!store.exists());
    }

    #[test]
    fn corrupt_file_and_malformed_entries_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        fs::write(store.path(), "[[[").unwrap();
        assert!(store.load().is_empty());

        fs::write(
            store.path(),
            r#"{"ok": {"embedding": [1.0, 2.0], "code_digest": "a"},
                "bad": {"embedding": "nope", "code_digest": "b"},
                "worse": 7}"#,
        )
        .unwrap();
        let records = store.load();
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("ok"));
    }

    #[tokio::test]
    async fn text_change_without_inventory_digest_forces_regeneration() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        let config = EmbeddingConfig::default();

        let mut inv = Inventory::default();
        inv.fragments.insert(
            "A".into(),
            FragmentInfo {
                identifier: Some("A".into()),
                signature: Some("func A()".into()),
                ..Default::default()
            },
        );
        store.update(&inv, Arc::new(Recording::default()), &config).await.unwrap();

        if let Some(info) = inv.fragments.get_mut("A") {
            info.signature = Some("func A(x int)".into());
        }
        let embedder = Arc::new(Recording::default());
        let outcome = store.update(&inv, embedder.clone(), &config).await.unwrap();
        assert_eq!(outcome.generated, 1);
        assert_eq!(embedder.calls.lock().unwrap().len(), 1);
    }
}
