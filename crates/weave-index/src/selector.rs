// selector.rs — Natural-language request → ranked fragment ids.
//
// The selector owns the embedding store handle and a lazily built vector
// index. If the store file does not exist yet it is bootstrapped from the
// inventory on first use; a missing inventory at that point is an error.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::embedder::Embedder;
use crate::error::IndexError;
use crate::inventory::Inventory;
use crate::store::EmbeddingStore;
use crate::vector_index::VectorIndex;

/// Result of one selection: ids and raw squared-L2 distances, aligned and
/// sorted closest first, plus a human-readable rationale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub ids: Vec<String>,
    pub distances: Vec<f32>,
    pub rationale: String,
}

impl Selection {
    fn from_hits(ids: Vec<String>, distances: Vec<f32>) -> Self {
        let rationale = if ids.is_empty() {
            "No semantically similar fragments.".to_string()
        } else {
            ids.iter()
                .zip(&distances)
                .map(|(id, d)| format!("Fragment '{}' (distance L2²: {:.4})", id, d))
                .collect::<Vec<_>>()
                .join(". ")
        };
        Self {
            ids,
            distances,
            rationale,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub struct FragmentSelector {
    store: EmbeddingStore,
    inventory_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    config: EmbeddingConfig,
    index: Option<VectorIndex>,
}

impl FragmentSelector {
    pub fn new(
        store: EmbeddingStore,
        inventory_path: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        config: EmbeddingConfig,
    ) -> Self {
        Self {
            store,
            inventory_path: inventory_path.into(),
            embedder,
            config,
            index: None,
        }
    }

    /// Drop the cached index so the next selection rebuilds it from disk.
    pub fn invalidate(&mut self) {
        self.index = None;
    }

    async fn ensure_index(&mut self) -> Result<&VectorIndex, IndexError> {
        if !self.store.exists() {
            tracing::info!(
                store = %self.store.path().display(),
                "embedding store absent, bootstrapping from inventory"
            );
            let inventory = Inventory::load(&self.inventory_path)?;
            self.store
                .update(&inventory, Arc::clone(&self.embedder), &self.config)
                .await?;
            self.index = None;
        }
        if self.index.is_none() {
            self.index = Some(VectorIndex::from_store(&self.store));
        }
        match self.index.as_ref() {
            Some(index) => Ok(index),
            None => Err(IndexError::EmbeddingFailed("index unavailable".to_string())),
        }
    }

    /// Select up to `top_k` fragments closest to `request`.
    ///
    /// `top_k <= 0` or an empty index gives an empty selection. With a
    /// `threshold`, neighbours farther than it are dropped.
    pub async fn select(
        &mut self,
        request: &str,
        top_k: i64,
        threshold: Option<f32>,
    ) -> Result<Selection, IndexError> {
        let embedder = Arc::clone(&self.embedder);
        let index = self.ensure_index().await?;
        if top_k <= 0 || index.is_empty() {
            return Ok(Selection::from_hits(Vec::new(), Vec::new()));
        }
        let k = usize::try_from(top_k).unwrap_or(usize::MAX).min(index.len());

        let query = embedder.embed(request).await?;
        let hits = index.search(&query, k)?;

        let (ids, distances): (Vec<String>, Vec<f32>) = hits
            .into_iter()
            .filter(|hit| threshold.map_or(true, |t| hit.distance <= t))
            .map(|hit| (hit.id, hit.distance))
            .unzip();

        tracing::info!(selected = ids.len(), top_k, ?threshold, "fragment selection done");
        Ok(Selection::from_hits(ids, distances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::FragmentInfo;
    use crate::store::EmbeddingRecord;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Maps a few words to fixed points on a line.
    struct Keyword;

    #[async_trait]
    impl Embedder for Keyword {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
            let x = if text.contains("login") {
                0.0
            } else if text.contains("Session") {
                1.0
            } else if text.contains("Render") {
                3.0
            } else {
                10.0
            };
            Ok(vec![x, 0.0])
        }
    }

    fn seeded_store(dir: &TempDir) -> EmbeddingStore {
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        let mut records = BTreeMap::new();
        for (id, x) in [("auth", 0.5f32), ("session", 1.0), ("render", 3.0)] {
            records.insert(
                id.to_string(),
                EmbeddingRecord {
                    embedding: vec![x, 0.0],
                    code_digest: id.to_string(),
                },
            );
        }
        store.save(&records).unwrap();
        store
    }

    fn selector(dir: &TempDir, store: EmbeddingStore) -> FragmentSelector {
        FragmentSelector::new(
            store,
            dir.path().join("fragments_manifest.json"),
            Arc::new(Keyword),
            EmbeddingConfig::default(),
        )
    }

    #[tokio::test]
    async fn ranks_by_distance_with_rationale() {
        let dir = TempDir::new().unwrap();
        let mut sel = selector(&dir, seeded_store(&dir));

        let selection = sel.select("fix login flow", 2, None).await.unwrap();
        assert_eq!(selection.ids, vec!["auth", "session"]);
        assert_eq!(selection.distances, vec![0.25, 1.0]);
        assert_eq!(
            selection.rationale,
            "Fragment 'auth' (distance L2²: 0.2500). Fragment 'session' (distance L2²: 1.0000)"
        );
    }

    #[tokio::test]
    async fn larger_threshold_selects_superset() {
        let dir = TempDir::new().unwrap();
        let mut sel = selector(&dir, seeded_store(&dir));

        let tight = sel.select("login", 10, Some(0.5)).await.unwrap();
        let loose = sel.select("login", 10, Some(2.0)).await.unwrap();
        assert_eq!(tight.ids, vec!["auth"]);
        assert!(tight.ids.iter().all(|id| loose.ids.contains(id)));
        assert_eq!(loose.ids.len(), 2);
        assert_eq!(loose.ids.len(), loose.distances.len());
    }

    #[tokio::test]
    async fn non_positive_top_k_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut sel = selector(&dir, seeded_store(&dir));
        assert!(sel.select("login", 0, None).await.unwrap().is_empty());
        assert!(sel.select("login", -3, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn top_k_is_capped_at_index_size() {
        let dir = TempDir::new().unwrap();
        let mut sel = selector(&dir, seeded_store(&dir));
        let selection = sel.select("login", 50, None).await.unwrap();
        assert_eq!(selection.ids.len(), 3);
    }

    #[tokio::test]
    async fn bootstraps_store_from_inventory() {
        let dir = TempDir::new().unwrap();
        let mut inventory = Inventory::default();
        inventory.fragments.insert(
            "views/page.templ".into(),
            FragmentInfo {
                fragment_type: Some("function".into()),
                identifier: Some("Render".into()),
                code_digest: Some("r1".into()),
                ..Default::default()
            },
        );
        inventory
            .save(&dir.path().join("fragments_manifest.json"))
            .unwrap();

        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        let mut sel = selector(&dir, store.clone());
        let selection = sel.select("Render the page", 1, None).await.unwrap();

        assert!(store.exists());
        assert_eq!(selection.ids, vec!["views/page.templ"]);
    }

    #[tokio::test]
    async fn missing_store_and_inventory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("fragment_embeddings.json"));
        let mut sel = selector(&dir, store);
        let err = sel.select("anything", 5, None).await.unwrap_err();
        assert!(matches!(err, IndexError::InventoryMissing { .. }));
    }
}
