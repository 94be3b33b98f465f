// vector_index.rs — Flat, exact nearest-neighbour index (squared L2).
//
// Rebuilt from the embedding store on demand and never persisted. Vectors
// are stored contiguously; position i in the matrix belongs to `ids[i]`,
// and `positions` maps back from id to row.

use std::collections::{BTreeMap, HashMap};

use crate::error::IndexError;
use crate::store::{EmbeddingRecord, EmbeddingStore};

/// One search hit. Smaller distance means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: usize,
    matrix: Vec<f32>,
    ids: Vec<String>,
    positions: HashMap<String, usize>,
}

impl VectorIndex {
    /// Build from store records. Entries that are empty or contain
    /// non-finite values are skipped. The index dimension is the most common
    /// vector length among the rest (ties go to the length seen first), and
    /// vectors of any other length are left out.
    pub fn build(records: &BTreeMap<String, EmbeddingRecord>) -> Self {
        let mut index = Self::default();
        let mut skipped = 0usize;

        let valid: Vec<(&String, &Vec<f32>)> = records
            .iter()
            .map(|(id, record)| (id, &record.embedding))
            .filter(|(_, v)| !v.is_empty() && v.iter().all(|x| x.is_finite()))
            .collect();
        skipped += records.len() - valid.len();

        // (length, count, first seen)
        let mut counts: Vec<(usize, usize, usize)> = Vec::new();
        for (order, (_, vector)) in valid.iter().enumerate() {
            match counts.iter_mut().find(|(len, _, _)| *len == vector.len()) {
                Some(entry) => entry.1 += 1,
                None => counts.push((vector.len(), 1, order)),
            }
        }
        index.dimension = counts
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
            .map(|(len, _, _)| *len)
            .unwrap_or(0);

        for (id, vector) in valid {
            if vector.len() != index.dimension {
                tracing::warn!(
                    fragment_id = %id,
                    len = vector.len(),
                    dimension = index.dimension,
                    "embedding length disagrees with index dimension, left out"
                );
                skipped += 1;
                continue;
            }
            index.positions.insert(id.clone(), index.ids.len());
            index.ids.push(id.clone());
            index.matrix.extend_from_slice(vector);
        }

        if skipped > 0 {
            tracing::warn!(skipped, kept = index.ids.len(), "malformed embedding vectors left out of index");
        }
        tracing::debug!(size = index.ids.len(), dimension = index.dimension, "vector index built");
        index
    }

    /// Load the store and build the index from it.
    pub fn from_store(store: &EmbeddingStore) -> Self {
        Self::build(&store.load())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn id_at(&self, position: usize) -> Option<&str> {
        self.ids.get(position).map(String::as_str)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.matrix[start..start + self.dimension]
    }

    /// Return the `k` nearest vectors to `query`, closest first.
    ///
    /// An empty index or `k == 0` yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if self.is_empty() {
            tracing::warn!("vector index is empty, nothing to search");
            return Ok(Vec::new());
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|pos| (pos, squared_l2(self.row(pos), query)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k.min(self.len()));

        Ok(scored
            .into_iter()
            .map(|(pos, distance)| Neighbor {
                id: self.ids[pos].clone(),
                distance,
            })
            .collect())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
