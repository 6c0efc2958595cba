//! In-memory vector index with exact cosine retrieval
//!
//! [`VectorIndex`] stores `(key, vector, attributes)` records and answers
//! k-nearest-neighbor queries by cosine similarity. Retrieval is a full scan
//! plus a stable sort — catalogues are small (hundreds to low thousands of
//! records), so exactness and determinism win over approximate-NN throughput.
//!
//! All records in one index share a single dimensionality, fixed by the first
//! insert (or up front via [`VectorIndex::with_dimension`]). A mismatched
//! vector is rejected at insert time.
//!
//! The index uses an interior [`parking_lot::RwLock`]: any number of queries
//! may run concurrently while inserts and merges take the write lock and are
//! serialized against all in-flight readers.
//!
//! # Example
//!
//! ```rust
//! use tact_core::index::VectorIndex;
//! use serde_json::Map;
//!
//! let index = VectorIndex::new();
//! index.add(Some("greet".into()), vec![1.0, 0.0], Map::new()).unwrap();
//! index.add(None, vec![0.0, 1.0], Map::new()).unwrap();
//!
//! let hits = index.query(&[1.0, 0.1], 1).unwrap();
//! assert_eq!(hits[0].key, "greet");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ActionError, Result};

/// A single stored embedding with its open attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique key, caller-assigned or auto-incrementing.
    pub key: String,
    /// The embedding itself.
    pub vector: Vec<f32>,
    /// Open key-value payload carried alongside the vector.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// One retrieval hit: a record plus its cosine similarity to the query.
///
/// Transient — produced per query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateMatch {
    /// Key of the matched record.
    pub key: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
    /// The matched record.
    pub record: VectorRecord,
}

/// Serialized form of the index. Insertion order is the record order.
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
}

#[derive(Debug, Default)]
struct IndexState {
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
    /// key -> position in `records`. Overwrites keep the original slot so
    /// insertion-order tie-breaks stay stable.
    slots: HashMap<String, usize>,
}

/// Exact-scan vector index over cosine similarity.
#[derive(Debug, Default)]
pub struct VectorIndex {
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index. Dimensionality is fixed by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with a fixed dimensionality.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            state: RwLock::new(IndexState {
                dimension: Some(dimension),
                ..IndexState::default()
            }),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// The index's dimensionality, if fixed yet.
    pub fn dimension(&self) -> Option<usize> {
        self.state.read().dimension
    }

    /// Insert a record. With no `key`, the stringified current record count
    /// is assigned. Re-adding an existing key overwrites that record in
    /// place, keeping its original insertion slot.
    ///
    /// # Errors
    ///
    /// [`ActionError::DimensionMismatch`] if the vector's length differs from
    /// the index's dimensionality.
    pub fn add(
        &self,
        key: Option<String>,
        vector: Vec<f32>,
        attributes: Map<String, Value>,
    ) -> Result<()> {
        let mut state = self.state.write();
        match state.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(ActionError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => state.dimension = Some(vector.len()),
        }

        let key = key.unwrap_or_else(|| state.records.len().to_string());
        let record = VectorRecord {
            key: key.clone(),
            vector,
            attributes,
        };

        if let Some(&slot) = state.slots.get(&key) {
            state.records[slot] = record;
        } else {
            let slot = state.records.len();
            state.records.push(record);
            state.slots.insert(key, slot);
        }
        Ok(())
    }

    /// Return up to `k` records ranked by descending cosine similarity to
    /// `vector`. Equal scores keep insertion order (earlier-inserted wins).
    ///
    /// # Errors
    ///
    /// - [`ActionError::EmptyIndex`] if no records exist. Callers resolving
    ///   actions treat this as "no candidates".
    /// - [`ActionError::DimensionMismatch`] if the query vector's length
    ///   differs from the index's dimensionality.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<CandidateMatch>> {
        let state = self.state.read();
        if state.records.is_empty() {
            return Err(ActionError::EmptyIndex);
        }
        if let Some(expected) = state.dimension {
            if expected != vector.len() {
                return Err(ActionError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = state
            .records
            .iter()
            .enumerate()
            .map(|(slot, record)| (slot, cosine_similarity(vector, &record.vector)))
            .collect();
        // Stable sort: records enter in insertion order, so ties keep it.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(slot, score)| {
                let record = state.records[slot].clone();
                CandidateMatch {
                    key: record.key.clone(),
                    score,
                    record,
                }
            })
            .collect())
    }

    /// Fold `other`'s records into this index. Keys present in `other`
    /// overwrite this index's records of the same key.
    ///
    /// # Errors
    ///
    /// - [`ActionError::InvalidOperation`] on self-merge.
    /// - [`ActionError::DimensionMismatch`] if the two indices hold vectors
    ///   of different dimensionality.
    pub fn merge(&self, other: &VectorIndex) -> Result<()> {
        if std::ptr::eq(self, other) {
            return Err(ActionError::invalid_operation(
                "cannot merge an index with itself",
            ));
        }
        let other_state = other.state.read();
        let mut state = self.state.write();

        match (state.dimension, other_state.dimension) {
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(ActionError::DimensionMismatch { expected, actual });
            }
            (None, Some(d)) => state.dimension = Some(d),
            _ => {}
        }

        for record in &other_state.records {
            if let Some(&slot) = state.slots.get(&record.key) {
                state.records[slot] = record.clone();
            } else {
                let slot = state.records.len();
                state.records.push(record.clone());
                state.slots.insert(record.key.clone(), slot);
            }
        }
        Ok(())
    }

    /// Write the index to `path` as a JSON snapshot.
    ///
    /// The snapshot round-trips keys, vectors (full floating-point
    /// precision), and attributes exactly; repeated save/load cycles produce
    /// byte-identical files.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.state.read();
        let snapshot = IndexSnapshot {
            dimension: state.dimension,
            records: state.records.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        drop(state);
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Restore an index previously written by [`save`](VectorIndex::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let snapshot: IndexSnapshot = serde_json::from_slice(&bytes)?;
        Self::from_snapshot(snapshot)
    }

    fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        let mut slots = HashMap::with_capacity(snapshot.records.len());
        for (slot, record) in snapshot.records.iter().enumerate() {
            if let Some(expected) = snapshot.dimension {
                if record.vector.len() != expected {
                    return Err(ActionError::DimensionMismatch {
                        expected,
                        actual: record.vector.len(),
                    });
                }
            }
            slots.insert(record.key.clone(), slot);
        }
        Ok(Self {
            state: RwLock::new(IndexState {
                dimension: snapshot.dimension,
                records: snapshot.records,
                slots,
            }),
        })
    }

    /// Snapshot the records in insertion order.
    pub fn records(&self) -> Vec<VectorRecord> {
        self.state.read().records.clone()
    }
}

impl Clone for VectorIndex {
    fn clone(&self) -> Self {
        let state = self.state.read();
        Self {
            state: RwLock::new(IndexState {
                dimension: state.dimension,
                records: state.records.clone(),
                slots: state.slots.clone(),
            }),
        }
    }
}

impl fmt::Display for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorIndex with {} records", self.len())
    }
}

/// Cosine similarity, accumulated in f64 for stability. A zero-norm operand
/// scores 0.0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(action: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("action".to_string(), json!(action));
        map
    }

    #[test]
    fn auto_keys_increment_with_record_count() {
        let index = VectorIndex::new();
        index.add(None, vec![1.0, 0.0], Map::new()).unwrap();
        index.add(None, vec![0.0, 1.0], Map::new()).unwrap();

        let records = index.records();
        assert_eq!(records[0].key, "0");
        assert_eq!(records[1].key, "1");
    }

    #[test]
    fn dimension_fixed_by_first_insert() {
        let index = VectorIndex::new();
        index.add(None, vec![1.0, 0.0, 0.0], Map::new()).unwrap();

        let err = index.add(None, vec![1.0, 0.0], Map::new()).unwrap_err();
        assert!(matches!(
            err,
            ActionError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn query_empty_index_fails() {
        let index = VectorIndex::new();
        assert!(matches!(
            index.query(&[1.0], 5),
            Err(ActionError::EmptyIndex)
        ));
    }

    #[test]
    fn query_orders_by_similarity_and_caps_at_k() {
        let index = VectorIndex::new();
        index.add(Some("x".into()), vec![1.0, 0.0], attrs("x")).unwrap();
        index.add(Some("y".into()), vec![0.0, 1.0], attrs("y")).unwrap();
        index.add(Some("xy".into()), vec![1.0, 1.0], attrs("xy")).unwrap();

        let hits = index.query(&[1.0, 0.2], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key, "x");
        assert_eq!(hits[1].key, "xy");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let index = VectorIndex::new();
        // Identical vectors: every query ties.
        index.add(Some("first".into()), vec![1.0, 1.0], Map::new()).unwrap();
        index.add(Some("second".into()), vec![1.0, 1.0], Map::new()).unwrap();
        index.add(Some("third".into()), vec![1.0, 1.0], Map::new()).unwrap();

        let hits = index.query(&[1.0, 1.0], 3).unwrap();
        let keys: Vec<&str> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, ["first", "second", "third"]);
    }

    #[test]
    fn overwrite_keeps_original_slot() {
        let index = VectorIndex::new();
        index.add(Some("a".into()), vec![1.0, 1.0], Map::new()).unwrap();
        index.add(Some("b".into()), vec![1.0, 1.0], Map::new()).unwrap();
        // Overwrite "a" with an identical vector; it must still rank before "b".
        index.add(Some("a".into()), vec![1.0, 1.0], attrs("new")).unwrap();

        assert_eq!(index.len(), 2);
        let hits = index.query(&[1.0, 1.0], 2).unwrap();
        assert_eq!(hits[0].key, "a");
        assert_eq!(hits[0].record.attributes["action"], json!("new"));
    }

    #[test]
    fn self_merge_is_rejected() {
        let index = VectorIndex::new();
        index.add(None, vec![1.0], Map::new()).unwrap();
        assert!(matches!(
            index.merge(&index),
            Err(ActionError::InvalidOperation(_))
        ));
    }

    #[test]
    fn merge_overwrites_shared_keys() {
        let a = VectorIndex::new();
        a.add(Some("k".into()), vec![1.0, 0.0], attrs("old")).unwrap();
        a.add(Some("only-a".into()), vec![0.0, 1.0], Map::new()).unwrap();

        let b = VectorIndex::new();
        b.add(Some("k".into()), vec![0.5, 0.5], attrs("new")).unwrap();
        b.add(Some("only-b".into()), vec![0.2, 0.8], Map::new()).unwrap();

        a.merge(&b).unwrap();
        assert_eq!(a.len(), 3);

        let records = a.records();
        let k = records.iter().find(|r| r.key == "k").unwrap();
        assert_eq!(k.vector, vec![0.5, 0.5]);
        assert_eq!(k.attributes["action"], json!("new"));
    }

    #[test]
    fn merge_dimension_mismatch_fails() {
        let a = VectorIndex::new();
        a.add(None, vec![1.0, 0.0], Map::new()).unwrap();
        let b = VectorIndex::new();
        b.add(None, vec![1.0, 0.0, 0.0], Map::new()).unwrap();

        assert!(matches!(
            a.merge(&b),
            Err(ActionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn cosine_similarity_range() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
