//! Record storage for GST Harness.
//!
//! [`RecordSet`] is the in-memory ordered collection every durable store
//! is built on: one `Vec` of [`Record`]s addressed through an id → position
//! index, with brute-force cosine ranking. [`Snapshot`] is the complete
//! serialized image written to disk after every mutation.
//!
//! Persistence, locking and atomic replacement belong to the app crate.

pub mod memory;

pub use memory::RecordSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by record-set mutations and snapshot decoding.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upsert arrays differ in length: {ids} ids, {texts} texts, {embeddings} embeddings")]
    LengthMismatch {
        ids: usize,
        texts: usize,
        embeddings: usize,
    },
    #[error("embedding for '{id}' has dimension {actual}, store expects {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
    #[error("embedding for '{id}' contains a non-finite component")]
    NonFiniteEmbedding { id: String },
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

/// Ranked matches for one query vector.
///
/// The three lists are aligned by rank. `distances` holds `1 - similarity`,
/// so smaller is closer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryMatches {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub distances: Vec<f32>,
}

impl QueryMatches {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// On-disk image of a store.
///
/// Three lists kept in lockstep by position. There is no version tag;
/// a format change means rebuilding from the source documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
}

impl Snapshot {
    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptSnapshot(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::CorruptSnapshot(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_shape() {
        let snap = Snapshot {
            ids: vec!["a.txt".to_string()],
            texts: vec!["rule".to_string()],
            embeddings: vec![vec![1.0, 0.0]],
        };
        let json: serde_json::Value = serde_json::from_slice(&snap.to_json().unwrap()).unwrap();
        assert_eq!(json["ids"][0], "a.txt");
        assert_eq!(json["texts"][0], "rule");
        assert_eq!(json["embeddings"][0][0], 1.0);
    }

    #[test]
    fn test_snapshot_garbage_is_corrupt() {
        let err = Snapshot::from_json(b"\x80\x04not json").unwrap_err();
        assert!(matches!(err, StoreError::CorruptSnapshot(_)));
    }
}
