//! In-memory ordered record set.
//!
//! Records live in insertion order in a single `Vec`; an auxiliary
//! `HashMap` maps each id to its position. Updates overwrite in place so a
//! record keeps its position for its whole lifetime, and position is only
//! ever used to break similarity ties.
//!
//! Vector search is brute-force cosine similarity over all stored vectors.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::embedding::{cosine_similarity, is_zero_norm};
use crate::models::Record;

use super::{QueryMatches, Snapshot, StoreError};

/// Ordered collection of [`Record`]s with a fixed embedding dimension.
#[derive(Debug, Clone)]
pub struct RecordSet {
    dims: usize,
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild a record set from a snapshot image.
    ///
    /// Fails if the three lists are misaligned, an id repeats, or any
    /// vector does not have `dims` components.
    pub fn from_snapshot(snapshot: Snapshot, dims: usize) -> Result<Self, StoreError> {
        let Snapshot {
            ids,
            texts,
            embeddings,
        } = snapshot;

        if ids.len() != texts.len() || ids.len() != embeddings.len() {
            return Err(StoreError::CorruptSnapshot(format!(
                "misaligned lists: {} ids, {} texts, {} embeddings",
                ids.len(),
                texts.len(),
                embeddings.len()
            )));
        }

        let mut set = Self::new(dims);
        for ((id, text), embedding) in ids.into_iter().zip(texts).zip(embeddings) {
            if embedding.len() != dims {
                return Err(StoreError::CorruptSnapshot(format!(
                    "'{}' has dimension {}, expected {}",
                    id,
                    embedding.len(),
                    dims
                )));
            }
            if set.index.contains_key(&id) {
                return Err(StoreError::CorruptSnapshot(format!("duplicate id '{}'", id)));
            }
            set.index.insert(id.clone(), set.records.len());
            set.records.push(Record {
                id,
                text,
                embedding,
            });
        }
        Ok(set)
    }

    /// Produce the lockstep on-disk image of this set.
    pub fn to_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            ids: Vec::with_capacity(self.records.len()),
            texts: Vec::with_capacity(self.records.len()),
            embeddings: Vec::with_capacity(self.records.len()),
        };
        for r in &self.records {
            snapshot.ids.push(r.id.clone());
            snapshot.texts.push(r.text.clone());
            snapshot.embeddings.push(r.embedding.clone());
        }
        snapshot
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    /// Insert or overwrite records in place.
    ///
    /// The whole batch is validated before anything is applied, so a
    /// rejected batch leaves the set untouched. A repeated id within one
    /// batch is applied in order: the last entry wins.
    pub fn upsert(
        &mut self,
        ids: &[String],
        texts: &[String],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        if ids.len() != texts.len() || ids.len() != embeddings.len() {
            return Err(StoreError::LengthMismatch {
                ids: ids.len(),
                texts: texts.len(),
                embeddings: embeddings.len(),
            });
        }
        for (id, embedding) in ids.iter().zip(embeddings) {
            if embedding.len() != self.dims {
                return Err(StoreError::DimensionMismatch {
                    id: id.clone(),
                    expected: self.dims,
                    actual: embedding.len(),
                });
            }
            if embedding.iter().any(|x| !x.is_finite()) {
                return Err(StoreError::NonFiniteEmbedding { id: id.clone() });
            }
        }

        for ((id, text), embedding) in ids.iter().zip(texts).zip(embeddings) {
            match self.index.get(id) {
                Some(&pos) => {
                    let record = &mut self.records[pos];
                    record.text = text.clone();
                    record.embedding = embedding.clone();
                }
                None => {
                    self.index.insert(id.clone(), self.records.len());
                    self.records
                        .push(Record::new(id.clone(), text.clone(), embedding.clone()));
                }
            }
        }
        Ok(())
    }

    /// Remove every record whose id is in `ids`. Absent ids are ignored.
    ///
    /// Returns the number of records removed.
    pub fn delete(&mut self, ids: &[String]) -> usize {
        let targets: HashSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.index.contains_key(*id))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let before = self.records.len();
        self.records.retain(|r| !targets.contains(r.id.as_str()));
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id.clone(), pos))
            .collect();
        before - self.records.len()
    }

    /// Rank stored records against each query vector.
    ///
    /// Returns one [`QueryMatches`] per query, holding the top
    /// `min(k, len)` records by descending cosine similarity, ties broken
    /// by ascending stored position. A zero-norm or wrong-dimension query
    /// yields an empty result. Stored vectors with undefined similarity
    /// (zero norm) rank after every defined similarity and report the
    /// distance of a fully opposite vector.
    pub fn query(&self, queries: &[Vec<f32>], k: usize) -> Vec<QueryMatches> {
        queries.iter().map(|q| self.query_one(q, k)).collect()
    }

    fn query_one(&self, query: &[f32], k: usize) -> QueryMatches {
        if self.records.is_empty() || k == 0 {
            return QueryMatches::default();
        }
        if query.len() != self.dims || is_zero_norm(query) {
            return QueryMatches::default();
        }

        let mut scored: Vec<(usize, Option<f32>)> = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, r)| (pos, cosine_similarity(query, &r.embedding)))
            .collect();
        scored.sort_by(|a, b| rank_order(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k.min(self.records.len()));

        let mut matches = QueryMatches::default();
        for (pos, sim) in scored {
            let record = &self.records[pos];
            matches.ids.push(record.id.clone());
            matches.texts.push(record.text.clone());
            matches.distances.push(1.0 - sim.unwrap_or(-1.0));
        }
        matches
    }
}

/// Descending similarity; undefined similarity sorts last.
fn rank_order(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
