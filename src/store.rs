//! Durable vector store backed by a JSON snapshot file.
//!
//! Wraps a core [`RecordSet`] and rewrites the complete [`Snapshot`] after
//! every mutation, before the call returns.
//!
//! # Concurrency
//!
//! Mutations are serialized by a writer mutex. Each one clones the current
//! record set under a short read lock, applies the change to the private
//! copy, writes that copy to disk with no record lock held, and only then
//! publishes it under a short write lock. Queries take the read lock only,
//! so they never wait on disk I/O and never see a half-applied batch.
//!
//! # Durability
//!
//! The snapshot is written to a temporary file in the same directory,
//! fsynced, and renamed over the old one, so a reader of the file sees
//! either the previous image or the new one.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};

use gst_harness_core::models::Record;
use gst_harness_core::store::{QueryMatches, RecordSet, Snapshot};
use tracing::{debug, error, info};

use crate::error::{HarnessError, HarnessResult};

pub struct VectorStore {
    path: PathBuf,
    records: RwLock<RecordSet>,
    writer: Mutex<()>,
}

impl VectorStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt
    /// snapshot is logged and replaced by an empty store; the next
    /// mutation overwrites it.
    pub fn load(path: impl Into<PathBuf>, dims: usize) -> Self {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => match Snapshot::from_json(&bytes)
                .and_then(|snap| RecordSet::from_snapshot(snap, dims))
            {
                Ok(set) => {
                    info!(
                        path = %path.display(),
                        documents = set.len(),
                        "loaded vector store"
                    );
                    set
                }
                Err(e) => {
                    error!(
                        path = %path.display(),
                        error = %e,
                        "vector store snapshot is corrupt; starting empty"
                    );
                    RecordSet::new(dims)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "created new vector store");
                RecordSet::new(dims)
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "failed to read vector store snapshot; starting empty"
                );
                RecordSet::new(dims)
            }
        };

        Self {
            path,
            records: RwLock::new(records),
            writer: Mutex::new(()),
        }
    }

    /// Insert or overwrite records, then persist.
    ///
    /// `ids`, `texts` and `embeddings` must have equal length and every
    /// embedding must match [`dims`](Self::dims). On any error the
    /// published store is unchanged.
    pub fn upsert(
        &self,
        ids: &[String],
        texts: &[String],
        embeddings: &[Vec<f32>],
    ) -> HarnessResult<()> {
        self.mutate(|set| {
            set.upsert(ids, texts, embeddings)?;
            Ok(true)
        })?;
        debug!(count = ids.len(), "upserted records");
        Ok(())
    }

    /// Convenience wrapper for a single record.
    pub fn upsert_one(&self, id: &str, text: &str, embedding: Vec<f32>) -> HarnessResult<()> {
        self.upsert(&[id.to_string()], &[text.to_string()], &[embedding])
    }

    /// Remove records by id, then persist. Absent ids are a no-op.
    ///
    /// Returns the number of records removed.
    pub fn delete(&self, ids: &[String]) -> HarnessResult<usize> {
        let mut removed = 0;
        self.mutate(|set| {
            removed = set.delete(ids);
            Ok(removed > 0)
        })?;
        Ok(removed)
    }

    /// Cosine-rank the stored records against each query vector.
    ///
    /// Never fails: an empty store or a degenerate query vector yields
    /// empty matches.
    pub fn query(&self, query_embeddings: &[Vec<f32>], k: usize) -> Vec<QueryMatches> {
        self.read().query(query_embeddings, k)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn dims(&self) -> usize {
        self.read().dims()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.read().get(id).cloned()
    }

    /// Ids in stored order.
    pub fn ids(&self) -> Vec<String> {
        self.read().records().iter().map(|r| r.id.clone()).collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, RecordSet> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to a private copy; persist and publish if it reports a change.
    fn mutate<F>(&self, f: F) -> HarnessResult<()>
    where
        F: FnOnce(&mut RecordSet) -> HarnessResult<bool>,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = self.read().clone();
        if !f(&mut next)? {
            return Ok(());
        }

        write_snapshot(&self.path, &next.to_snapshot())?;

        *self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> HarnessResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let bytes = snapshot.to_json()?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| HarnessError::Io(e.error))?;

    debug!(path = %path.display(), documents = snapshot.len(), "saved vector store");
    Ok(())
}
