//! Ingestion pipeline: keeps the vector store in sync with a directory.
//!
//! ```text
//! watched dir ──notify──▶ FileChange ──▶ read ─▶ extract ─▶ truncate ─▶ embed ─▶ upsert
//!                                   └──────────────────────────────────────────▶ delete
//! ```
//!
//! On start the pipeline subscribes to the directory first, then runs a
//! full scan that treats every regular file as a create, then drains
//! change notifications until cancelled. Events that arrive during the
//! scan are queued and applied afterwards; re-ingesting a file is
//! idempotent.
//!
//! Every file is handled in isolation. Extraction, embedding and timeout
//! failures are logged and the file is skipped; nothing is retried until
//! the file changes again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gst_harness_core::embedding::zero_vector;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::connector_fs::{doc_id_for, scan_directory, FileFilter};
use crate::embedding::{embed_or_zero, EmbeddingProvider};
use crate::error::{HarnessError, HarnessResult};
use crate::extract::{content_type_for, TextExtractor};
use crate::store::VectorStore;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub dir: PathBuf,
    /// Extracted text is cut to this many characters before embedding.
    pub max_chars: usize,
    /// Larger files are skipped without being read into the extractor.
    pub max_file_bytes: u64,
    /// Bound on one file's read → extract → embed → upsert chain.
    pub file_timeout: Duration,
    pub exclude_globs: Vec<String>,
}

impl PipelineSettings {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            max_chars: config.max_chars,
            max_file_bytes: config.max_file_bytes,
            file_timeout: Duration::from_secs(config.file_timeout_secs),
            exclude_globs: config.exclude_globs.clone(),
        }
    }
}

/// A change to apply to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// (Re-)index the file at this path.
    Upsert(PathBuf),
    /// Drop the record with this id.
    Remove(String),
}

impl FileChange {
    fn id(&self) -> Option<String> {
        match self {
            FileChange::Upsert(path) => doc_id_for(path),
            FileChange::Remove(id) => Some(id.clone()),
        }
    }
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed {
        id: String,
        chars: usize,
        truncated: bool,
    },
    /// Nothing to index (empty extraction, not a regular file, ignored name).
    Skipped { id: String, reason: String },
}

/// Counts from the startup scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct IngestionPipeline {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn TextExtractor>,
    settings: PipelineSettings,
    filter: FileFilter,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn TextExtractor>,
        settings: PipelineSettings,
    ) -> anyhow::Result<Self> {
        let filter = FileFilter::new(&settings.exclude_globs)?;
        Ok(Self {
            store,
            embedder,
            extractor,
            settings,
            filter,
        })
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Scan once, then apply directory changes until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let dir = &self.settings.dir;
        std::fs::create_dir_all(dir)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // Receiver gone means the loop has stopped.
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(
            dir = %dir.display(),
            model = self.embedder.model_name(),
            dims = self.embedder.dims(),
            "watching directory"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("ingestion cancelled during initial scan");
                return Ok(());
            }
            report = self.initial_scan() => {
                info!(
                    ingested = report.ingested,
                    skipped = report.skipped,
                    failed = report.failed,
                    "initial scan complete"
                );
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("ingestion stopped");
                    break;
                }
                msg = rx.recv() => {
                    let Some(first) = msg else {
                        warn!("watcher channel closed; stopping ingestion");
                        break;
                    };
                    let mut batch = vec![first];
                    while let Ok(next) = rx.try_recv() {
                        batch.push(next);
                    }

                    let mut changes = Vec::new();
                    for res in batch {
                        match res {
                            Ok(event) => changes.extend(changes_from_event(&event)),
                            Err(e) => warn!(error = %e, "watch error"),
                        }
                    }
                    if !self.apply_batch(coalesce(changes), &cancel).await {
                        info!("ingestion stopped");
                        break;
                    }
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    /// Treat every regular file in the directory as newly created.
    pub async fn initial_scan(&self) -> ScanReport {
        let mut report = ScanReport::default();
        let files = match scan_directory(&self.settings.dir, &self.filter) {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.settings.dir.display(), error = %e, "initial scan failed");
                return report;
            }
        };
        info!(dir = %self.settings.dir.display(), files = files.len(), "starting initial scan");

        for path in files {
            match self.ingest_with_timeout(&path).await {
                Ok(IngestOutcome::Indexed { .. }) => report.ingested += 1,
                Ok(IngestOutcome::Skipped { .. }) => report.skipped += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// Apply changes in order until `cancel` fires.
    ///
    /// A change in flight when the token fires is dropped at its next await
    /// point. Store writes are atomic, so the record is either fully
    /// replaced or untouched. Returns `false` if cancelled.
    async fn apply_batch(&self, changes: Vec<FileChange>, cancel: &CancellationToken) -> bool {
        for change in changes {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = self.apply(change) => {}
            }
        }
        !cancel.is_cancelled()
    }

    /// Apply one change, logging instead of failing.
    ///
    /// Returns `true` if the change was applied or was a no-op.
    pub async fn apply(&self, change: FileChange) -> bool {
        let Some(id) = change.id() else {
            return true;
        };
        if self.filter.is_ignored(&id) {
            debug!(id = %id, "ignoring transient file");
            return true;
        }

        match change {
            FileChange::Upsert(path) => self.ingest_with_timeout(&path).await.is_ok(),
            FileChange::Remove(id) => match self.remove(&id).await {
                Ok(removed) => {
                    if removed > 0 {
                        info!(id = %id, "removed document");
                    } else {
                        debug!(id = %id, "delete for unknown document");
                    }
                    true
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "failed to remove document");
                    false
                }
            },
        }
    }

    /// Read, extract, embed and upsert one file.
    pub async fn ingest_file(&self, path: &Path) -> HarnessResult<IngestOutcome> {
        let id = doc_id_for(path).ok_or_else(|| HarnessError::Extraction {
            id: path.display().to_string(),
            reason: "path has no file name".to_string(),
        })?;

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(IngestOutcome::Skipped {
                    id,
                    reason: "file no longer exists".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(IngestOutcome::Skipped {
                id,
                reason: "not a regular file".to_string(),
            });
        }
        if metadata.len() > self.settings.max_file_bytes {
            return Err(HarnessError::Extraction {
                id,
                reason: format!(
                    "file is {} bytes, limit is {}",
                    metadata.len(),
                    self.settings.max_file_bytes
                ),
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let content_type = content_type_for(path);
        debug!(id = %id, content_type = %content_type, bytes = bytes.len(), "extracting");

        let text = self
            .extractor
            .extract(&bytes, &content_type)
            .await
            .map_err(|e| HarnessError::extraction(&id, e))?;

        self.ingest_text(&id, &text).await
    }

    /// Truncate, embed and upsert text under `id`.
    ///
    /// Blank text is skipped without touching the store.
    pub async fn ingest_text(&self, id: &str, text: &str) -> HarnessResult<IngestOutcome> {
        if text.trim().is_empty() {
            return Ok(IngestOutcome::Skipped {
                id: id.to_string(),
                reason: "extraction produced no text".to_string(),
            });
        }

        let (text, truncated) = truncate_chars(text, self.settings.max_chars);
        if truncated {
            warn!(id = %id, max_chars = self.settings.max_chars, "content too large; truncated");
        }

        let embedding = embed_or_zero(self.embedder.as_ref(), &[text.to_string()])
            .await
            .pop()
            .unwrap_or_else(|| zero_vector(self.embedder.dims()));

        let (record_id, record_text) = (id.to_string(), text.to_string());
        self.with_store(move |store| store.upsert_one(&record_id, &record_text, embedding))
            .await?;

        let chars = text.chars().count();
        info!(id = %id, chars, truncated, "ingested document");
        Ok(IngestOutcome::Indexed {
            id: id.to_string(),
            chars,
            truncated,
        })
    }

    /// Drop the record for `id`. Unknown ids are a no-op.
    pub async fn remove(&self, id: &str) -> HarnessResult<usize> {
        let ids = vec![id.to_string()];
        self.with_store(move |store| store.delete(&ids)).await
    }

    /// Run a store mutation on the blocking pool; snapshot writes fsync.
    async fn with_store<T, F>(&self, f: F) -> HarnessResult<T>
    where
        F: FnOnce(&VectorStore) -> HarnessResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| HarnessError::Io(std::io::Error::other(e)))?
    }

    async fn ingest_with_timeout(&self, path: &Path) -> HarnessResult<IngestOutcome> {
        let secs = self.settings.file_timeout.as_secs();
        let result = match tokio::time::timeout(self.settings.file_timeout, self.ingest_file(path))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Timeout {
                what: format!("ingesting {}", path.display()),
                secs,
            }),
        };

        match &result {
            Ok(IngestOutcome::Skipped { id, reason }) => {
                info!(id = %id, reason = %reason, "skipped file");
            }
            Ok(IngestOutcome::Indexed { .. }) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to ingest file"),
        }
        result
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Translate a filesystem notification into store changes.
///
/// Renames become a removal of the old name and an upsert of the new one.
/// Access events and events without a usable filename produce nothing.
pub fn changes_from_event(event: &notify::Event) -> Vec<FileChange> {
    let upserts = || {
        event
            .paths
            .iter()
            .map(|p| FileChange::Upsert(p.clone()))
            .collect::<Vec<_>>()
    };
    let removals = || {
        event
            .paths
            .iter()
            .filter_map(|p| doc_id_for(p))
            .map(FileChange::Remove)
            .collect::<Vec<_>>()
    };

    match &event.kind {
        EventKind::Create(_) => upserts(),
        EventKind::Remove(_) => removals(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => removals(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => upserts(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => doc_id_for(from)
                .map(FileChange::Remove)
                .into_iter()
                .chain(std::iter::once(FileChange::Upsert(to.clone())))
                .collect(),
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter_map(|p| {
                if p.exists() {
                    Some(FileChange::Upsert(p.clone()))
                } else {
                    doc_id_for(p).map(FileChange::Remove)
                }
            })
            .collect(),
        EventKind::Modify(_) => upserts(),
        _ => Vec::new(),
    }
}

/// Keep only the last change per document id, in order of that last change.
fn coalesce(changes: Vec<FileChange>) -> Vec<FileChange> {
    let mut last: HashMap<String, usize> = HashMap::new();
    for (i, change) in changes.iter().enumerate() {
        if let Some(id) = change.id() {
            last.insert(id, i);
        }
    }
    changes
        .into_iter()
        .enumerate()
        .filter(|(i, change)| change.id().and_then(|id| last.get(&id)) == Some(i))
        .map(|(_, change)| change)
        .collect()
}
