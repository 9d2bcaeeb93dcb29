//! Error taxonomy for the harness.
//!
//! Ingestion swallows `Extraction`, `Embedding` and `Timeout` per file and
//! keeps going. The classifier converts `Classification` into the hybrid
//! default. `StructuredQuery` and `Synthesis` reach the caller.

use gst_harness_core::store::StoreError;
use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("extraction failed for '{id}': {reason}")]
    Extraction { id: String, reason: String },
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("classification failed: {0}")]
    Classification(String),
    #[error("structured query failed: {0}")]
    StructuredQuery(String),
    #[error("answer synthesis failed: {0}")]
    Synthesis(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn extraction(id: &str, err: ExtractError) -> Self {
        HarnessError::Extraction {
            id: id.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
