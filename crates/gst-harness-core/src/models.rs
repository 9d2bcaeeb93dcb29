//! Core data models shared by the store, the ingestion pipeline and the
//! query router.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single indexed document.
///
/// `id` is the stable identity (the source filename), `text` is the
/// length-capped extracted body, and `embedding` has the dimension fixed
/// by the owning store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl Record {
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
        }
    }
}

/// The retrieval path(s) a query needs.
///
/// Computed per query and never persisted. [`QueryKind::Hybrid`] is the
/// safe superset: it runs both paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    /// Answerable from the invoice tables alone.
    #[serde(rename = "STRUCTURED_QUERY")]
    Structured,
    /// Answerable from the indexed rule documents alone.
    #[serde(rename = "UNSTRUCTURED_QUERY")]
    Unstructured,
    /// Needs tabular data and rule text together.
    #[serde(rename = "HYBRID_QUERY")]
    Hybrid,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [
        QueryKind::Structured,
        QueryKind::Unstructured,
        QueryKind::Hybrid,
    ];

    /// The category token the reasoning oracle is asked to emit.
    pub fn token(self) -> &'static str {
        match self {
            QueryKind::Structured => "STRUCTURED_QUERY",
            QueryKind::Unstructured => "UNSTRUCTURED_QUERY",
            QueryKind::Hybrid => "HYBRID_QUERY",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
