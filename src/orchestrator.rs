//! Query answering: classify, then route to the structured path, the
//! semantic path, or both.
//!
//! ```text
//! query ─▶ QueryClassifier ─┬─ STRUCTURED ───▶ StructuredQueryEngine (with summary)
//!                           ├─ UNSTRUCTURED ─▶ embed ─▶ VectorStore ─▶ ReasoningClient
//!                           └─ HYBRID ───────▶ both concurrently ─▶ ReasoningClient
//! ```
//!
//! The store is only read here. Structured and synthesis failures are
//! returned to the caller; nothing is guessed.

use std::sync::Arc;

use gst_harness_core::models::QueryKind;
use gst_harness_core::prompt::{
    hybrid_prompt, join_context, semantic_answer_prompt, ANSWER_MAX_TOKENS, HYBRID_MAX_TOKENS,
    NO_DATA,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::classifier::QueryClassifier;
use crate::embedding::{embed_or_zero, EmbeddingProvider};
use crate::error::{HarnessError, HarnessResult};
use crate::reasoning::{GenerateOptions, ReasoningClient};
use crate::store::VectorStore;
use crate::structured::{StructuredAnswer, StructuredQueryEngine};

/// Result of the semantic path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticAnswer {
    /// Retrieved passages joined in rank order, or the no-context sentinel.
    pub context: String,
    pub answer: String,
}

/// Result of the combined path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridAnalysis {
    pub generated_query: String,
    pub context: String,
    pub conclusion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Structured(StructuredAnswer),
    Unstructured(SemanticAnswer),
    Hybrid(HybridAnalysis),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub query_type: QueryKind,
    pub result: QueryResult,
}

pub struct Orchestrator {
    classifier: QueryClassifier,
    structured: Arc<dyn StructuredQueryEngine>,
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reasoning: Arc<dyn ReasoningClient>,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        classifier: QueryClassifier,
        structured: Arc<dyn StructuredQueryEngine>,
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reasoning: Arc<dyn ReasoningClient>,
        top_k: usize,
    ) -> Self {
        Self {
            classifier,
            structured,
            store,
            embedder,
            reasoning,
            top_k: top_k.max(1),
        }
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    /// Classify `query` and answer it along the chosen path.
    pub async fn process(&self, query: &str) -> HarnessResult<QueryResponse> {
        let kind = self.classifier.classify(query).await;
        info!(kind = %kind, "routing query");
        self.route(kind, query).await
    }

    /// Answer `query` along an already chosen path.
    pub async fn route(&self, kind: QueryKind, query: &str) -> HarnessResult<QueryResponse> {
        let result = match kind {
            QueryKind::Structured => QueryResult::Structured(self.structured.answer(query, true).await?),
            QueryKind::Unstructured => QueryResult::Unstructured(self.semantic(query).await?),
            QueryKind::Hybrid => QueryResult::Hybrid(self.hybrid(query).await?),
        };
        Ok(QueryResponse {
            query_type: kind,
            result,
        })
    }

    /// Top-k passages for `query`, joined into one context string.
    pub async fn retrieve_context(&self, query: &str) -> String {
        let query_vec = embed_or_zero(self.embedder.as_ref(), &[query.to_string()]).await;
        let texts = self
            .store
            .query(&query_vec, self.top_k)
            .into_iter()
            .next()
            .map(|m| m.texts)
            .unwrap_or_default();
        debug!(passages = texts.len(), "retrieved context");
        join_context(&texts)
    }

    pub async fn semantic(&self, query: &str) -> HarnessResult<SemanticAnswer> {
        let context = self.retrieve_context(query).await;
        let prompt = semantic_answer_prompt(&context, query);
        let answer = self
            .reasoning
            .generate(&prompt, GenerateOptions::deterministic(ANSWER_MAX_TOKENS))
            .await
            .map_err(as_synthesis)?;
        Ok(SemanticAnswer { context, answer })
    }

    pub async fn hybrid(&self, query: &str) -> HarnessResult<HybridAnalysis> {
        let (structured, semantic) =
            tokio::join!(self.structured.answer(query, false), self.semantic(query));
        let structured = structured?;
        let semantic = semantic?;

        let data = if structured.rows.is_empty() {
            NO_DATA.to_string()
        } else {
            serde_json::to_string(&structured.rows)
                .map_err(|e| HarnessError::Synthesis(e.to_string()))?
        };

        let prompt = hybrid_prompt(
            query,
            &structured.generated_query,
            &data,
            &semantic.context,
            &semantic.answer,
        );
        let conclusion = self
            .reasoning
            .generate(&prompt, GenerateOptions::deterministic(HYBRID_MAX_TOKENS))
            .await
            .map_err(as_synthesis)?;

        Ok(HybridAnalysis {
            generated_query: structured.generated_query,
            context: semantic.context,
            conclusion,
        })
    }
}

fn as_synthesis(e: HarnessError) -> HarnessError {
    match e {
        HarnessError::Synthesis(_) => e,
        other => HarnessError::Synthesis(other.to_string()),
    }
}
