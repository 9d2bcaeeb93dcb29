//! Query routing.
//!
//! Asks the reasoning oracle for a category and maps its reply onto
//! [`QueryKind`]. Any failure, timeout or ambiguous reply routes to
//! [`QueryKind::Hybrid`], which runs both retrieval paths.

use std::sync::Arc;
use std::time::Duration;

use gst_harness_core::classify::parse_classification;
use gst_harness_core::models::QueryKind;
use gst_harness_core::prompt::{classification_prompt, CLASSIFY_MAX_TOKENS};
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::reasoning::{GenerateOptions, ReasoningClient};

pub struct QueryClassifier {
    oracle: Arc<dyn ReasoningClient>,
    timeout: Duration,
}

impl QueryClassifier {
    pub fn new(oracle: Arc<dyn ReasoningClient>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Category for `query`. Never fails.
    pub async fn classify(&self, query: &str) -> QueryKind {
        match self.try_classify(query).await {
            Ok(kind) => {
                debug!(kind = %kind, "classified query");
                kind
            }
            Err(e) => {
                warn!(error = %e, "classification failed; routing as hybrid");
                QueryKind::Hybrid
            }
        }
    }

    async fn try_classify(&self, query: &str) -> HarnessResult<QueryKind> {
        let prompt = classification_prompt(query);
        let call = self
            .oracle
            .generate(&prompt, GenerateOptions::deterministic(CLASSIFY_MAX_TOKENS));

        let output = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| HarnessError::Timeout {
                what: "query classification".to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| HarnessError::Classification(e.to_string()))?;

        parse_classification(&output).ok_or_else(|| {
            HarnessError::Classification(format!("no single category in reply: {:?}", output))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::DisabledReasoning;
    use async_trait::async_trait;

    struct Canned(&'static str);

    #[async_trait]
    impl ReasoningClient for Canned {
        async fn generate(&self, _prompt: &str, options: GenerateOptions) -> HarnessResult<String> {
            assert_eq!(options.temperature, 0.0);
            assert_eq!(options.max_output_tokens, Some(CLASSIFY_MAX_TOKENS));
            Ok(self.0.to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl ReasoningClient for Slow {
        async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> HarnessResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("STRUCTURED_QUERY".to_string())
        }
    }

    fn classifier(oracle: impl ReasoningClient + 'static) -> QueryClassifier {
        QueryClassifier::new(Arc::new(oracle), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_token_inside_prose() {
        let c = classifier(Canned("I believe this is a STRUCTURED_QUERY case"));
        assert_eq!(c.classify("total tax in March").await, QueryKind::Structured);
    }

    #[tokio::test]
    async fn test_unknown_reply_is_hybrid() {
        let c = classifier(Canned("not sure"));
        assert_eq!(c.classify("q").await, QueryKind::Hybrid);
    }

    #[tokio::test]
    async fn test_two_categories_is_hybrid() {
        let c = classifier(Canned("STRUCTURED_QUERY or UNSTRUCTURED_QUERY"));
        assert_eq!(c.classify("q").await, QueryKind::Hybrid);
    }

    #[tokio::test]
    async fn test_oracle_error_is_hybrid() {
        let c = classifier(DisabledReasoning);
        assert_eq!(c.classify("q").await, QueryKind::Hybrid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_hybrid() {
        let c = QueryClassifier::new(Arc::new(Slow), Duration::from_secs(1));
        assert_eq!(c.classify("q").await, QueryKind::Hybrid);
    }
}
