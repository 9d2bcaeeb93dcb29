//! Turning document and query text into vectors.
//!
//! [`embed_or_zero`] is the only entry point the pipeline and the query
//! path use. It never fails: an item the provider cannot embed (call
//! error, missing result, wrong dimension, non-finite values) becomes a
//! zero vector of the store dimension. Such a record ranks last in every
//! query until its file changes and is embedded again.
//!
//! [`OpenAIProvider`] retries 429s, 5xx responses and transport errors
//! with doubling delays (1s up to 32s); any other 4xx fails the batch at
//! once.

use anyhow::bail;
use async_trait::async_trait;
use gst_harness_core::embedding::zero_vector;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::{HarnessError, HarnessResult};

/// Ordered batch of texts in, one vector per text out, same order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Must equal the store dimension.
    fn dims(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> HarnessResult<Vec<Vec<f32>>>;
}

/// Embed `texts`, substituting a zero vector for every item that fails.
///
/// The result always has `texts.len()` vectors of `provider.dims()`
/// components.
pub async fn embed_or_zero(provider: &dyn EmbeddingProvider, texts: &[String]) -> Vec<Vec<f32>> {
    let dims = provider.dims();
    if texts.is_empty() {
        return Vec::new();
    }

    let vectors = match provider.embed(texts).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, count = texts.len(), "embedding failed; using zero vectors");
            return texts.iter().map(|_| zero_vector(dims)).collect();
        }
    };

    if vectors.len() != texts.len() {
        warn!(
            expected = texts.len(),
            got = vectors.len(),
            "embedding provider returned wrong count; using zero vectors"
        );
        return texts.iter().map(|_| zero_vector(dims)).collect();
    }

    vectors
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            if v.len() != dims || v.iter().any(|x| !x.is_finite()) {
                warn!(
                    item = i,
                    expected = dims,
                    got = v.len(),
                    "embedding has wrong dimension or non-finite values; using zero vector"
                );
                zero_vector(dims)
            } else {
                v
            }
        })
        .collect()
}

/// A provider that always fails.
///
/// Used when `embedding.provider = "disabled"`. Ingestion still indexes
/// text, but with zero vectors, so semantic search returns nothing useful
/// until a real provider is configured and the files are touched again.
pub struct DisabledProvider {
    dims: usize,
}

impl DisabledProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _texts: &[String]) -> HarnessResult<Vec<Vec<f32>>> {
        Err(HarnessError::Embedding(
            "embedding provider is disabled".to_string(),
        ))
    }
}

/// `POST {base_url}/embeddings` against an OpenAI-compatible API, keyed by
/// `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Fails when `embedding.model` or `OPENAI_API_KEY` is missing.
    pub fn new(config: &EmbeddingConfig, dims: usize) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;

        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(k) => k,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client,
        })
    }

    /// Send one batch with retry/backoff.
    async fn embed_batch(&self, texts: &[String]) -> HarnessResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| HarnessError::Embedding(e.to_string()))?;
                        return parse_openai_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = HarnessError::Embedding(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    ));

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(HarnessError::Embedding(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            HarnessError::Embedding("embedding failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> HarnessResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

/// Parse the embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays and orders them by `data[].index`
/// so the output matches input order.
fn parse_openai_response(json: &serde_json::Value) -> HarnessResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            HarnessError::Embedding("invalid response: missing data array".to_string())
        })?;

    let mut indexed = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                HarnessError::Embedding("invalid response: missing embedding".to_string())
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).unwrap_or(f32::NAN))
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Provider named by `embedding.provider` (`disabled` or `openai`).
pub fn create_provider(
    config: &EmbeddingConfig,
    dims: usize,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider::new(dims))),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config, dims)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        dims: usize,
        output: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, _texts: &[String]) -> HarnessResult<Vec<Vec<f32>>> {
            Ok(self.output.clone())
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[tokio::test]
    async fn test_disabled_degrades_to_zero_vectors() {
        let provider = DisabledProvider::new(4);
        let out = embed_or_zero(&provider, &texts(2)).await;
        assert_eq!(out, vec![vec![0.0; 4], vec![0.0; 4]]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_item_is_zeroed() {
        let provider = FixedProvider {
            dims: 2,
            output: vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]],
        };
        let out = embed_or_zero(&provider, &texts(2)).await;
        assert_eq!(out, vec![vec![1.0, 2.0], vec![0.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_wrong_count_zeroes_everything() {
        let provider = FixedProvider {
            dims: 2,
            output: vec![vec![1.0, 2.0]],
        };
        let out = embed_or_zero(&provider, &texts(3)).await;
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v == &vec![0.0, 0.0]));
    }

    #[tokio::test]
    async fn test_non_finite_item_is_zeroed() {
        let provider = FixedProvider {
            dims: 2,
            output: vec![vec![f32::NAN, 1.0]],
        };
        let out = embed_or_zero(&provider, &texts(1)).await;
        assert_eq!(out, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_parse_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let out = parse_openai_response(&json).unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_missing_data_is_error() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_openai_response(&json).is_err());
    }
}
