//! Reasoning oracle: prompt in, free text out.
//!
//! Classification, SQL generation, semantic answers and hybrid synthesis
//! all go through [`ReasoningClient`]. Output is untrusted text; callers
//! are responsible for interpreting it.

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ReasoningConfig;
use crate::error::{HarnessError, HarnessResult};

/// Sampling settings for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

impl GenerateOptions {
    /// Temperature pinned to 0 so identical input routes identically.
    pub fn deterministic(max_output_tokens: u32) -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: Some(max_output_tokens),
        }
    }

    /// Temperature 0 with no output budget.
    pub fn deterministic_unbounded() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: None,
        }
    }
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Generate text for `prompt`.
    ///
    /// Errors are reported as [`HarnessError::Synthesis`]; callers that
    /// need a different category (classification, structured queries)
    /// re-map them.
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> HarnessResult<String>;
}

/// A client that always fails.
///
/// With reasoning disabled every query classifies as hybrid and every
/// synthesis step surfaces an error.
pub struct DisabledReasoning;

#[async_trait]
impl ReasoningClient for DisabledReasoning {
    async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> HarnessResult<String> {
        Err(HarnessError::Synthesis(
            "reasoning provider is disabled".to_string(),
        ))
    }
}

/// Chat-completions client for an OpenAI-compatible API.
///
/// Sends the prompt as a single user message to
/// `POST {base_url}/chat/completions` and returns the first choice's
/// content, trimmed. Requires `OPENAI_API_KEY`.
pub struct OpenAIChatClient {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatClient {
    pub fn new(config: &ReasoningConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("reasoning.model required for OpenAI provider"))?;

        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(k) => k,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ReasoningClient for OpenAIChatClient {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> HarnessResult<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature,
        });
        if let Some(max) = options.max_output_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| HarnessError::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(HarnessError::Synthesis(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HarnessError::Synthesis(e.to_string()))?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> HarnessResult<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| {
            HarnessError::Synthesis("invalid response: missing choices[0].message.content".into())
        })
}

pub fn create_reasoning(config: &ReasoningConfig) -> anyhow::Result<Arc<dyn ReasoningClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledReasoning)),
        "openai" => Ok(Arc::new(OpenAIChatClient::new(config)?)),
        other => bail!("Unknown reasoning provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  HYBRID_QUERY\n" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "HYBRID_QUERY");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_chat_response(&json).is_err());
    }

    #[test]
    fn test_deterministic_pins_temperature() {
        let opts = GenerateOptions::deterministic(100);
        assert_eq!(opts.temperature, 0.0);
        assert_eq!(opts.max_output_tokens, Some(100));
    }
}
