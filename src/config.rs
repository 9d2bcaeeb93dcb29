//! TOML configuration for GST Harness.
//!
//! Every component is described here and constructed from it by the
//! binary. Optional sections fall back to their `Default` impls; a
//! disabled provider makes its collaborator fail fast instead of calling
//! out.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub structured: StructuredConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Snapshot file, rewritten after every mutation.
    pub path: PathBuf,
    /// Embedding dimension shared by every record.
    pub dims: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    pub dir: PathBuf,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_max_chars() -> usize {
    50_000
}
fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_file_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReasoningConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_reasoning_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            timeout_secs: default_reasoning_timeout_secs(),
        }
    }
}

impl ReasoningConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_reasoning_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StructuredConfig {
    /// SQLite database holding the invoice tables. Absent → structured
    /// path disabled.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Schema description shown to the query generator. Defaults to the
    /// invoice/line-item layout.
    #[serde(default)]
    pub schema: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.store.dims == 0 {
        anyhow::bail!("store.dims must be > 0");
    }

    if config.watch.max_chars == 0 {
        anyhow::bail!("watch.max_chars must be > 0");
    }

    if config.watch.file_timeout_secs == 0 {
        anyhow::bail!("watch.file_timeout_secs must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    for (section, provider, model) in [
        (
            "embedding",
            &config.embedding.provider,
            &config.embedding.model,
        ),
        (
            "reasoning",
            &config.reasoning.provider,
            &config.reasoning.model,
        ),
    ] {
        match provider.as_str() {
            "disabled" => {}
            "openai" => {
                if model.is_none() {
                    anyhow::bail!(
                        "{}.model must be specified when provider is '{}'",
                        section,
                        provider
                    );
                }
            }
            other => anyhow::bail!(
                "Unknown {} provider: '{}'. Must be disabled or openai.",
                section,
                other
            ),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[store]
path = "./data/store.json"
dims = 8

[watch]
dir = "./gst_docs"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.store.dims, 8);
        assert_eq!(config.watch.max_chars, 50_000);
        assert_eq!(config.watch.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.retrieval.top_k, 3);
        assert!(!config.embedding.is_enabled());
        assert!(!config.reasoning.is_enabled());
        assert!(config.structured.db_path.is_none());
    }

    #[test]
    fn test_rejects_zero_dims() {
        let content = MINIMAL.replace("dims = 8", "dims = 0");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_enabled_provider_requires_model() {
        let content = format!("{}\n[reasoning]\nprovider = \"openai\"\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("reasoning.model"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let content = format!("{}\n[embedding]\nprovider = \"gemini\"\n", MINIMAL);
        assert!(parse_config(&content).is_err());
    }
}
