//! Embedding providers.
//!
//! All providers speak the same [`Embedder`] contract; the concrete one is chosen
//! from [`EmbedderConfig::provider`] by [`create_embedder`].

mod ollama;
mod openai;

pub use ollama::OllamaEmbedder;
pub use openai::{OpenAiCompatibleEmbedder, OpenAiEmbedder};

use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Known output sizes of common embedding models
const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
    ("nomic-embed-text", 768),
    ("nomic-embed-code", 3584),
    ("mxbai-embed-large", 1024),
    ("all-minilm", 384),
    ("bge-m3", 1024),
];

#[must_use]
pub fn model_dimension(model: &str) -> Option<usize> {
    let base = model.split(':').next().unwrap_or(model);
    MODEL_DIMENSIONS
        .iter()
        .find(|(name, _)| *name == base)
        .map(|(_, dim)| *dim)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmbedderProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    #[serde(rename = "ollama")]
    Ollama,
}

impl EmbedderProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenAiCompatible => "openai-compatible",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub provider: EmbedderProvider,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Overrides the built-in model dimension table
    pub dimension: Option<usize>,
}

impl EmbedderConfig {
    #[must_use]
    pub fn model_id(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) if !model.trim().is_empty() => model.as_str(),
            (_, EmbedderProvider::Ollama) => DEFAULT_OLLAMA_MODEL,
            _ => DEFAULT_OPENAI_MODEL,
        }
    }

    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.or_else(|| model_dimension(self.model_id()))
    }

    /// Whether every field the provider needs is present
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        let fields = match self.provider {
            EmbedderProvider::OpenAi => present(&self.api_key),
            EmbedderProvider::OpenAiCompatible => present(&self.api_key) && present(&self.base_url),
            EmbedderProvider::Ollama => true,
        };
        fields && self.dimension().is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EmbeddingUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub usage: Option<EmbeddingUsage>,
}

/// Turns texts into vectors. Implementations are shared across the scanner,
/// watcher and search service of one workspace.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts` in one request. Rate limiting surfaces as
    /// [`VectorStoreError::RateLimited`] so callers can back off and retry.
    async fn create_embeddings(&self, texts: &[String], model: Option<&str>) -> Result<EmbeddingResponse>;

    fn model_id(&self) -> &str;
}

/// Build the embedder selected by `config`.
pub fn create_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    let model = config.model_id().to_string();
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbedderProvider::OpenAi => {
            let api_key = required(config.api_key.as_deref(), "OpenAI API key")?;
            Arc::new(OpenAiEmbedder::new(api_key, model)?)
        }
        EmbedderProvider::OpenAiCompatible => {
            let base_url = required(config.base_url.as_deref(), "OpenAI-compatible base URL")?;
            let api_key = required(config.api_key.as_deref(), "OpenAI-compatible API key")?;
            Arc::new(OpenAiCompatibleEmbedder::new(base_url, api_key, model)?)
        }
        EmbedderProvider::Ollama => {
            let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            Arc::new(OllamaEmbedder::new(base_url, model)?)
        }
    };
    log::info!(
        "Embedder: {} ({})",
        config.provider.as_str(),
        embedder.model_id()
    );
    Ok(embedder)
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| VectorStoreError::Configuration(format!("{what} is required")))
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("codeindex/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(VectorStoreError::from)
}
