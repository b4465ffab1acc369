use super::{http_client, Embedder, EmbeddingResponse, EmbeddingUsage};
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
}

/// `/embeddings` endpoint shared by OpenAI and compatible servers.
#[derive(Debug, Clone)]
struct EmbeddingsEndpoint {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl EmbeddingsEndpoint {
    fn new(base_url: &str, api_key: &str, model: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model,
        })
    }

    async fn embed(&self, texts: &[String], model: Option<&str>) -> Result<EmbeddingResponse> {
        if texts.is_empty() {
            return Ok(EmbeddingResponse::default());
        }
        let request = EmbeddingRequest {
            input: texts,
            model: model.unwrap_or(&self.model),
            encoding_format: "float",
        };
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                VectorStoreError::RateLimited(message)
            } else {
                VectorStoreError::EmbeddingError(format!("HTTP {status}: {message}"))
            });
        }

        let mut parsed: OpenAiResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        log::debug!("Embedded {} texts via {}", texts.len(), self.url);
        Ok(EmbeddingResponse {
            embeddings: parsed.data.into_iter().map(|d| d.embedding).collect(),
            usage: parsed.usage,
        })
    }
}

/// Hosted OpenAI embeddings.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    endpoint: EmbeddingsEndpoint,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, model: String) -> Result<Self> {
        Ok(Self {
            endpoint: EmbeddingsEndpoint::new(OPENAI_API_BASE, api_key, model)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn create_embeddings(&self, texts: &[String], model: Option<&str>) -> Result<EmbeddingResponse> {
        self.endpoint.embed(texts, model).await
    }

    fn model_id(&self) -> &str {
        &self.endpoint.model
    }
}

/// Any server exposing the OpenAI embeddings API at a custom base URL.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleEmbedder {
    endpoint: EmbeddingsEndpoint,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: String) -> Result<Self> {
        Ok(Self {
            endpoint: EmbeddingsEndpoint::new(base_url, api_key, model)?,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.endpoint.url
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    async fn create_embeddings(&self, texts: &[String], model: Option<&str>) -> Result<EmbeddingResponse> {
        self.endpoint.embed(texts, model).await
    }

    fn model_id(&self) -> &str {
        &self.endpoint.model
    }
}
