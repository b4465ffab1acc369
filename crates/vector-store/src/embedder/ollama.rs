use super::{http_client, Embedder, EmbeddingResponse};
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Local embeddings through Ollama's `/api/embed`.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn create_embeddings(&self, texts: &[String], model: Option<&str>) -> Result<EmbeddingResponse> {
        if texts.is_empty() {
            return Ok(EmbeddingResponse::default());
        }
        let request = EmbedRequest {
            model: model.unwrap_or(&self.model),
            input: texts,
        };
        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::EmbeddingError(format!(
                "Ollama HTTP {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(EmbeddingResponse {
            embeddings: parsed.embeddings,
            usage: None,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
