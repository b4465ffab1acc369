use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl VectorStoreError {
    pub fn qdrant(err: impl std::fmt::Display) -> Self {
        Self::Qdrant(err.to_string())
    }
}

impl From<qdrant_client::QdrantError> for VectorStoreError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Self::qdrant(err)
    }
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
