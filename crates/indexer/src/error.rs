use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] codeindex_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] codeindex_vector_store::VectorStoreError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Invalid ignore pattern: {0}")]
    PatternError(#[from] globset::Error),

    #[error("File watcher error: {0}")]
    WatcherError(#[from] notify::Error),

    #[error("Invalid workspace path: {0}")]
    InvalidPath(String),

    #[error("Code indexing is not configured")]
    NotConfigured,

    #[error("Index is not ready for search (state: {0})")]
    NotReady(String),

    #[error("Indexing failed: {0}")]
    ScanFailed(String),

    #[error("{0}")]
    Other(String),
}
