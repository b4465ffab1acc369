//! # Code Index Vector Store
//!
//! Embedding providers and the vector database behind the index.
//!
//! ```text
//! CodeBlock ──> Embedder (OpenAI | OpenAI-compatible | Ollama)
//!                  │
//!                  └─> VectorPoint { uuid v5 id, vector, payload }
//!                         │
//!                         └─> VectorStore (Qdrant, one collection per workspace)
//! ```
//!
//! Both [`Embedder`] and [`VectorStore`] are traits so the indexing pipeline can be
//! driven by recording doubles in tests.

mod embedder;
mod error;
mod point;
mod qdrant;
mod store;

pub use embedder::{
    create_embedder, model_dimension, Embedder, EmbedderConfig, EmbedderProvider,
    EmbeddingResponse, EmbeddingUsage, OllamaEmbedder, OpenAiCompatibleEmbedder, OpenAiEmbedder,
    DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_MODEL,
};
pub use error::{Result, VectorStoreError};
pub use point::{
    collection_name, path_segments, point_id, relative_path, PointPayload, SearchHit, VectorPoint,
    POINT_ID_NAMESPACE,
};
pub use qdrant::{QdrantConfig, QdrantVectorStore, DEFAULT_QDRANT_URL};
pub use store::VectorStore;
