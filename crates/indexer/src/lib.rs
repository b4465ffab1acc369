//! # Code Index Indexer
//!
//! Keeps a vector index of a workspace in step with its files.
//!
//! ## Pipeline
//!
//! ```text
//! Workspace
//!     │
//!     ├──> DirectoryScanner (full pass, hash-based change detection)
//!     │      └─> CodeParser ──> BatchProcessor ──> Embedder + VectorStore
//!     │
//!     ├──> FileWatcher (debounced notify events, same path into the store)
//!     │
//!     └──> CacheManager (path -> content hash, persisted per workspace)
//!
//! Orchestrator drives the above and publishes IndexingStatus;
//! CodeIndexManager wires one workspace, ManagerRegistry holds them all.
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use codeindex_indexer::{default_cache_dir, CodeIndexConfig, ManagerRegistry};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = ManagerRegistry::new(&default_cache_dir());
//!     let manager = registry.get_or_create(Path::new("/path/to/project"))?;
//!     manager.initialize(CodeIndexConfig::default()).await?;
//!     manager.start_indexing().await?;
//!
//!     for hit in manager.search_index("parse config file", None).await? {
//!         println!("{:.2} {}:{}", hit.score, hit.file_path, hit.start_line);
//!     }
//!     registry.dispose_all().await;
//!     Ok(())
//! }
//! ```

mod batch;
mod cache;
mod config;
mod debounce;
mod error;
mod ignore_rules;
mod manager;
mod orchestrator;
mod retry;
mod scanner;
mod search;
mod services;
mod state;
mod watcher;

pub use batch::{BatchProcessor, BatchResult, BatchStrategy, ItemResult};
pub use cache::{cache_file_path, default_cache_dir, CacheManager};
pub use config::{
    CodeIndexConfig, SearchConfig, TuningConfig, CONFIG_FILE_NAME, ENV_COMPATIBLE_API_KEY,
    ENV_OPENAI_API_KEY, ENV_QDRANT_API_KEY, ENV_QDRANT_URL,
};
pub use error::{IndexerError, Result};
pub use ignore_rules::{IgnoreRules, IGNORE_FILE_NAME};
pub use manager::{CodeIndexManager, ManagerRegistry};
pub use orchestrator::Orchestrator;
pub use retry::RetryPolicy;
pub use scanner::{BlockStrategy, DirectoryScanner, PendingBlock, ScanCallbacks, ScanResult, ScanStats};
pub use search::{SearchResult, SearchService};
pub use services::IndexServices;
pub use state::{IndexingState, IndexingStatus, StateManager};
pub use watcher::{ChangeType, FileProcessingResult, FileWatcher, SkipReason, WatcherEvent};
