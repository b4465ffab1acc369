use crate::batch::BatchProcessor;
use crate::cache::CacheManager;
use crate::config::TuningConfig;
use crate::ignore_rules::IgnoreRules;
use crate::retry::RetryPolicy;
use crate::scanner::DirectoryScanner;
use crate::watcher::FileWatcher;
use codeindex_chunker::CodeParser;
use codeindex_vector_store::{Embedder, VectorStore};
use std::path::PathBuf;
use std::sync::Arc;

/// The shared collaborators of one workspace. Scanner, watcher and search
/// service all borrow these instead of building their own.
#[derive(Clone)]
pub struct IndexServices {
    pub workspace_root: PathBuf,
    pub tuning: TuningConfig,
    pub parser: Arc<CodeParser>,
    pub ignore: Arc<IgnoreRules>,
    pub cache: Arc<CacheManager>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
}

impl IndexServices {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.tuning.max_batch_retries,
            initial_delay: self.tuning.initial_retry_delay(),
        }
    }

    #[must_use]
    pub fn batch_processor(&self) -> BatchProcessor {
        BatchProcessor::new(
            self.embedder.clone(),
            self.store.clone(),
            self.cache.clone(),
            self.tuning.batch_segment_threshold,
            self.retry_policy(),
        )
    }

    #[must_use]
    pub fn scanner(&self) -> DirectoryScanner {
        DirectoryScanner::new(
            &self.workspace_root,
            self.parser.clone(),
            self.ignore.clone(),
            self.cache.clone(),
            self.tuning.clone(),
        )
        .with_indexing(Arc::new(self.batch_processor()), self.store.clone())
    }

    #[must_use]
    pub fn watcher(&self) -> FileWatcher {
        FileWatcher::new(self.clone())
    }
}
