//! Embedding + upsert + cache update, in one place.
//!
//! ```text
//! items ──> files_to_delete() ──> delete old points (once per call)
//!   │
//!   └──> segments of N ──> embed ──> build points ──> upsert ──> cache.update_hash
//!                 └─ retry with backoff, then mark the whole segment failed
//! ```
//!
//! A hash only reaches the cache after its vectors have landed in the store.

use crate::cache::CacheManager;
use crate::error::{IndexerError, Result};
use crate::retry::RetryPolicy;
use codeindex_vector_store::{Embedder, VectorPoint, VectorStore, VectorStoreError};
use std::sync::Arc;

/// How one kind of item maps onto texts, points and cache entries.
pub trait BatchStrategy<T>: Send + Sync {
    fn text(&self, item: &T) -> String;

    fn point(&self, item: &T, vector: Vec<f32>) -> VectorPoint;

    /// Absolute path used as the cache key
    fn file_path(&self, item: &T) -> String;

    fn file_hash(&self, item: &T) -> String;

    /// Workspace-relative paths whose existing points must go before the upsert
    fn files_to_delete(&self, _items: &[T]) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub file_path: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub items: Vec<ItemResult>,
}

impl BatchResult {
    /// Absolute paths of items that did not make it into the store
    #[must_use]
    pub fn failed_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .items
            .iter()
            .filter(|item| !item.success)
            .map(|item| item.file_path.clone())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    pub fn merge(&mut self, other: Self) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.errors.extend(other.errors);
        self.items.extend(other.items);
    }
}

pub struct BatchProcessor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    cache: Arc<CacheManager>,
    segment_size: usize,
    retry: RetryPolicy,
}

impl BatchProcessor {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        cache: Arc<CacheManager>,
        segment_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            store,
            cache,
            segment_size: segment_size.max(1),
            retry,
        }
    }

    /// Process `items`; `on_progress` receives the item count of every finished
    /// segment, failed or not.
    pub async fn process_batch<T, S>(
        &self,
        items: &[T],
        strategy: &S,
        on_progress: &(dyn Fn(usize) + Send + Sync),
    ) -> BatchResult
    where
        T: Sync,
        S: BatchStrategy<T> + ?Sized,
    {
        let mut result = BatchResult::default();
        if items.is_empty() {
            return result;
        }

        let stale = strategy.files_to_delete(items);
        if !stale.is_empty() {
            if let Err(err) = self.store.delete_points_by_multiple_file_paths(&stale).await {
                log::warn!("Failed to delete old points of {} files: {err}", stale.len());
                result
                    .errors
                    .extend(stale.iter().map(|path| format!("{path}: delete failed: {err}")));
            }
        }

        for segment in items.chunks(self.segment_size) {
            let texts: Vec<String> = segment.iter().map(|item| strategy.text(item)).collect();
            let outcome = self
                .retry
                .run("Embedding batch", || self.embed_and_upsert(segment, &texts, strategy))
                .await;

            match outcome {
                Ok(()) => {
                    for item in segment {
                        let file_path = strategy.file_path(item);
                        self.cache.update_hash(&file_path, &strategy.file_hash(item));
                        result.items.push(ItemResult {
                            file_path,
                            success: true,
                            error: None,
                        });
                    }
                    result.processed += segment.len();
                }
                Err(err) => {
                    let message = err.to_string();
                    result.failed += segment.len();
                    result.errors.push(format!(
                        "Failed to index {} blocks after {} attempts: {message}",
                        segment.len(),
                        self.retry.max_attempts
                    ));
                    result.items.extend(segment.iter().map(|item| ItemResult {
                        file_path: strategy.file_path(item),
                        success: false,
                        error: Some(message.clone()),
                    }));
                }
            }
            on_progress(segment.len());
        }
        result
    }

    async fn embed_and_upsert<T, S>(&self, segment: &[T], texts: &[String], strategy: &S) -> Result<()>
    where
        S: BatchStrategy<T> + ?Sized,
    {
        let response = self.embedder.create_embeddings(texts, None).await?;
        if response.embeddings.len() != segment.len() {
            return Err(IndexerError::VectorStoreError(VectorStoreError::EmbeddingError(
                format!(
                    "expected {} embeddings, got {}",
                    segment.len(),
                    response.embeddings.len()
                ),
            )));
        }
        let points: Vec<VectorPoint> = segment
            .iter()
            .zip(response.embeddings)
            .map(|(item, vector)| strategy.point(item, vector))
            .collect();
        self.store.upsert_points(points).await?;
        Ok(())
    }
}
