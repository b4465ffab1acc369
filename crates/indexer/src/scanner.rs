//! Full-workspace scan.
//!
//! ```text
//! list files ──> filter (ignore rules, extension)
//!     │
//!     └──> parse workers (PARSING_CONCURRENCY)
//!            ├─ too large / unchanged hash ──> skipped
//!            └─ blocks ──> shared buffer ──(threshold)──> batch tasks
//!                                                          (BATCH_PROCESSING_CONCURRENCY,
//!                                                           at most MAX_PENDING_BATCHES queued)
//! then: flush buffer, wait for batches, drop cache entries of files that vanished
//! ```

use crate::batch::{BatchProcessor, BatchResult, BatchStrategy};
use crate::cache::CacheManager;
use crate::config::TuningConfig;
use crate::error::{IndexerError, Result};
use crate::ignore_rules::IgnoreRules;
use codeindex_chunker::{content_hash, CodeBlock, CodeParser};
use codeindex_vector_store::{relative_path, VectorPoint, VectorStore};
use futures::StreamExt;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;
type FileParsedCallback = Arc<dyn Fn(&str, usize) + Send + Sync>;
type BlocksIndexedCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Progress hooks; all optional.
#[derive(Clone, Default)]
pub struct ScanCallbacks {
    pub on_error: Option<ErrorCallback>,
    /// `(absolute path, blocks found)` after each parsed file
    pub on_file_parsed: Option<FileParsedCallback>,
    /// Running total of blocks handed through the batch processor
    pub on_blocks_indexed: Option<BlocksIndexedCallback>,
}

impl ScanCallbacks {
    fn error(&self, message: &str) {
        if let Some(cb) = &self.on_error {
            cb(message);
        }
    }

    fn file_parsed(&self, file_path: &str, blocks: usize) {
        if let Some(cb) = &self.on_file_parsed {
            cb(file_path, blocks);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub processed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Parsed blocks, kept only when the scan runs without an embedder
    pub blocks: Vec<CodeBlock>,
    pub stats: ScanStats,
    pub total_block_count: usize,
    pub indexed_block_count: usize,
    pub failed_block_count: usize,
    pub batch_errors: Vec<String>,
}

/// A parsed block waiting for a batch
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub block: CodeBlock,
    /// The file had older content in the index
    pub replaces_existing: bool,
}

/// Maps scanned blocks onto points of one workspace.
pub struct BlockStrategy {
    workspace_root: PathBuf,
}

impl BlockStrategy {
    #[must_use]
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
        }
    }
}

impl BatchStrategy<PendingBlock> for BlockStrategy {
    fn text(&self, item: &PendingBlock) -> String {
        item.block.content.trim().to_string()
    }

    fn point(&self, item: &PendingBlock, vector: Vec<f32>) -> VectorPoint {
        VectorPoint::from_block(&item.block, &self.workspace_root, vector)
    }

    fn file_path(&self, item: &PendingBlock) -> String {
        item.block.file_path.clone()
    }

    fn file_hash(&self, item: &PendingBlock) -> String {
        item.block.file_hash.clone()
    }

    fn files_to_delete(&self, items: &[PendingBlock]) -> Vec<String> {
        items
            .iter()
            .filter(|item| item.replaces_existing)
            .map(|item| relative_path(&self.workspace_root, Path::new(&item.block.file_path)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

struct Indexing {
    processor: Arc<BatchProcessor>,
    store: Arc<dyn VectorStore>,
    strategy: Arc<BlockStrategy>,
}

pub struct DirectoryScanner {
    root: PathBuf,
    parser: Arc<CodeParser>,
    ignore: Arc<IgnoreRules>,
    cache: Arc<CacheManager>,
    indexing: Option<Indexing>,
    tuning: TuningConfig,
}

/// Per-scan shared state
struct ScanState {
    buffer: tokio::sync::Mutex<Vec<PendingBlock>>,
    batch_tasks: Mutex<Vec<JoinHandle<BatchResult>>>,
    pending_batches: Arc<Semaphore>,
    running_batches: Arc<Semaphore>,
    processed: AtomicUsize,
    skipped: AtomicUsize,
    found: AtomicUsize,
    indexed: Arc<AtomicUsize>,
    collected: Mutex<Vec<CodeBlock>>,
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl DirectoryScanner {
    /// Scanner that only records hashes; see [`with_indexing`](Self::with_indexing).
    #[must_use]
    pub fn new(
        root: &Path,
        parser: Arc<CodeParser>,
        ignore: Arc<IgnoreRules>,
        cache: Arc<CacheManager>,
        tuning: TuningConfig,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            parser,
            ignore,
            cache,
            indexing: None,
            tuning,
        }
    }

    /// Send parsed blocks through `processor` into `store`.
    #[must_use]
    pub fn with_indexing(mut self, processor: Arc<BatchProcessor>, store: Arc<dyn VectorStore>) -> Self {
        self.indexing = Some(Indexing {
            processor,
            store,
            strategy: Arc::new(BlockStrategy::new(&self.root)),
        });
        self
    }

    pub async fn scan(&self, callbacks: &ScanCallbacks) -> Result<ScanResult> {
        let started = Instant::now();
        let _watchdog = self.spawn_slow_scan_warning();

        let ignore = self.ignore.clone();
        let limit = self.tuning.max_list_files;
        let listed = tokio::task::spawn_blocking(move || ignore.list_files(limit))
            .await
            .map_err(|e| IndexerError::Other(format!("file listing task failed: {e}")))?;
        let files: Vec<PathBuf> = listed
            .into_iter()
            .filter(|path| self.ignore.accepts(path))
            .collect();
        let seen: HashSet<String> = files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        log::info!(
            "Scanning {} files under {}",
            files.len(),
            self.root.display()
        );

        let state = ScanState {
            buffer: tokio::sync::Mutex::new(Vec::new()),
            batch_tasks: Mutex::new(Vec::new()),
            pending_batches: Arc::new(Semaphore::new(self.tuning.max_pending_batches.max(1))),
            running_batches: Arc::new(Semaphore::new(
                self.tuning.batch_processing_concurrency.max(1),
            )),
            processed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            found: AtomicUsize::new(0),
            indexed: Arc::new(AtomicUsize::new(0)),
            collected: Mutex::new(Vec::new()),
        };
        let state = &state;

        futures::stream::iter(files)
            .for_each_concurrent(self.tuning.parsing_concurrency.max(1), |path| async move {
                if let Err(err) = self.scan_file(&path, state, callbacks).await {
                    let message = format!("Error processing {}: {err}", path.display());
                    log::warn!("{message}");
                    callbacks.error(&message);
                }
            })
            .await;

        let remaining = std::mem::take(&mut *state.buffer.lock().await);
        if !remaining.is_empty() {
            self.submit_batch(remaining, state, callbacks).await;
        }

        let batches = self.collect_batches(state, callbacks).await;
        self.remove_vanished_files(&seen, callbacks).await;

        let result = ScanResult {
            blocks: std::mem::take(&mut *state.collected.lock().unwrap_or_else(PoisonError::into_inner)),
            stats: ScanStats {
                processed: state.processed.load(Ordering::SeqCst),
                skipped: state.skipped.load(Ordering::SeqCst),
            },
            total_block_count: state.found.load(Ordering::SeqCst),
            indexed_block_count: batches.processed,
            failed_block_count: batches.failed,
            batch_errors: batches.errors,
        };
        log::info!(
            "Scan finished in {}ms: {} processed, {} skipped, {} blocks found, {} indexed, {} failed",
            started.elapsed().as_millis(),
            result.stats.processed,
            result.stats.skipped,
            result.total_block_count,
            result.indexed_block_count,
            result.failed_block_count
        );
        Ok(result)
    }

    async fn scan_file(&self, path: &Path, state: &ScanState, callbacks: &ScanCallbacks) -> Result<()> {
        let file_path = path.to_string_lossy().into_owned();
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > self.tuning.max_file_size_bytes {
            log::debug!("Skipping large file {file_path} ({} bytes)", metadata.len());
            state.skipped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let hash = content_hash(&content);
        let cached = self.cache.get_hash(&file_path);
        if cached.as_deref() == Some(hash.as_str()) {
            state.skipped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let parser = self.parser.clone();
        let (parse_path, parse_hash) = (file_path.clone(), hash.clone());
        let blocks = tokio::task::spawn_blocking(move || parser.parse(&parse_path, &content, &parse_hash))
            .await
            .map_err(|e| IndexerError::Other(format!("parse task failed: {e}")))?;

        state.processed.fetch_add(1, Ordering::SeqCst);
        state.found.fetch_add(blocks.len(), Ordering::SeqCst);
        callbacks.file_parsed(&file_path, blocks.len());

        let Some(indexing) = &self.indexing else {
            self.cache.update_hash(&file_path, &hash);
            state
                .collected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(blocks);
            return Ok(());
        };

        if blocks.is_empty() {
            if cached.is_some() {
                indexing
                    .store
                    .delete_points_by_file_path(&relative_path(&self.root, path))
                    .await?;
            }
            self.cache.update_hash(&file_path, &hash);
            return Ok(());
        }

        let replaces_existing = cached.is_some();
        let ready = {
            let mut buffer = state.buffer.lock().await;
            buffer.extend(blocks.into_iter().map(|block| PendingBlock {
                block,
                replaces_existing,
            }));
            (buffer.len() >= self.tuning.batch_segment_threshold).then(|| std::mem::take(&mut *buffer))
        };
        if let Some(batch) = ready {
            self.submit_batch(batch, state, callbacks).await;
        }
        Ok(())
    }

    /// Queue `batch` on its own task. Waits while too many batches are queued.
    async fn submit_batch(&self, batch: Vec<PendingBlock>, state: &ScanState, callbacks: &ScanCallbacks) {
        let Some(indexing) = &self.indexing else {
            return;
        };
        let queued = state.pending_batches.clone().acquire_owned().await.ok();
        let running = state.running_batches.clone();
        let processor = indexing.processor.clone();
        let strategy = indexing.strategy.clone();
        let indexed = state.indexed.clone();
        let on_indexed = callbacks.on_blocks_indexed.clone();

        log::debug!("Submitting batch of {} blocks", batch.len());
        let handle = tokio::spawn(async move {
            let _queued = queued;
            let _running = running.acquire_owned().await.ok();
            let progress = move |count: usize| {
                let total = indexed.fetch_add(count, Ordering::SeqCst) + count;
                if let Some(cb) = &on_indexed {
                    cb(total);
                }
            };
            processor
                .process_batch(&batch, strategy.as_ref(), &progress)
                .await
        });
        state
            .batch_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    async fn collect_batches(&self, state: &ScanState, callbacks: &ScanCallbacks) -> BatchResult {
        let handles = std::mem::take(&mut *state.batch_tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let mut total = BatchResult::default();
        for handle in handles {
            match handle.await {
                Ok(result) => total.merge(result),
                Err(err) => total.errors.push(format!("batch task failed: {err}")),
            }
        }
        for error in &total.errors {
            callbacks.error(error);
        }

        // Files with any failed block are retried on the next run
        let failed = total.failed_files();
        if !failed.is_empty() {
            log::warn!("{} files had blocks that failed to index", failed.len());
            self.cache.delete_hashes(&failed);
        }
        total
    }

    /// Cache entries for files no longer in the workspace lose their points.
    async fn remove_vanished_files(&self, seen: &HashSet<String>, callbacks: &ScanCallbacks) {
        let vanished: Vec<String> = self
            .cache
            .get_all_hashes()
            .into_keys()
            .filter(|path| !seen.contains(path))
            .collect();
        if vanished.is_empty() {
            return;
        }

        if let Some(indexing) = &self.indexing {
            let relative: Vec<String> = vanished
                .iter()
                .map(|path| relative_path(&self.root, Path::new(path)))
                .collect();
            if let Err(err) = indexing
                .store
                .delete_points_by_multiple_file_paths(&relative)
                .await
            {
                let message = format!("Failed to remove points of {} deleted files: {err}", vanished.len());
                log::warn!("{message}");
                callbacks.error(&message);
                return;
            }
        }
        log::info!("Removed {} deleted files from the index", vanished.len());
        self.cache.delete_hashes(&vanished);
    }

    fn spawn_slow_scan_warning(&self) -> AbortOnDrop {
        let after = self.tuning.slow_scan_warning();
        let root = self.root.clone();
        AbortOnDrop(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            log::warn!(
                "Indexing {} is taking longer than {}s",
                root.display(),
                after.as_secs()
            );
        }))
    }
}
