//! Indexing state machine for one workspace.
//!
//! ```text
//!            start_indexing()                 scan ok
//! Standby ───────────────────> Indexing ─────────────────> Indexed (watcher on)
//!   ^  Error ──────────────────^   │  ^                       │  │
//!   │  Indexed ────────────────┘   │  └──── watcher batch ────┘  │
//!   │                              │ scan failed                 │
//!   │                              v                             │
//!   │                            Error                           │
//!   └──────────── stop_watcher() / clear_index_data() ───────────┘
//! ```

use crate::error::{IndexerError, Result};
use crate::scanner::{ScanCallbacks, ScanResult};
use crate::services::IndexServices;
use crate::state::{IndexingState, StateManager};
use crate::watcher::{FileWatcher, WatcherEvent};
use codeindex_vector_store::relative_path;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

struct ActiveWatcher {
    watcher: FileWatcher,
    listener: JoinHandle<()>,
}

pub struct Orchestrator {
    services: IndexServices,
    state: Arc<StateManager>,
    watcher: Mutex<Option<ActiveWatcher>>,
    scanning: Arc<AtomicBool>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(services: IndexServices, state: Arc<StateManager>) -> Self {
        Self {
            services,
            state,
            watcher: Mutex::new(None),
            scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn state(&self) -> IndexingState {
        self.state.state()
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.lock_watcher().is_some()
    }

    /// Full scan followed by watching. A call while indexing is already under
    /// way does nothing. A failed scan leaves the index empty and the state at
    /// `Error`; the error is returned as well.
    pub async fn start_indexing(&self) -> Result<()> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            log::warn!("Indexing already in progress; ignoring start request");
            return Ok(());
        }
        if self.state.state() == IndexingState::Indexing {
            log::warn!("Watcher batch in progress; ignoring start request");
            self.scanning.store(false, Ordering::SeqCst);
            return Ok(());
        }

        self.state
            .set_system_state(IndexingState::Indexing, "Initializing services...");
        let outcome = self.run_full_index().await;
        self.scanning.store(false, Ordering::SeqCst);

        if let Err(err) = outcome {
            log::error!("Indexing failed: {err}");
            self.discard_partial_index().await;
            self.stop_watcher_quietly();
            self.state.set_system_state(
                IndexingState::Error,
                format!("Failed during initial scan: {err}"),
            );
            return Err(err);
        }
        Ok(())
    }

    async fn run_full_index(&self) -> Result<()> {
        let services = &self.services;
        let created_new = services.store.initialize().await?;
        if created_new {
            log::info!("Created a new collection; starting from an empty cache");
            services.cache.clear_cache_file().await?;
        } else {
            self.remove_orphaned_points().await;
        }

        self.state.set_system_state(
            IndexingState::Indexing,
            "Services ready. Starting workspace scan...",
        );
        let result = services.scanner().scan(&self.progress_callbacks()).await?;
        check_scan_outcome(&result)?;

        if let Err(err) = services.cache.flush().await {
            log::warn!("Failed to persist cache after scan: {err}");
        }

        self.start_watcher()?;
        let message = if result.stats.processed == 0 {
            "Index up-to-date. File watcher started.".to_string()
        } else {
            format!(
                "Indexed {} blocks from {} files. File watcher started.",
                result.indexed_block_count, result.stats.processed
            )
        };
        self.state.set_system_state(IndexingState::Indexed, message);
        Ok(())
    }

    fn progress_callbacks(&self) -> ScanCallbacks {
        let found = Arc::new(AtomicUsize::new(0));
        let indexed = Arc::new(AtomicUsize::new(0));

        let on_file_parsed = {
            let (state, found, indexed) = (self.state.clone(), found.clone(), indexed.clone());
            move |_path: &str, blocks: usize| {
                let found = found.fetch_add(blocks, Ordering::SeqCst) + blocks;
                state.report_block_progress(indexed.load(Ordering::SeqCst), found);
            }
        };
        let on_blocks_indexed = {
            let state = self.state.clone();
            move |total: usize| {
                indexed.store(total, Ordering::SeqCst);
                state.report_block_progress(total, found.load(Ordering::SeqCst));
            }
        };

        ScanCallbacks {
            on_error: Some(Arc::new(|message: &str| log::debug!("Scan error: {message}"))),
            on_file_parsed: Some(Arc::new(on_file_parsed)),
            on_blocks_indexed: Some(Arc::new(on_blocks_indexed)),
        }
    }

    /// Points of files the cache does not know about cannot be tracked any more.
    async fn remove_orphaned_points(&self) {
        let services = &self.services;
        let stored = services.store.get_all_file_paths().await;
        if stored.is_empty() {
            return;
        }
        let known: HashSet<String> = services
            .cache
            .get_all_hashes()
            .into_keys()
            .map(|path| relative_path(&services.workspace_root, Path::new(&path)))
            .collect();
        let orphaned: Vec<String> = stored
            .into_iter()
            .filter(|path| !known.contains(path))
            .collect();
        if orphaned.is_empty() {
            return;
        }

        log::info!("Removing points of {} files missing from the cache", orphaned.len());
        if let Err(err) = services
            .store
            .delete_points_by_multiple_file_paths(&orphaned)
            .await
        {
            log::warn!("Failed to remove orphaned points: {err}");
        }
    }

    async fn discard_partial_index(&self) {
        if let Err(err) = self.services.store.clear_collection().await {
            log::warn!("Failed to clear collection after failed scan: {err}");
        }
        if let Err(err) = self.services.cache.clear_cache_file().await {
            log::warn!("Failed to clear cache after failed scan: {err}");
        }
    }

    fn start_watcher(&self) -> Result<()> {
        let mut active = self.lock_watcher();
        if active.is_some() {
            return Ok(());
        }
        let watcher = self.services.watcher();
        watcher.initialize()?;
        let listener = tokio::spawn(forward_watcher_events(
            watcher.subscribe(),
            self.state.clone(),
            self.scanning.clone(),
        ));
        *active = Some(ActiveWatcher { watcher, listener });
        Ok(())
    }

    /// Stop watching. The state becomes `Standby` unless it is `Error`.
    pub fn stop_watcher(&self) {
        self.stop_watcher_quietly();
        if self.state.state() != IndexingState::Error {
            self.state
                .set_system_state(IndexingState::Standby, "File watcher stopped.");
        }
    }

    fn stop_watcher_quietly(&self) {
        if let Some(active) = self.lock_watcher().take() {
            active.watcher.dispose();
            active.listener.abort();
        }
    }

    /// Drop the remote collection and the local cache, back to `Standby`.
    pub async fn clear_index_data(&self) -> Result<()> {
        self.stop_watcher_quietly();
        let deleted = self.services.store.delete_collection().await;
        let cleared = self.services.cache.clear_cache_file().await;

        let outcome = deleted.map_err(IndexerError::from).and(cleared);
        match &outcome {
            Ok(()) => self
                .state
                .set_system_state(IndexingState::Standby, "Index data cleared successfully."),
            Err(err) => {
                log::error!("Failed to clear index data: {err}");
                self.state.set_system_state(
                    IndexingState::Error,
                    format!("Failed to clear index data: {err}"),
                );
            }
        }
        outcome
    }

    /// Stop background work and write the cache.
    pub async fn dispose(&self) {
        self.stop_watcher_quietly();
        if let Err(err) = self.services.cache.flush().await {
            log::warn!("Failed to persist cache on shutdown: {err}");
        }
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, Option<ActiveWatcher>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Found blocks that never reach the store make the whole run a failure.
fn check_scan_outcome(result: &ScanResult) -> Result<()> {
    if result.total_block_count > 0 && result.indexed_block_count == 0 {
        return Err(IndexerError::ScanFailed(format!(
            "none of {} blocks were indexed{}",
            result.total_block_count,
            result
                .batch_errors
                .first()
                .map(|err| format!(": {err}"))
                .unwrap_or_default()
        )));
    }
    if !result.batch_errors.is_empty() && result.failed_block_count * 10 > result.total_block_count {
        return Err(IndexerError::ScanFailed(format!(
            "{} of {} blocks failed to index",
            result.failed_block_count, result.total_block_count
        )));
    }
    Ok(())
}

/// Mirrors watcher batches into the state. A running full scan owns the
/// state, so batches finishing during a rescan only log.
async fn forward_watcher_events(
    mut events: broadcast::Receiver<WatcherEvent>,
    state: Arc<StateManager>,
    scanning: Arc<AtomicBool>,
) {
    loop {
        let event = events.recv().await;
        let rescan = scanning.load(Ordering::SeqCst);
        match event {
            Ok(WatcherEvent::BatchStart(paths)) => {
                if !rescan {
                    state.report_file_queue_progress(0, paths.len(), None);
                }
            }
            Ok(WatcherEvent::BatchProgress {
                processed_in_batch,
                total_in_batch,
                current_file,
            }) => {
                if rescan {
                    continue;
                }
                let current = current_file.map(|path| path.to_string_lossy().into_owned());
                state.report_file_queue_progress(processed_in_batch, total_in_batch, current.as_deref());
            }
            Ok(WatcherEvent::BatchFinish {
                processed_files,
                batch_error,
            }) => {
                if let Some(err) = batch_error {
                    log::warn!("Watcher batch finished with errors: {err}");
                }
                if rescan {
                    log::debug!(
                        "Watcher batch of {} files finished during a full scan",
                        processed_files.len()
                    );
                } else if state.state() != IndexingState::Error {
                    state.set_system_state(
                        IndexingState::Indexed,
                        format!("Processed {} changed files.", processed_files.len()),
                    );
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                log::debug!("Status listener skipped {skipped} watcher events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(total: usize, indexed: usize, failed: usize, errors: usize) -> ScanResult {
        ScanResult {
            total_block_count: total,
            indexed_block_count: indexed,
            failed_block_count: failed,
            batch_errors: vec!["boom".to_string(); errors],
            ..ScanResult::default()
        }
    }

    #[test]
    fn nothing_found_is_not_a_failure() {
        assert!(check_scan_outcome(&result(0, 0, 0, 0)).is_ok());
    }

    #[test]
    fn nothing_indexed_is_a_failure() {
        let err = check_scan_outcome(&result(120, 0, 120, 2)).unwrap_err();
        assert!(err.to_string().contains("none of 120 blocks"));
    }

    #[test]
    fn small_failure_share_is_tolerated() {
        assert!(check_scan_outcome(&result(1000, 940, 60, 1)).is_ok());
        assert!(check_scan_outcome(&result(100, 80, 20, 1)).is_err());
    }

    async fn replay_batch(scanning: bool) -> IndexingState {
        let state = Arc::new(StateManager::new());
        state.set_system_state(IndexingState::Indexing, "Services ready. Starting workspace scan...");
        let (tx, rx) = broadcast::channel(8);
        let listener = tokio::spawn(forward_watcher_events(
            rx,
            state.clone(),
            Arc::new(AtomicBool::new(scanning)),
        ));

        tx.send(WatcherEvent::BatchStart(vec!["/ws/a.rs".into()])).unwrap();
        tx.send(WatcherEvent::BatchFinish {
            processed_files: Vec::new(),
            batch_error: None,
        })
        .unwrap();
        drop(tx);
        listener.await.unwrap();
        state.state()
    }

    #[tokio::test]
    async fn watcher_batch_during_rescan_keeps_indexing_state() {
        assert_eq!(replay_batch(true).await, IndexingState::Indexing);
    }

    #[tokio::test]
    async fn watcher_batch_after_scan_marks_indexed() {
        assert_eq!(replay_batch(false).await, IndexingState::Indexed);
    }
}
