//! Incremental updates from filesystem notifications.
//!
//! ```text
//! notify ──> mpsc ──> accumulator { path -> change } ──(500ms quiet)──> batch
//!                                                                        │
//!     create/change ──> process_file (parse + embed, N at a time) ───────┤
//!     delete old points of deleted + reprocessed files (one call) ───────┤
//!     upsert new points in segments, with retry ──> cache hashes ────────┘
//! ```

use crate::error::{IndexerError, Result};
use crate::retry::RetryPolicy;
use crate::services::IndexServices;
use codeindex_chunker::{content_hash, is_supported_path};
use codeindex_vector_store::{relative_path, VectorPoint};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Created,
    Changed,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Ignored,
    TooLarge,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileProcessingResult {
    Success {
        path: PathBuf,
    },
    Skipped {
        path: PathBuf,
        reason: SkipReason,
    },
    /// Reading or parsing the file failed
    LocalError {
        path: PathBuf,
        error: String,
    },
    /// Embedding or storing the file failed
    Error {
        path: PathBuf,
        error: String,
    },
    /// Parsed and embedded; the points still have to be upserted
    ProcessedForBatching {
        path: PathBuf,
        new_hash: String,
        points: Vec<VectorPoint>,
    },
}

impl FileProcessingResult {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Success { path }
            | Self::Skipped { path, .. }
            | Self::LocalError { path, .. }
            | Self::Error { path, .. }
            | Self::ProcessedForBatching { path, .. } => path,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::LocalError { .. } | Self::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    BatchStart(Vec<PathBuf>),
    BatchProgress {
        processed_in_batch: usize,
        total_in_batch: usize,
        current_file: Option<PathBuf>,
    },
    BatchFinish {
        processed_files: Vec<FileProcessingResult>,
        batch_error: Option<String>,
    },
}

enum WatcherCommand {
    Shutdown,
}

struct WatcherRuntime {
    command_tx: mpsc::Sender<WatcherCommand>,
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

pub struct FileWatcher {
    core: Arc<WatcherCore>,
    runtime: Mutex<Option<WatcherRuntime>>,
}

struct WatcherCore {
    services: IndexServices,
    retry: RetryPolicy,
    events: broadcast::Sender<WatcherEvent>,
}

impl FileWatcher {
    #[must_use]
    pub fn new(services: IndexServices) -> Self {
        let (events, _) = broadcast::channel(256);
        let retry = services.retry_policy();
        Self {
            core: Arc::new(WatcherCore {
                services,
                retry,
                events,
            }),
            runtime: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WatcherEvent> {
        self.core.events.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_runtime().is_some()
    }

    /// Start watching the workspace. Calling it on a running watcher does nothing.
    pub fn initialize(&self) -> Result<()> {
        let mut runtime = self.lock_runtime();
        if runtime.is_some() {
            return Ok(());
        }

        let root = self.core.services.workspace_root.clone();
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(4);
        let watcher = create_fs_watcher(&root, event_tx)?;
        let task = tokio::spawn(run_loop(
            self.core.clone(),
            event_rx,
            command_rx,
            self.core.services.tuning.watcher_debounce(),
        ));

        log::info!("Watching {}", root.display());
        *runtime = Some(WatcherRuntime {
            command_tx,
            watcher,
            task,
        });
        Ok(())
    }

    /// Stop notifications and drop the pending batch. A batch already being
    /// processed runs to completion.
    pub fn dispose(&self) {
        let Some(runtime) = self.lock_runtime().take() else {
            return;
        };
        drop(runtime.watcher);
        if runtime.command_tx.try_send(WatcherCommand::Shutdown).is_err() && !runtime.task.is_finished() {
            // The loop also exits once the command channel closes
            log::debug!("Watcher loop busy, shutdown deferred");
        }
        log::info!("Stopped watching {}", self.core.services.workspace_root.display());
    }

    pub async fn process_file(&self, path: &Path) -> FileProcessingResult {
        self.core.process_file(path).await
    }

    /// Apply one accumulated set of changes, as the debounce timer does.
    pub async fn process_changes(&self, changes: HashMap<PathBuf, ChangeType>) -> Vec<FileProcessingResult> {
        self.core.process_changes(changes).await
    }

    fn lock_runtime(&self) -> std::sync::MutexGuard<'_, Option<WatcherRuntime>> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn create_fs_watcher(root: &Path, sender: mpsc::Sender<notify::Result<Event>>) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive).map_err(|e| {
        IndexerError::Other(format!("failed to watch {}: {e}", root.display()))
    })?;
    Ok(watcher)
}

async fn run_loop(
    core: Arc<WatcherCore>,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<WatcherCommand>,
    debounce: Duration,
) {
    let mut pending: HashMap<PathBuf, ChangeType> = HashMap::new();
    let mut deadline: Option<time::Instant> = None;

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                if record_event(event, &mut pending) {
                    deadline = Some(time::Instant::now() + debounce);
                }
            }
            command = command_rx.recv() => match command {
                Some(WatcherCommand::Shutdown) | None => break,
            },
            () = async {
                if let Some(deadline) = deadline {
                    time::sleep_until(deadline).await;
                }
            }, if deadline.is_some() => {
                deadline = None;
                let batch = std::mem::take(&mut pending);
                if !batch.is_empty() {
                    core.process_changes(batch).await;
                }
            }
        }
    }
    log::debug!("Watcher loop exited");
}

/// Fold one notification into the accumulator; the last change per path wins.
fn record_event(event: notify::Result<Event>, pending: &mut HashMap<PathBuf, ChangeType>) -> bool {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            log::warn!("Watcher error: {err}");
            return false;
        }
    };

    let mut recorded = false;
    for path in event.paths {
        if !is_supported_path(&path) {
            continue;
        }
        let Some(change) = classify(&event.kind, &path) else {
            continue;
        };
        pending.insert(path, change);
        recorded = true;
    }
    recorded
}

fn classify(kind: &EventKind, path: &Path) -> Option<ChangeType> {
    match kind {
        EventKind::Create(_) => Some(ChangeType::Created),
        // Renames report both ends; whichever still exists was created
        EventKind::Modify(ModifyKind::Name(_)) => Some(if path.exists() {
            ChangeType::Created
        } else {
            ChangeType::Deleted
        }),
        EventKind::Modify(_) => Some(ChangeType::Changed),
        EventKind::Remove(_) => Some(ChangeType::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

impl WatcherCore {
    fn emit(&self, event: WatcherEvent) {
        let _ = self.events.send(event);
    }

    fn progress(&self, processed_in_batch: usize, total_in_batch: usize, current_file: Option<&Path>) {
        self.emit(WatcherEvent::BatchProgress {
            processed_in_batch,
            total_in_batch,
            current_file: current_file.map(Path::to_path_buf),
        });
    }

    async fn process_file(&self, path: &Path) -> FileProcessingResult {
        let services = &self.services;
        let path_buf = path.to_path_buf();
        if !services.ignore.accepts(path) {
            return FileProcessingResult::Skipped {
                path: path_buf,
                reason: SkipReason::Ignored,
            };
        }

        let local_error = |error: String| FileProcessingResult::LocalError {
            path: path.to_path_buf(),
            error,
        };
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) => return local_error(err.to_string()),
        };
        if metadata.len() > services.tuning.max_file_size_bytes {
            return FileProcessingResult::Skipped {
                path: path_buf,
                reason: SkipReason::TooLarge,
            };
        }
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) => return local_error(err.to_string()),
        };

        let file_path = path.to_string_lossy().into_owned();
        let new_hash = content_hash(&content);
        if services.cache.get_hash(&file_path).as_deref() == Some(new_hash.as_str()) {
            return FileProcessingResult::Skipped {
                path: path_buf,
                reason: SkipReason::Unchanged,
            };
        }

        let parser = services.parser.clone();
        let parse_hash = new_hash.clone();
        let blocks = match tokio::task::spawn_blocking(move || parser.parse(&file_path, &content, &parse_hash)).await {
            Ok(blocks) => blocks,
            Err(err) => return local_error(format!("parse task failed: {err}")),
        };

        let mut points = Vec::with_capacity(blocks.len());
        for segment in blocks.chunks(services.tuning.batch_segment_threshold.max(1)) {
            let texts: Vec<String> = segment.iter().map(|b| b.content.trim().to_string()).collect();
            let response = match services.embedder.create_embeddings(&texts, None).await {
                Ok(response) => response,
                Err(err) => {
                    return FileProcessingResult::Error {
                        path: path_buf,
                        error: err.to_string(),
                    }
                }
            };
            if response.embeddings.len() != segment.len() {
                return FileProcessingResult::Error {
                    path: path_buf,
                    error: format!(
                        "expected {} embeddings, got {}",
                        segment.len(),
                        response.embeddings.len()
                    ),
                };
            }
            points.extend(
                segment
                    .iter()
                    .zip(response.embeddings)
                    .map(|(block, vector)| VectorPoint::from_block(block, &services.workspace_root, vector)),
            );
        }

        FileProcessingResult::ProcessedForBatching {
            path: path_buf,
            new_hash,
            points,
        }
    }

    async fn process_changes(&self, changes: HashMap<PathBuf, ChangeType>) -> Vec<FileProcessingResult> {
        let services = &self.services;
        let total = changes.len();
        let mut paths: Vec<PathBuf> = changes.keys().cloned().collect();
        paths.sort();
        log::info!("Processing {total} changed files");
        self.emit(WatcherEvent::BatchStart(paths));

        let (mut deleted, mut updated): (Vec<PathBuf>, Vec<PathBuf>) = (Vec::new(), Vec::new());
        for (path, change) in changes {
            match change {
                ChangeType::Deleted => deleted.push(path),
                ChangeType::Created | ChangeType::Changed => updated.push(path),
            }
        }
        deleted.sort();
        updated.sort();

        let mut results = Vec::with_capacity(total);
        let mut processed = 0;
        let mut ready = Vec::new();
        for chunk in updated.chunks(services.tuning.watcher_file_concurrency.max(1)) {
            let outcomes = futures::future::join_all(chunk.iter().map(|path| self.process_file(path))).await;
            for outcome in outcomes {
                processed += 1;
                self.progress(processed, total, Some(outcome.path()));
                match outcome {
                    FileProcessingResult::ProcessedForBatching {
                        path,
                        new_hash,
                        points,
                    } => ready.push((path, new_hash, points)),
                    other => {
                        if other.is_error() {
                            log::warn!("Failed to process {}: {other:?}", other.path().display());
                        }
                        results.push(other);
                    }
                }
            }
        }

        let mut batch_error = None;
        let stale: Vec<String> = deleted
            .iter()
            .chain(ready.iter().map(|(path, _, _)| path))
            .map(|path| relative_path(&services.workspace_root, path))
            .collect();
        let mut delete_failed = false;
        if !stale.is_empty() {
            if let Err(err) = services.store.delete_points_by_multiple_file_paths(&stale).await {
                log::error!("Failed to delete points of {} files: {err}", stale.len());
                batch_error = Some(format!("delete failed: {err}"));
                delete_failed = true;
            }
        }
        for path in deleted {
            processed += 1;
            self.progress(processed, total, Some(&path));
            if delete_failed {
                results.push(FileProcessingResult::Error {
                    path,
                    error: "failed to delete points".to_string(),
                });
            } else {
                services.cache.delete_hash(&path.to_string_lossy());
                results.push(FileProcessingResult::Success { path });
            }
        }

        if delete_failed {
            // Old hashes stay, so the next scan replaces these files again
            results.extend(ready.into_iter().map(|(path, _, _)| FileProcessingResult::Error {
                path,
                error: "failed to delete old points".to_string(),
            }));
        } else {
            let (upsert_results, upsert_error) = self.upsert_ready(ready).await;
            results.extend(upsert_results);
            if upsert_error.is_some() {
                batch_error = upsert_error;
            }
        }

        self.progress(total, total, None);
        self.emit(WatcherEvent::BatchFinish {
            processed_files: results.clone(),
            batch_error,
        });
        results
    }

    /// Upsert every file's points in segments; hashes move only for files whose
    /// points all landed.
    async fn upsert_ready(
        &self,
        ready: Vec<(PathBuf, String, Vec<VectorPoint>)>,
    ) -> (Vec<FileProcessingResult>, Option<String>) {
        let services = &self.services;
        let tagged: Vec<(usize, VectorPoint)> = ready
            .iter()
            .enumerate()
            .flat_map(|(index, (_, _, points))| points.iter().cloned().map(move |point| (index, point)))
            .collect();

        let mut failed: HashMap<usize, String> = HashMap::new();
        let mut last_error = None;
        for segment in tagged.chunks(services.tuning.batch_segment_threshold.max(1)) {
            let points: Vec<VectorPoint> = segment.iter().map(|(_, point)| point.clone()).collect();
            let outcome = self
                .retry
                .run("Upserting points", || services.store.upsert_points(points.clone()))
                .await;
            if let Err(err) = outcome {
                let message = err.to_string();
                let owners: HashSet<usize> = segment.iter().map(|(index, _)| *index).collect();
                for owner in owners {
                    failed.insert(owner, message.clone());
                }
                last_error = Some(format!("upsert failed: {message}"));
            }
        }

        let results = ready
            .into_iter()
            .enumerate()
            .map(|(index, (path, new_hash, _))| {
                let file_path = path.to_string_lossy().into_owned();
                match failed.remove(&index) {
                    Some(error) => {
                        services.cache.delete_hash(&file_path);
                        FileProcessingResult::Error { path, error }
                    }
                    None => {
                        services.cache.update_hash(&file_path, &new_hash);
                        FileProcessingResult::Success { path }
                    }
                }
            })
            .collect();
        (results, last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, path: &str) -> notify::Result<Event> {
        Ok(Event::new(kind).add_path(PathBuf::from(path)))
    }

    #[test]
    fn last_change_per_path_wins() {
        let mut pending = HashMap::new();
        assert!(record_event(
            event(EventKind::Create(CreateKind::File), "/ws/a.rs"),
            &mut pending
        ));
        assert!(record_event(
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "/ws/a.rs"),
            &mut pending
        ));
        assert!(record_event(
            event(EventKind::Remove(RemoveKind::File), "/ws/b.py"),
            &mut pending
        ));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[Path::new("/ws/a.rs")], ChangeType::Changed);
        assert_eq!(pending[Path::new("/ws/b.py")], ChangeType::Deleted);
    }

    #[test]
    fn unsupported_files_and_access_events_are_dropped() {
        let mut pending = HashMap::new();
        assert!(!record_event(
            event(EventKind::Create(CreateKind::File), "/ws/image.png"),
            &mut pending
        ));
        assert!(!record_event(
            event(EventKind::Access(notify::event::AccessKind::Any), "/ws/a.rs"),
            &mut pending
        ));
        assert!(pending.is_empty());
    }

    #[test]
    fn rename_of_missing_path_counts_as_delete() {
        let kind = EventKind::Modify(ModifyKind::Name(notify::event::RenameMode::From));
        assert_eq!(
            classify(&kind, Path::new("/definitely/not/here.rs")),
            Some(ChangeType::Deleted)
        );
    }
}
