use serde::Serialize;
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndexingState {
    Standby,
    Indexing,
    Indexed,
    Error,
}

impl IndexingState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standby => "Standby",
            Self::Indexing => "Indexing",
            Self::Indexed => "Indexed",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for IndexingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published on every state or progress change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingStatus {
    pub system_status: IndexingState,
    pub message: String,
    pub processed_items: usize,
    pub total_items: usize,
    /// `blocks` during a scan, `files` while the watcher works through a batch
    pub current_item_unit: String,
}

impl Default for IndexingStatus {
    fn default() -> Self {
        Self {
            system_status: IndexingState::Standby,
            message: String::new(),
            processed_items: 0,
            total_items: 0,
            current_item_unit: "blocks".to_string(),
        }
    }
}

/// Owns the current [`IndexingStatus`] of one workspace.
#[derive(Debug)]
pub struct StateManager {
    tx: watch::Sender<IndexingStatus>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(IndexingStatus::default());
        Self { tx }
    }

    #[must_use]
    pub fn state(&self) -> IndexingState {
        self.tx.borrow().system_status
    }

    #[must_use]
    pub fn status(&self) -> IndexingStatus {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IndexingStatus> {
        self.tx.subscribe()
    }

    /// Switch state; progress counters reset when leaving `Indexing`.
    pub fn set_system_state(&self, state: IndexingState, message: impl Into<String>) {
        let message = message.into();
        log::info!("Index state: {state} ({message})");
        self.tx.send_modify(|status| {
            if status.system_status != state && state != IndexingState::Indexing {
                status.processed_items = 0;
                status.total_items = 0;
                status.current_item_unit = "blocks".to_string();
            }
            status.system_status = state;
            status.message = message;
        });
    }

    pub fn report_block_progress(&self, indexed: usize, found: usize) {
        self.tx.send_modify(|status| {
            status.system_status = IndexingState::Indexing;
            status.processed_items = indexed;
            status.total_items = found;
            status.current_item_unit = "blocks".to_string();
            status.message = format!("Indexed {indexed} / {found} blocks found");
        });
    }

    pub fn report_file_queue_progress(&self, processed: usize, total: usize, current_file: Option<&str>) {
        self.tx.send_modify(|status| {
            status.processed_items = processed;
            status.total_items = total;
            status.current_item_unit = "files".to_string();
            if processed < total {
                status.system_status = IndexingState::Indexing;
                status.message = match current_file {
                    Some(file) => format!("Processing {processed} / {total} files. Current: {file}"),
                    None => format!("Processing {processed} / {total} files"),
                };
            } else {
                status.system_status = IndexingState::Indexed;
                status.message = format!("Finished processing {total} files from queue");
            }
        });
    }
}
