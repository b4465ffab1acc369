mod common;

use codeindex_chunker::content_hash;
use codeindex_indexer::{
    CacheManager, CodeIndexConfig, CodeIndexManager, IndexerError, IndexingState,
};
use common::{fast_tuning, python_function, RecordingEmbedder, RecordingStore, StoreOp};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn config() -> CodeIndexConfig {
    CodeIndexConfig {
        tuning: fast_tuning(),
        ..CodeIndexConfig::default()
    }
}

async fn manager(workspace: &Path, cache_dir: &Path, store: Arc<RecordingStore>) -> CodeIndexManager {
    let manager = CodeIndexManager::new(workspace, cache_dir);
    manager
        .initialize_with(config(), Arc::new(RecordingEmbedder::default()), store)
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn successful_run_ends_indexed_and_serves_search() {
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    fs::write(workspace.path().join("a.py"), python_function("accumulate", 4)).unwrap();
    let store = Arc::new(RecordingStore::default());
    let manager = manager(workspace.path(), cache_dir.path(), store.clone()).await;
    assert_eq!(manager.status().system_status, IndexingState::Standby);

    manager.start_indexing().await.unwrap();

    let status = manager.status();
    assert_eq!(status.system_status, IndexingState::Indexed);
    assert!(status.message.contains("File watcher started"));
    assert_eq!(store.ops().first(), Some(&StoreOp::Initialize));

    let hits = manager.search_index("accumulate totals", None).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].file_path, "a.py");
    assert!(manager.search_index("x", Some("src/")).await.unwrap().is_empty());

    manager.stop_watcher();
    assert_eq!(manager.status().system_status, IndexingState::Standby);
    assert!(matches!(
        manager.search_index("accumulate", None).await,
        Err(IndexerError::NotReady(_))
    ));
    manager.dispose().await;
}

#[tokio::test]
async fn failed_scan_ends_in_error_with_index_discarded() {
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    fs::write(workspace.path().join("a.py"), python_function("accumulate", 4)).unwrap();
    let store = Arc::new(RecordingStore::default());
    store.fail_upserts();
    let manager = manager(workspace.path(), cache_dir.path(), store.clone()).await;

    let err = manager.start_indexing().await.unwrap_err();
    assert!(matches!(err, IndexerError::ScanFailed(_)));

    let status = manager.status();
    assert_eq!(status.system_status, IndexingState::Error);
    assert!(status.message.starts_with("Failed during initial scan"));
    assert_eq!(store.ops(), vec![StoreOp::Initialize, StoreOp::Clear]);

    let cache = CacheManager::new(workspace.path(), cache_dir.path(), Duration::from_millis(10));
    assert_eq!(fs::read_to_string(cache.cache_path()).unwrap(), "{}");

    manager.stop_watcher();
    assert_eq!(manager.status().system_status, IndexingState::Error);
}

#[tokio::test]
async fn new_collection_discards_the_old_cache() {
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let source = python_function("accumulate", 4);
    let a_path = workspace.path().join("a.py");
    fs::write(&a_path, &source).unwrap();

    let previous = CacheManager::new(workspace.path(), cache_dir.path(), Duration::from_millis(10));
    previous.update_hash(&a_path.to_string_lossy(), &content_hash(&source));
    previous.flush().await.unwrap();
    drop(previous);

    let store = Arc::new(RecordingStore::default());
    let manager = manager(workspace.path(), cache_dir.path(), store.clone()).await;
    manager.start_indexing().await.unwrap();

    assert_eq!(store.upsert_count(), 1);
    manager.dispose().await;
}

#[tokio::test]
async fn points_unknown_to_the_cache_are_removed_before_scanning() {
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordingStore::existing());
    store.seed("ghost.py", 1);
    let manager = manager(workspace.path(), cache_dir.path(), store.clone()).await;

    manager.start_indexing().await.unwrap();

    assert_eq!(
        store.ops(),
        vec![
            StoreOp::Initialize,
            StoreOp::Delete(vec!["ghost.py".to_string()]),
        ]
    );
    assert_eq!(manager.status().message, "Index up-to-date. File watcher started.");
    manager.dispose().await;
}

#[tokio::test]
async fn clearing_index_data_returns_to_standby() {
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    fs::write(workspace.path().join("a.py"), python_function("accumulate", 4)).unwrap();
    let store = Arc::new(RecordingStore::default());
    let manager = manager(workspace.path(), cache_dir.path(), store.clone()).await;
    manager.start_indexing().await.unwrap();

    manager.clear_index_data().await.unwrap();

    assert_eq!(manager.status().system_status, IndexingState::Standby);
    assert_eq!(store.ops().last(), Some(&StoreOp::DeleteCollection));
    assert_eq!(store.point_count(), 0);
}

#[tokio::test]
async fn watcher_picks_up_new_files_after_the_scan() {
    let workspace = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordingStore::default());
    let manager = manager(workspace.path(), cache_dir.path(), store.clone()).await;
    manager.start_indexing().await.unwrap();
    let mut status = manager.subscribe_status();

    fs::write(workspace.path().join("late.py"), python_function("late_arrival", 3)).unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            status.changed().await.unwrap();
            let current = status.borrow().clone();
            if current.message.starts_with("Processed") {
                return current;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(finished.system_status, IndexingState::Indexed);
    assert!(store
        .ops()
        .contains(&StoreOp::Upsert(vec!["late.py".to_string()])));
    manager.dispose().await;
}
