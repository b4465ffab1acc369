//! Content-hash cache used for change detection.
//!
//! The cache maps absolute file paths to the hash of the content that currently
//! backs their points in the vector store. Mutations are applied in memory right
//! away and written to disk after a quiet period.

use crate::debounce::DebounceTimer;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type HashMapRef = Arc<Mutex<HashMap<String, String>>>;

pub struct CacheManager {
    cache_path: PathBuf,
    hashes: HashMapRef,
    persist_timer: DebounceTimer,
}

impl CacheManager {
    /// Cache for `workspace_root`, stored as a file under `cache_dir`.
    #[must_use]
    pub fn new(workspace_root: &Path, cache_dir: &Path, persist_debounce: Duration) -> Self {
        Self {
            cache_path: cache_file_path(workspace_root, cache_dir),
            hashes: Arc::new(Mutex::new(HashMap::new())),
            persist_timer: DebounceTimer::new(persist_debounce),
        }
    }

    #[must_use]
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Load the persisted map. A missing or unreadable file starts an empty cache.
    pub async fn initialize(&self) {
        let loaded = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(err) => {
                    log::warn!(
                        "Ignoring corrupt cache file {}: {err}",
                        self.cache_path.display()
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                log::warn!("Failed to read cache {}: {err}", self.cache_path.display());
                HashMap::new()
            }
        };
        log::debug!("Loaded {} cached file hashes", loaded.len());
        *self.lock() = loaded;
    }

    #[must_use]
    pub fn get_hash(&self, file_path: &str) -> Option<String> {
        self.lock().get(file_path).cloned()
    }

    pub fn update_hash(&self, file_path: &str, hash: &str) {
        self.lock().insert(file_path.to_string(), hash.to_string());
        self.schedule_persist();
    }

    pub fn delete_hash(&self, file_path: &str) {
        if self.lock().remove(file_path).is_some() {
            self.schedule_persist();
        }
    }

    pub fn delete_hashes(&self, file_paths: &[String]) {
        let removed = {
            let mut hashes = self.lock();
            file_paths
                .iter()
                .filter(|path| hashes.remove(path.as_str()).is_some())
                .count()
        };
        if removed > 0 {
            self.schedule_persist();
        }
    }

    /// Snapshot of every entry; changes to it never reach the cache.
    #[must_use]
    pub fn get_all_hashes(&self) -> HashMap<String, String> {
        self.lock().clone()
    }

    /// Empty the cache and write `{}` immediately.
    pub async fn clear_cache_file(&self) -> Result<()> {
        self.persist_timer.cancel();
        self.lock().clear();
        write_cache_file(&self.cache_path, &HashMap::new()).await?;
        log::info!("Cleared cache file {}", self.cache_path.display());
        Ok(())
    }

    /// Write pending changes now instead of waiting for the debounce.
    pub async fn flush(&self) -> Result<()> {
        self.persist_timer.cancel();
        let snapshot = self.get_all_hashes();
        write_cache_file(&self.cache_path, &snapshot).await
    }

    fn schedule_persist(&self) {
        let hashes = self.hashes.clone();
        let path = self.cache_path.clone();
        self.persist_timer.schedule(async move {
            let snapshot = hashes.lock().unwrap_or_else(PoisonError::into_inner).clone();
            if let Err(err) = write_cache_file(&path, &snapshot).await {
                log::error!("Failed to persist cache {}: {err}", path.display());
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.hashes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `<cache_dir>/codeindex-cache-<sha256(root)>.json`
#[must_use]
pub fn cache_file_path(workspace_root: &Path, cache_dir: &Path) -> PathBuf {
    let digest = Sha256::digest(workspace_root.to_string_lossy().as_bytes());
    cache_dir.join(format!("codeindex-cache-{digest:x}.json"))
}

/// Platform cache directory, falling back to the system temp dir.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("codeindex")
}

async fn write_cache_file(path: &Path, hashes: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(hashes)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEBOUNCE: Duration = Duration::from_millis(20);

    fn manager(dir: &Path) -> CacheManager {
        CacheManager::new(Path::new("/ws"), dir, DEBOUNCE)
    }

    #[tokio::test]
    async fn updates_persist_after_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let cache = manager(dir.path());
        cache.initialize().await;
        cache.update_hash("/ws/a.rs", "h1");
        cache.update_hash("/ws/b.rs", "h2");
        tokio::time::sleep(DEBOUNCE * 10).await;

        let reloaded = manager(dir.path());
        reloaded.initialize().await;
        assert_eq!(reloaded.get_hash("/ws/a.rs").as_deref(), Some("h1"));
        assert_eq!(reloaded.get_hash("/ws/b.rs").as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn clear_writes_empty_object_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let cache = manager(dir.path());
        cache.update_hash("/ws/a.rs", "h1");
        cache.clear_cache_file().await.unwrap();

        let raw = tokio::fs::read_to_string(cache.cache_path()).await.unwrap();
        assert_eq!(raw, "{}");
        tokio::time::sleep(DEBOUNCE * 5).await;
        let reloaded = manager(dir.path());
        reloaded.initialize().await;
        assert!(reloaded.get_all_hashes().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = manager(dir.path());
        tokio::fs::write(cache.cache_path(), "not json").await.unwrap();
        cache.initialize().await;
        assert!(cache.get_all_hashes().is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_detached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = manager(dir.path());
        cache.update_hash("/ws/a.rs", "h1");
        let mut copy = cache.get_all_hashes();
        copy.insert("/ws/evil.rs".into(), "x".into());
        copy.remove("/ws/a.rs");
        assert_eq!(cache.get_hash("/ws/a.rs").as_deref(), Some("h1"));
        assert_eq!(cache.get_hash("/ws/evil.rs"), None);
    }

    #[tokio::test]
    async fn delete_hashes_removes_only_listed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = manager(dir.path());
        cache.update_hash("/ws/a.rs", "h1");
        cache.update_hash("/ws/b.rs", "h2");
        cache.delete_hashes(&["/ws/a.rs".to_string(), "/ws/missing.rs".to_string()]);
        assert_eq!(cache.get_hash("/ws/a.rs"), None);
        assert_eq!(cache.get_hash("/ws/b.rs").as_deref(), Some("h2"));
        cache.flush().await.unwrap();
    }

    #[test]
    fn cache_files_differ_per_workspace() {
        let dir = Path::new("/tmp/cache");
        assert_ne!(
            cache_file_path(Path::new("/a"), dir),
            cache_file_path(Path::new("/b"), dir)
        );
    }
}
