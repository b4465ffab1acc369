//! Per-workspace entry point and the registry that owns one manager per root.

use crate::cache::CacheManager;
use crate::config::CodeIndexConfig;
use crate::error::{IndexerError, Result};
use crate::ignore_rules::IgnoreRules;
use crate::orchestrator::Orchestrator;
use crate::search::{SearchResult, SearchService};
use crate::services::IndexServices;
use crate::state::{IndexingState, IndexingStatus, StateManager};
use codeindex_chunker::CodeParser;
use codeindex_vector_store::{create_embedder, Embedder, QdrantVectorStore, VectorStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

struct ActiveServices {
    orchestrator: Arc<Orchestrator>,
    search: Arc<SearchService>,
    services: IndexServices,
}

/// Indexing for one workspace root. Without a usable configuration the manager
/// stays in `Standby` and every operation is a logged no-op.
pub struct CodeIndexManager {
    workspace_root: PathBuf,
    cache_dir: PathBuf,
    state: Arc<StateManager>,
    config: Mutex<CodeIndexConfig>,
    active: Mutex<Option<Arc<ActiveServices>>>,
}

impl CodeIndexManager {
    #[must_use]
    pub fn new(workspace_root: &Path, cache_dir: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
            state: Arc::new(StateManager::new()),
            config: Mutex::new(CodeIndexConfig::default()),
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    #[must_use]
    pub fn config(&self) -> CodeIndexConfig {
        lock(&self.config).clone()
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Build the embedder and Qdrant store described by `config`.
    pub async fn initialize(&self, config: CodeIndexConfig) -> Result<()> {
        if !config.enabled || !config.is_configured() {
            self.dispose().await;
            self.set_unconfigured(config);
            return Ok(());
        }
        let dimension = config
            .embedder
            .dimension()
            .ok_or(IndexerError::NotConfigured)?;
        let embedder = create_embedder(&config.embedder)?;
        let store: Arc<dyn VectorStore> =
            Arc::new(QdrantVectorStore::new(&self.workspace_root, &config.qdrant, dimension)?);
        self.initialize_with(config, embedder, store).await
    }

    /// Wire the pipeline around the given providers.
    pub async fn initialize_with(
        &self,
        config: CodeIndexConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<()> {
        self.dispose().await;

        let ignore = IgnoreRules::load(&self.workspace_root, &config.ignore)?;
        let cache = CacheManager::new(
            &self.workspace_root,
            &self.cache_dir,
            config.tuning.cache_persist_debounce(),
        );
        cache.initialize().await;

        let services = IndexServices {
            workspace_root: self.workspace_root.clone(),
            tuning: config.tuning.clone(),
            parser: Arc::new(CodeParser::new(config.tuning.chunker_config())),
            ignore: Arc::new(ignore),
            cache: Arc::new(cache),
            embedder,
            store,
        };
        let active = self.build_active(services, &config);
        *lock(&self.active) = Some(Arc::new(active));
        *lock(&self.config) = config;
        log::info!("Code index ready for {}", self.workspace_root.display());
        Ok(())
    }

    fn build_active(&self, services: IndexServices, config: &CodeIndexConfig) -> ActiveServices {
        ActiveServices {
            orchestrator: Arc::new(Orchestrator::new(services.clone(), self.state.clone())),
            search: Arc::new(SearchService::new(
                &self.workspace_root,
                services.embedder.clone(),
                services.store.clone(),
                self.state.clone(),
                config.search,
            )),
            services,
        }
    }

    fn set_unconfigured(&self, config: CodeIndexConfig) {
        let message = if config.enabled {
            "Code indexing is not configured."
        } else {
            "Code indexing is disabled."
        };
        *lock(&self.config) = config;
        self.state.set_system_state(IndexingState::Standby, message);
    }

    fn active(&self) -> Option<Arc<ActiveServices>> {
        lock(&self.active).clone()
    }

    pub async fn start_indexing(&self) -> Result<()> {
        let Some(active) = self.active() else {
            log::info!(
                "Skipping indexing of {}: not configured",
                self.workspace_root.display()
            );
            return Ok(());
        };
        active.orchestrator.start_indexing().await
    }

    pub fn stop_watcher(&self) {
        if let Some(active) = self.active() {
            active.orchestrator.stop_watcher();
        }
    }

    pub async fn clear_index_data(&self) -> Result<()> {
        let active = self.active().ok_or(IndexerError::NotConfigured)?;
        active.orchestrator.clear_index_data().await
    }

    pub async fn search_index(&self, query: &str, directory_prefix: Option<&str>) -> Result<Vec<SearchResult>> {
        let active = self.active().ok_or(IndexerError::NotConfigured)?;
        active.search.search_index(query, directory_prefix).await
    }

    #[must_use]
    pub fn status(&self) -> IndexingStatus {
        self.state.status()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<IndexingStatus> {
        self.state.subscribe()
    }

    /// Apply new settings. Returns `true` when the services were rebuilt; indexing
    /// restarts then if the new settings are usable.
    pub async fn handle_settings_change(&self, config: CodeIndexConfig) -> Result<bool> {
        if !self.config().requires_restart(&config) {
            // Only search settings apply live; tuning waits for the next restart
            if let Some(active) = self.active() {
                let search = Arc::new(SearchService::new(
                    &self.workspace_root,
                    active.services.embedder.clone(),
                    active.services.store.clone(),
                    self.state.clone(),
                    config.search,
                ));
                *lock(&self.active) = Some(Arc::new(ActiveServices {
                    orchestrator: active.orchestrator.clone(),
                    search,
                    services: active.services.clone(),
                }));
            }
            *lock(&self.config) = config;
            return Ok(false);
        }

        log::info!("Settings changed; restarting code index services");
        self.initialize(config).await?;
        if self.is_configured() {
            self.start_indexing().await?;
        }
        Ok(true)
    }

    /// Stop watching and persist the cache.
    pub async fn dispose(&self) {
        let active = lock(&self.active).take();
        if let Some(active) = active {
            active.orchestrator.dispose().await;
            if self.state.state() != IndexingState::Error {
                self.state
                    .set_system_state(IndexingState::Standby, "Code index stopped.");
            }
        }
    }
}

/// Managers by workspace root. Created by the entry point and handed to whoever
/// needs a workspace's index.
pub struct ManagerRegistry {
    cache_dir: PathBuf,
    managers: Mutex<HashMap<PathBuf, Arc<CodeIndexManager>>>,
}

impl ManagerRegistry {
    #[must_use]
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// The manager for `workspace_root`, created on first use.
    pub fn get_or_create(&self, workspace_root: &Path) -> Result<Arc<CodeIndexManager>> {
        let root = canonical_root(workspace_root)?;
        let mut managers = lock(&self.managers);
        let manager = managers
            .entry(root)
            .or_insert_with_key(|root| Arc::new(CodeIndexManager::new(root, &self.cache_dir)));
        Ok(manager.clone())
    }

    #[must_use]
    pub fn get(&self, workspace_root: &Path) -> Option<Arc<CodeIndexManager>> {
        let root = canonical_root(workspace_root).ok()?;
        lock(&self.managers).get(&root).cloned()
    }

    pub async fn dispose_all(&self) {
        let managers: Vec<Arc<CodeIndexManager>> = lock(&self.managers).drain().map(|(_, m)| m).collect();
        for manager in managers {
            manager.dispose().await;
        }
    }
}

fn canonical_root(path: &Path) -> Result<PathBuf> {
    let root = std::fs::canonicalize(path)
        .map_err(|e| IndexerError::InvalidPath(format!("{}: {e}", path.display())))?;
    if !root.is_dir() {
        return Err(IndexerError::InvalidPath(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    Ok(root)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_manager_stays_in_standby() {
        let workspace = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let manager = CodeIndexManager::new(workspace.path(), cache.path());
        manager.initialize(CodeIndexConfig::default()).await.unwrap();

        assert!(!manager.is_configured());
        manager.start_indexing().await.unwrap();
        assert_eq!(manager.status().system_status, IndexingState::Standby);
        assert!(matches!(
            manager.search_index("query", None).await,
            Err(IndexerError::NotConfigured)
        ));
    }

    #[test]
    fn registry_hands_out_one_manager_per_root() {
        let workspace = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let registry = ManagerRegistry::new(cache.path());

        let first = registry.get_or_create(workspace.path()).unwrap();
        let second = registry
            .get_or_create(&workspace.path().join("."))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.get(workspace.path()).is_some());
        assert!(registry.get_or_create(&workspace.path().join("missing")).is_err());
    }
}
