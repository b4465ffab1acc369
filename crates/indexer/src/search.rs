use crate::config::SearchConfig;
use crate::error::{IndexerError, Result};
use crate::state::{IndexingState, StateManager};
use codeindex_vector_store::{relative_path, Embedder, SearchHit, VectorStore, VectorStoreError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub score: f32,
    /// Workspace-relative
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code_chunk: String,
    pub hierarchy_display: Option<String>,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            score: hit.score,
            file_path: hit.payload.file_path,
            start_line: hit.payload.start_line,
            end_line: hit.payload.end_line,
            code_chunk: hit.payload.code_chunk,
            hierarchy_display: hit.payload.hierarchy_display,
        }
    }
}

pub struct SearchService {
    workspace_root: PathBuf,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    state: Arc<StateManager>,
    config: SearchConfig,
}

impl SearchService {
    #[must_use]
    pub fn new(
        workspace_root: &Path,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        state: Arc<StateManager>,
        config: SearchConfig,
    ) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            embedder,
            store,
            state,
            config,
        }
    }

    /// Blocks most similar to `query`, best first. Only answers once the index
    /// is at least partially built.
    pub async fn search_index(&self, query: &str, directory_prefix: Option<&str>) -> Result<Vec<SearchResult>> {
        let state = self.state.state();
        if !matches!(state, IndexingState::Indexed | IndexingState::Indexing) {
            return Err(IndexerError::NotReady(state.to_string()));
        }

        let response = self
            .embedder
            .create_embeddings(&[query.to_string()], None)
            .await?;
        let vector = response.embeddings.into_iter().next().ok_or_else(|| {
            VectorStoreError::EmbeddingError("no embedding returned for query".into())
        })?;

        let prefix = directory_prefix.and_then(|prefix| self.normalize_prefix(prefix));
        let hits = self
            .store
            .search(
                vector,
                prefix.as_deref(),
                self.config.min_score,
                self.config.max_results,
            )
            .await?;
        log::debug!("Search for {query:?} returned {} hits", hits.len());
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    /// Workspace-relative `/`-separated prefix; `None` means the whole workspace.
    fn normalize_prefix(&self, prefix: &str) -> Option<String> {
        let path = Path::new(prefix);
        let relative = if path.is_absolute() {
            relative_path(&self.workspace_root, path)
        } else {
            prefix.replace('\\', "/")
        };
        let trimmed = relative.trim_start_matches("./").trim_matches('/');
        (!trimmed.is_empty() && trimmed != ".").then(|| trimmed.to_string())
    }
}
