//! Workspace configuration (`.codeindex.toml`).

use crate::error::Result;
use codeindex_chunker::ChunkerConfig;
use codeindex_vector_store::{EmbedderConfig, EmbedderProvider, QdrantConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".codeindex.toml";

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_COMPATIBLE_API_KEY: &str = "CODEINDEX_OPENAI_COMPATIBLE_API_KEY";
pub const ENV_QDRANT_URL: &str = "QDRANT_URL";
pub const ENV_QDRANT_API_KEY: &str = "QDRANT_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeIndexConfig {
    pub enabled: bool,
    pub embedder: EmbedderConfig,
    pub qdrant: QdrantConfig,
    pub search: SearchConfig,
    /// Extra gitignore-style patterns excluded from indexing
    pub ignore: Vec<String>,
    pub tuning: TuningConfig,
}

impl Default for CodeIndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedder: EmbedderConfig::default(),
            qdrant: QdrantConfig::default(),
            search: SearchConfig::default(),
            ignore: Vec::new(),
            tuning: TuningConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub min_score: f32,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_score: 0.4,
            max_results: 50,
        }
    }
}

/// Pipeline limits. Defaults suit hosted embedding APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub min_block_chars: usize,
    pub max_block_chars: usize,
    pub min_chunk_remainder_chars: usize,
    pub max_chars_tolerance_factor: f64,
    pub max_file_size_bytes: u64,
    pub batch_segment_threshold: usize,
    pub max_batch_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub parsing_concurrency: usize,
    pub batch_processing_concurrency: usize,
    pub max_pending_batches: usize,
    pub max_list_files: usize,
    pub watcher_debounce_ms: u64,
    pub watcher_file_concurrency: usize,
    pub cache_persist_debounce_ms: u64,
    pub slow_scan_warning_secs: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        let chunker = ChunkerConfig::default();
        Self {
            min_block_chars: chunker.min_block_chars,
            max_block_chars: chunker.max_block_chars,
            min_chunk_remainder_chars: chunker.min_chunk_remainder_chars,
            max_chars_tolerance_factor: chunker.max_chars_tolerance_factor,
            max_file_size_bytes: 1024 * 1024,
            batch_segment_threshold: 60,
            max_batch_retries: 3,
            initial_retry_delay_ms: 500,
            parsing_concurrency: 10,
            batch_processing_concurrency: 10,
            max_pending_batches: 20,
            max_list_files: 50_000,
            watcher_debounce_ms: 500,
            watcher_file_concurrency: 10,
            cache_persist_debounce_ms: 1500,
            slow_scan_warning_secs: 5 * 60,
        }
    }
}

impl TuningConfig {
    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            min_block_chars: self.min_block_chars,
            max_block_chars: self.max_block_chars,
            min_chunk_remainder_chars: self.min_chunk_remainder_chars,
            max_chars_tolerance_factor: self.max_chars_tolerance_factor,
        }
    }

    #[must_use]
    pub const fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    #[must_use]
    pub const fn watcher_debounce(&self) -> Duration {
        Duration::from_millis(self.watcher_debounce_ms)
    }

    #[must_use]
    pub const fn cache_persist_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_persist_debounce_ms)
    }

    #[must_use]
    pub const fn slow_scan_warning(&self) -> Duration {
        Duration::from_secs(self.slow_scan_warning_secs)
    }
}

impl CodeIndexConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load `path` if it exists, defaults otherwise. Environment overrides apply
    /// in both cases.
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::from_toml_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => return Err(err.into()),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill secrets and endpoints from the environment. Values already set in the
    /// file win over the environment, except for `QDRANT_URL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let key_var = match self.embedder.provider {
            EmbedderProvider::OpenAi => Some(ENV_OPENAI_API_KEY),
            EmbedderProvider::OpenAiCompatible => Some(ENV_COMPATIBLE_API_KEY),
            EmbedderProvider::Ollama => None,
        };
        if let Some(var) = key_var {
            if self.embedder.api_key.is_none() {
                self.embedder.api_key = lookup(var);
            }
        }
        if let Some(url) = lookup(ENV_QDRANT_URL) {
            self.qdrant.url = url;
        }
        if self.qdrant.api_key.is_none() {
            self.qdrant.api_key = lookup(ENV_QDRANT_API_KEY);
        }
    }

    /// Enough information to build an embedder and reach Qdrant
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.embedder.is_configured() && !self.qdrant.url.trim().is_empty()
    }

    /// Whether moving from `self` to `other` invalidates running services.
    #[must_use]
    pub fn requires_restart(&self, other: &Self) -> bool {
        self.enabled != other.enabled
            || self.is_configured() != other.is_configured()
            || self.embedder.provider != other.embedder.provider
            || self.embedder.model_id() != other.embedder.model_id()
            || self.embedder.base_url != other.embedder.base_url
            || self.embedder.api_key != other.embedder.api_key
            || self.embedder.dimension() != other.embedder.dimension()
            || self.qdrant != other.qdrant
            || self.ignore != other.ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_pipeline_constants() {
        let tuning = TuningConfig::default();
        assert_eq!(tuning.batch_segment_threshold, 60);
        assert_eq!(tuning.max_batch_retries, 3);
        assert_eq!(tuning.chunker_config().effective_max_chars(), 1150);
        assert_eq!(SearchConfig::default().max_results, 50);
    }

    #[test]
    fn parses_partial_toml() {
        let config = CodeIndexConfig::from_toml_str(
            r#"
            ignore = ["fixtures/**"]

            [embedder]
            provider = "ollama"
            model = "nomic-embed-text"

            [tuning]
            parsing_concurrency = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.embedder.provider, EmbedderProvider::Ollama);
        assert_eq!(config.tuning.parsing_concurrency, 4);
        assert_eq!(config.tuning.batch_processing_concurrency, 10);
        assert_eq!(config.ignore, vec!["fixtures/**".to_string()]);
        assert!(config.is_configured());
    }

    #[test]
    fn env_fills_missing_secrets() {
        let mut config = CodeIndexConfig::default();
        assert!(!config.is_configured());
        config.apply_env(|key| match key {
            ENV_OPENAI_API_KEY => Some("sk-env".into()),
            ENV_QDRANT_URL => Some("http://qdrant:6334".into()),
            _ => None,
        });
        assert_eq!(config.embedder.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.qdrant.url, "http://qdrant:6334");
        assert!(config.is_configured());
    }

    #[test]
    fn search_changes_do_not_need_restart() {
        let base = CodeIndexConfig::default();
        let mut tweaked = base.clone();
        tweaked.search.min_score = 0.7;
        assert!(!base.requires_restart(&tweaked));

        tweaked.embedder.model = Some("text-embedding-3-large".into());
        assert!(base.requires_restart(&tweaked));
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CodeIndexConfig::load(&dir.path().join(CONFIG_FILE_NAME))
            .await
            .unwrap();
        assert!(config.enabled);
    }
}
