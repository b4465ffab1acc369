//! `codeindex` - keeps a semantic index of a workspace in Qdrant.
//!
//! ```text
//! codeindex index                    bring the index up to date and exit
//! codeindex watch                    index, then follow file changes until Ctrl-C
//! codeindex search "open the config" [--path src/] [--json]
//! codeindex status                   configuration, collection and cache details
//! codeindex clear                    drop the collection and the local cache
//! ```
//!
//! Settings come from `<workspace>/.codeindex.toml` (or `--config`), with
//! `OPENAI_API_KEY`, `CODEINDEX_OPENAI_COMPATIBLE_API_KEY`, `QDRANT_URL` and
//! `QDRANT_API_KEY` filling the gaps.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use codeindex_indexer::{
    default_cache_dir, CacheManager, CodeIndexConfig, ManagerRegistry, SearchResult,
    CONFIG_FILE_NAME,
};
use codeindex_vector_store::collection_name;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "codeindex")]
#[command(about = "Incremental semantic index of a code workspace", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace root
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Config file (default: <workspace>/.codeindex.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Where content-hash caches live (default: the user cache dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the index up to date and exit
    Index,

    /// Index, then follow file changes until interrupted
    Watch,

    /// Search the index; it is refreshed first
    Search {
        query: String,

        /// Only return results under this directory
        #[arg(long)]
        path: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and cache details
    Status,

    /// Delete the collection and the local cache
    Clear,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    workspace: PathBuf,
    config_file: PathBuf,
    configured: bool,
    provider: &'static str,
    model: String,
    qdrant_url: String,
    collection: String,
    cache_file: PathBuf,
    cached_files: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let cache_dir = cli.cache_dir.clone().unwrap_or_else(default_cache_dir);
    let registry = ManagerRegistry::new(&cache_dir);

    let outcome = run(&cli, &registry, &cache_dir).await;
    registry.dispose_all().await;
    outcome
}

async fn run(cli: &Cli, registry: &ManagerRegistry, cache_dir: &Path) -> Result<()> {
    let manager = registry
        .get_or_create(&cli.workspace)
        .with_context(|| format!("cannot open workspace {}", cli.workspace.display()))?;
    let config_file = config_path(manager.workspace_root(), cli.config.as_deref());
    let config = CodeIndexConfig::load(&config_file)
        .await
        .with_context(|| format!("failed to load {}", config_file.display()))?;

    if matches!(cli.command, Commands::Status) {
        let report = status_report(manager.workspace_root(), &config_file, &config, cache_dir).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    manager
        .initialize(config)
        .await
        .context("failed to set up the code index")?;
    if !manager.is_configured() {
        bail!(
            "{} Configure an embedder in {}",
            manager.status().message,
            config_file.display()
        );
    }

    match &cli.command {
        Commands::Index => {
            manager.start_indexing().await?;
            manager.stop_watcher();
            println!("Index of {} is up to date", manager.workspace_root().display());
        }
        Commands::Watch => {
            manager.start_indexing().await?;
            log::info!("Watching for changes; press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            manager.stop_watcher();
        }
        Commands::Search { query, path, json } => {
            manager.start_indexing().await?;
            let results = manager.search_index(query, path.as_deref()).await?;
            manager.stop_watcher();
            print_results(&results, *json)?;
        }
        Commands::Clear => {
            manager.clear_index_data().await?;
            println!("Cleared index data for {}", manager.workspace_root().display());
        }
        Commands::Status => {}
    }
    Ok(())
}

fn config_path(workspace_root: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| workspace_root.join(CONFIG_FILE_NAME), Path::to_path_buf)
}

async fn status_report(
    workspace_root: &Path,
    config_file: &Path,
    config: &CodeIndexConfig,
    cache_dir: &Path,
) -> StatusReport {
    let cache = CacheManager::new(workspace_root, cache_dir, config.tuning.cache_persist_debounce());
    cache.initialize().await;
    StatusReport {
        workspace: workspace_root.to_path_buf(),
        config_file: config_file.to_path_buf(),
        configured: config.enabled && config.is_configured(),
        provider: config.embedder.provider.as_str(),
        model: config.embedder.model_id().to_string(),
        qdrant_url: config.qdrant.url.clone(),
        collection: collection_name(workspace_root),
        cache_file: cache.cache_path().to_path_buf(),
        cached_files: cache.get_all_hashes().len(),
    }
}

fn print_results(results: &[SearchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No matches");
        return Ok(());
    }
    for result in results {
        let location = format!("{}:{}-{}", result.file_path, result.start_line, result.end_line);
        match &result.hierarchy_display {
            Some(hierarchy) => println!("{:.3}  {location}  ({hierarchy})", result.score),
            None => println!("{:.3}  {location}", result.score),
        }
        for line in result.code_chunk.lines().take(3) {
            println!("        {line}");
        }
    }
    Ok(())
}
