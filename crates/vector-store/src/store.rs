use crate::error::Result;
use crate::point::{SearchHit, VectorPoint};
use async_trait::async_trait;

/// Remote home of the embedded blocks of one workspace.
///
/// File paths passed in and returned are workspace-relative and `/`-separated,
/// matching [`PointPayload::file_path`](crate::PointPayload::file_path).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Make sure the collection exists with the right shape. Returns `true` when
    /// a brand-new collection was created, which invalidates any local cache.
    async fn initialize(&self) -> Result<bool>;

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Nearest neighbours of `vector`, optionally restricted to a directory prefix.
    async fn search(
        &self,
        vector: Vec<f32>,
        directory_prefix: Option<&str>,
        min_score: f32,
        max_results: usize,
    ) -> Result<Vec<SearchHit>>;

    async fn delete_points_by_file_path(&self, file_path: &str) -> Result<()> {
        self.delete_points_by_multiple_file_paths(&[file_path.to_string()])
            .await
    }

    async fn delete_points_by_multiple_file_paths(&self, file_paths: &[String]) -> Result<()>;

    /// Remove every point but keep the collection.
    async fn clear_collection(&self) -> Result<()>;

    async fn delete_collection(&self) -> Result<()>;

    async fn collection_exists(&self) -> Result<bool>;

    /// Distinct file paths with at least one point. Returns an empty list when the
    /// store cannot be read, so callers never mistake an outage for "all stale".
    async fn get_all_file_paths(&self) -> Vec<String>;
}
