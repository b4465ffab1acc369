//! Qdrant-backed [`VectorStore`].

use crate::error::{Result, VectorStoreError};
use crate::point::{collection_name, split_segments, PointPayload, SearchHit, VectorPoint};
use crate::store::VectorStore;
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointId, PointStruct, ScoredPoint, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Directory depth covered by payload indexes for prefix search
const INDEXED_PATH_SEGMENTS: usize = 5;
const SCROLL_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QDRANT_URL.to_string(),
            api_key: None,
        }
    }
}

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    vector_size: u64,
}

impl QdrantVectorStore {
    pub fn new(workspace_root: &Path, config: &QdrantConfig, vector_size: usize) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(VectorStoreError::Configuration("Qdrant URL is required".into()));
        }
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(key) = config.api_key.as_ref().filter(|k| !k.is_empty()) {
            builder = builder.api_key(key.clone());
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            collection: collection_name(workspace_root),
            vector_size: vector_size as u64,
        })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Vector size of the existing collection, `None` when it does not exist.
    async fn existing_vector_size(&self) -> Result<Option<u64>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(None);
        }
        let info = self.client.collection_info(&self.collection).await?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                VectorsConfig::Params(params) => Some(params.size),
                VectorsConfig::ParamsMap(_) => None,
            });
        // Named vectors or an unreadable config never match
        Ok(Some(size.unwrap_or(0)))
    }

    async fn create_collection(&self) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine)),
            )
            .await?;
        log::info!(
            "Created collection '{}' (size={})",
            self.collection,
            self.vector_size
        );
        Ok(())
    }

    async fn create_payload_indexes(&self) {
        for i in 0..INDEXED_PATH_SEGMENTS {
            let field = format!("pathSegments.{i}");
            let request =
                CreateFieldIndexCollectionBuilder::new(&self.collection, &field, FieldType::Keyword);
            if let Err(err) = self.client.create_field_index(request).await {
                log::warn!("Could not index payload field {field}: {err}");
            }
        }
    }

    async fn scroll_file_paths(&self) -> Result<Vec<String>> {
        let mut paths = BTreeSet::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }
            let response = self.client.scroll(request).await?;
            for point in response.result {
                if let Some(Kind::StringValue(path)) =
                    point.payload.get("filePath").and_then(|v| v.kind.clone())
                {
                    paths.insert(path);
                }
            }
            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(paths.into_iter().collect())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn initialize(&self) -> Result<bool> {
        let created = match self.existing_vector_size().await? {
            None => {
                self.create_collection().await?;
                true
            }
            Some(size) if size != self.vector_size => {
                log::warn!(
                    "Collection '{}' has vector size {size}, expected {}; recreating",
                    self.collection,
                    self.vector_size
                );
                self.client.delete_collection(&self.collection).await?;
                self.create_collection().await?;
                true
            }
            Some(_) => false,
        };
        self.create_payload_indexes().await;
        Ok(created)
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let mut structs = Vec::with_capacity(count);
        for point in points {
            if point.vector.len() as u64 != self.vector_size {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.vector_size as usize,
                    actual: point.vector.len(),
                });
            }
            let payload = Payload::try_from(serde_json::to_value(&point.payload)?)?;
            structs.push(PointStruct::new(point.id, point.vector, payload));
        }
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, structs).wait(true))
            .await?;
        log::debug!("Upserted {count} points into '{}'", self.collection);
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        directory_prefix: Option<&str>,
        min_score: f32,
        max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut request = SearchPointsBuilder::new(&self.collection, vector, max_results as u64)
            .with_payload(true)
            .score_threshold(min_score);
        if let Some(filter) = directory_prefix.and_then(prefix_filter) {
            request = request.filter(filter);
        }
        let response = self.client.search_points(request).await?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            match scored_to_hit(point) {
                Ok(hit) => hits.push(hit),
                Err(err) => log::warn!("Skipping search hit with unreadable payload: {err}"),
            }
        }
        Ok(hits)
    }

    async fn delete_points_by_multiple_file_paths(&self, file_paths: &[String]) -> Result<()> {
        if file_paths.is_empty() {
            return Ok(());
        }
        let filter = Filter::should(
            file_paths
                .iter()
                .map(|path| Condition::matches("filePath", path.clone())),
        );
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await?;
        log::debug!(
            "Deleted points of {} files from '{}'",
            file_paths.len(),
            self.collection
        );
        Ok(())
    }

    async fn clear_collection(&self) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Filter::default())
                    .wait(true),
            )
            .await?;
        log::info!("Cleared collection '{}'", self.collection);
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            self.client.delete_collection(&self.collection).await?;
            log::info!("Deleted collection '{}'", self.collection);
        }
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(self.client.collection_exists(&self.collection).await?)
    }

    async fn get_all_file_paths(&self) -> Vec<String> {
        match self.scroll_file_paths().await {
            Ok(paths) => paths,
            Err(err) => {
                log::warn!(
                    "Could not list indexed files of '{}': {err}",
                    self.collection
                );
                Vec::new()
            }
        }
    }
}

/// Every segment of the prefix must match at its depth.
fn prefix_filter(prefix: &str) -> Option<Filter> {
    let conditions: Vec<Condition> = split_segments(prefix)
        .enumerate()
        .map(|(i, segment)| Condition::matches(format!("pathSegments.{i}"), segment.to_string()))
        .collect();
    (!conditions.is_empty()).then(|| Filter::must(conditions))
}

fn scored_to_hit(point: ScoredPoint) -> Result<SearchHit> {
    let id = match point.id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };
    let payload: serde_json::Map<String, serde_json::Value> = point
        .payload
        .into_iter()
        .map(|(key, value)| (key, value.into_json()))
        .collect();
    let payload: PointPayload = serde_json::from_value(serde_json::Value::Object(payload))?;
    Ok(SearchHit {
        id,
        score: point.score,
        payload,
    })
}
