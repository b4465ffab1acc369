#![allow(dead_code)]

use async_trait::async_trait;
use codeindex_chunker::CodeParser;
use codeindex_indexer::{CacheManager, IgnoreRules, IndexServices, TuningConfig};
use codeindex_vector_store::{
    Embedder, EmbeddingResponse, PointPayload, Result, SearchHit, VectorPoint, VectorStore,
    VectorStoreError,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns a tiny deterministic vector per text.
#[derive(Default)]
pub struct RecordingEmbedder {
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingEmbedder {
    pub fn failing() -> Self {
        let embedder = Self::default();
        embedder.fail.store(true, Ordering::SeqCst);
        embedder
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    async fn create_embeddings(&self, texts: &[String], _model: Option<&str>) -> Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VectorStoreError::EmbeddingError("embedding service down".into()));
        }
        self.texts.lock().unwrap().extend(texts.iter().cloned());
        Ok(EmbeddingResponse {
            embeddings: texts
                .iter()
                .map(|text| vec![text.len() as f32, 1.0, 0.5])
                .collect(),
            usage: None,
        })
    }

    fn model_id(&self) -> &str {
        "recording"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Initialize,
    /// Distinct relative file paths of the upserted points
    Upsert(Vec<String>),
    Delete(Vec<String>),
    Clear,
    DeleteCollection,
}

/// In-memory store that logs every mutating call in order.
pub struct RecordingStore {
    ops: Mutex<Vec<StoreOp>>,
    points: Mutex<HashMap<String, VectorPoint>>,
    fresh: AtomicBool,
    fail_upserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            points: Mutex::new(HashMap::new()),
            fresh: AtomicBool::new(true),
            fail_upserts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

impl RecordingStore {
    pub fn existing() -> Self {
        let store = Self::default();
        store.fresh.store(false, Ordering::SeqCst);
        store
    }

    pub fn fail_upserts(&self) {
        self.fail_upserts.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn upsert_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, StoreOp::Upsert(_)))
            .count()
    }

    pub fn point_count(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    /// Seed a point for `relative_path` as if an earlier run had stored it.
    pub fn seed(&self, relative_path: &str, start_line: usize) {
        let point = VectorPoint {
            id: format!("{relative_path}:{start_line}"),
            vector: vec![1.0, 1.0, 1.0],
            payload: PointPayload {
                file_path: relative_path.to_string(),
                code_chunk: "old content".to_string(),
                start_line,
                end_line: start_line + 1,
                chunk_source: None,
                block_type: None,
                identifier: None,
                parent_chain: Vec::new(),
                hierarchy_display: None,
                path_segments: Default::default(),
            },
        };
        self.points.lock().unwrap().insert(point.id.clone(), point);
    }

    fn record(&self, op: StoreOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn initialize(&self) -> Result<bool> {
        self.record(StoreOp::Initialize);
        Ok(self.fresh.swap(false, Ordering::SeqCst))
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Qdrant("upsert rejected".into()));
        }
        let files: BTreeSet<String> = points.iter().map(|p| p.payload.file_path.clone()).collect();
        self.record(StoreOp::Upsert(files.into_iter().collect()));
        let mut stored = self.points.lock().unwrap();
        for point in points {
            stored.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(
        &self,
        _vector: Vec<f32>,
        directory_prefix: Option<&str>,
        _min_score: f32,
        max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let stored = self.points.lock().unwrap();
        let mut hits: Vec<SearchHit> = stored
            .values()
            .filter(|p| directory_prefix.map_or(true, |prefix| p.payload.file_path.starts_with(prefix)))
            .map(|p| SearchHit {
                id: p.id.clone(),
                score: 0.9,
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.payload.file_path.cmp(&b.payload.file_path));
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn delete_points_by_multiple_file_paths(&self, file_paths: &[String]) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Qdrant("delete rejected".into()));
        }
        let mut sorted = file_paths.to_vec();
        sorted.sort();
        self.record(StoreOp::Delete(sorted));
        self.points
            .lock()
            .unwrap()
            .retain(|_, p| !file_paths.contains(&p.payload.file_path));
        Ok(())
    }

    async fn clear_collection(&self) -> Result<()> {
        self.record(StoreOp::Clear);
        self.points.lock().unwrap().clear();
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.record(StoreOp::DeleteCollection);
        self.points.lock().unwrap().clear();
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(!self.fresh.load(Ordering::SeqCst))
    }

    async fn get_all_file_paths(&self) -> Vec<String> {
        let stored = self.points.lock().unwrap();
        let paths: BTreeSet<String> = stored.values().map(|p| p.payload.file_path.clone()).collect();
        paths.into_iter().collect()
    }
}

pub fn fast_tuning() -> TuningConfig {
    TuningConfig {
        initial_retry_delay_ms: 1,
        cache_persist_debounce_ms: 10,
        watcher_debounce_ms: 50,
        ..TuningConfig::default()
    }
}

pub async fn services(
    root: &Path,
    cache_dir: &Path,
    embedder: Arc<RecordingEmbedder>,
    store: Arc<RecordingStore>,
) -> IndexServices {
    let tuning = fast_tuning();
    let cache = CacheManager::new(root, cache_dir, Duration::from_millis(tuning.cache_persist_debounce_ms));
    cache.initialize().await;
    IndexServices {
        workspace_root: root.to_path_buf(),
        parser: Arc::new(CodeParser::new(tuning.chunker_config())),
        ignore: Arc::new(IgnoreRules::load(root, &[]).unwrap()),
        cache: Arc::new(cache),
        embedder,
        store,
        tuning,
    }
}

pub fn python_function(name: &str, body_lines: usize) -> String {
    let mut source = format!("def {name}(items, threshold):\n    total = 0\n");
    for i in 0..body_lines {
        source.push_str(&format!("    total += items[{i}] * threshold  # step {i}\n"));
    }
    source.push_str("    return total\n");
    source
}

pub fn abs(root: &Path, relative: &str) -> String {
    root.join(relative).to_string_lossy().into_owned()
}
