use codeindex_chunker::{CodeBlock, ParentContainer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Namespace for deterministic point ids
pub const POINT_ID_NAMESPACE: Uuid = Uuid::from_u128(0xf47a_c10b_58cc_4372_a567_0e02_b2c3_d479);

/// Stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointPayload {
    /// Workspace-relative, `/`-separated
    pub file_path: String,
    pub code_chunk: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub chunk_source: Option<String>,
    #[serde(rename = "type", default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub parent_chain: Vec<ParentContainer>,
    #[serde(default)]
    pub hierarchy_display: Option<String>,
    /// `"0" -> first directory`, ... for prefix filtering
    #[serde(default)]
    pub path_segments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl VectorPoint {
    /// Build the point for `block`, whose `file_path` is absolute.
    #[must_use]
    pub fn from_block(block: &CodeBlock, workspace_root: &Path, vector: Vec<f32>) -> Self {
        let file_path = relative_path(workspace_root, Path::new(&block.file_path));
        Self {
            id: point_id(&block.file_path, block.start_line, block.end_line, block.line_offset),
            vector,
            payload: PointPayload {
                path_segments: path_segments(&file_path),
                file_path,
                code_chunk: block.content.trim().to_string(),
                start_line: block.start_line,
                end_line: block.end_line,
                chunk_source: Some(block.chunk_source.as_str().to_string()),
                block_type: Some(block.block_type.clone()),
                identifier: block.identifier.clone(),
                parent_chain: block.parent_chain.clone(),
                hierarchy_display: block.hierarchy_display.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// Stable id for a block: same path and line range always map to the same point.
/// Pieces of one oversized line are told apart by their char offset.
#[must_use]
pub fn point_id(absolute_path: &str, start_line: usize, end_line: usize, line_offset: Option<usize>) -> String {
    let mut key = format!("{}:{start_line}:{end_line}", normalize_path(absolute_path));
    if let Some(offset) = line_offset {
        key.push_str(&format!("@{offset}"));
    }
    Uuid::new_v5(&POINT_ID_NAMESPACE, key.as_bytes()).to_string()
}

/// `path` relative to `root` with `/` separators; unrelated paths pass through.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    normalize_path(&relative.to_string_lossy())
}

#[must_use]
pub fn path_segments(relative_path: &str) -> BTreeMap<String, String> {
    split_segments(relative_path)
        .enumerate()
        .map(|(i, segment)| (i.to_string(), segment.to_string()))
        .collect()
}

pub(crate) fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Collection name owned by one workspace
#[must_use]
pub fn collection_name(workspace_root: &Path) -> String {
    let digest = Sha256::digest(workspace_root.to_string_lossy().as_bytes());
    let hex = format!("{digest:x}");
    format!("ws-{}", &hex[..16])
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeindex_chunker::{ChunkSource, ChunkerConfig, CodeParser};
    use std::collections::HashSet;
    use pretty_assertions::assert_eq;

    fn block() -> CodeBlock {
        CodeBlock {
            file_path: "/ws/src/app/main.py".into(),
            identifier: Some("main".into()),
            block_type: "function_definition".into(),
            start_line: 3,
            end_line: 9,
            line_offset: None,
            content: "\n  def main():\n      run()  \n".into(),
            file_hash: "f".into(),
            segment_hash: "s".into(),
            chunk_source: ChunkSource::Grammar,
            parent_chain: Vec::new(),
            hierarchy_display: Some("function main".into()),
        }
    }

    #[test]
    fn point_ids_are_deterministic_and_line_sensitive() {
        assert_eq!(point_id("/ws/a.rs", 1, 4, None), point_id("/ws/a.rs", 1, 4, None));
        assert_ne!(point_id("/ws/a.rs", 1, 4, None), point_id("/ws/a.rs", 1, 5, None));
        assert_eq!(point_id("C:\\ws\\a.rs", 1, 4, None), point_id("C:/ws/a.rs", 1, 4, None));
    }

    #[test]
    fn payload_uses_relative_path_and_trimmed_chunk() {
        let point = VectorPoint::from_block(&block(), Path::new("/ws"), vec![0.5]);
        assert_eq!(point.payload.file_path, "src/app/main.py");
        assert_eq!(point.payload.code_chunk, "def main():\n      run()");
        assert_eq!(point.payload.path_segments.get("0").map(String::as_str), Some("src"));
        assert_eq!(point.payload.path_segments.get("2").map(String::as_str), Some("main.py"));
        assert_eq!(point.id, point_id("/ws/src/app/main.py", 3, 9, None));
    }

    #[test]
    fn pieces_of_one_line_get_distinct_ids() {
        let first = point_id("/ws/min.js", 1, 1, Some(0));
        let second = point_id("/ws/min.js", 1, 1, Some(1000));
        assert_ne!(first, second);
        assert_ne!(first, point_id("/ws/min.js", 1, 1, None));
        assert_eq!(second, point_id("/ws/min.js", 1, 1, Some(1000)));
    }

    #[test]
    fn minified_line_keeps_one_point_per_piece() {
        let source = format!("const data = \"{}\";", "a".repeat(3000));
        let blocks = CodeParser::new(ChunkerConfig::default()).parse("/ws/min.js", &source, "h");
        assert!(blocks.len() > 1);

        let ids: HashSet<String> = blocks
            .iter()
            .map(|block| VectorPoint::from_block(block, Path::new("/ws"), vec![0.0]).id)
            .collect();
        assert_eq!(ids.len(), blocks.len());
    }

    #[test]
    fn payload_serializes_with_camel_case_keys() {
        let point = VectorPoint::from_block(&block(), Path::new("/ws"), vec![0.5]);
        let json = serde_json::to_value(&point.payload).unwrap();
        assert_eq!(json["filePath"], "src/app/main.py");
        assert_eq!(json["type"], "function_definition");
        assert_eq!(json["chunkSource"], "grammar");
        assert_eq!(json["pathSegments"]["1"], "app");
    }

    #[test]
    fn collection_names_are_short_and_stable() {
        let name = collection_name(Path::new("/home/dev/project"));
        assert!(name.starts_with("ws-"));
        assert_eq!(name.len(), 19);
        assert_eq!(name, collection_name(Path::new("/home/dev/project")));
    }
}
