use codeindex_chunker::{content_hash, ChunkSource, ChunkerConfig, CodeParser, ContainerType};
use pretty_assertions::assert_eq;

fn parse(path: &str, source: &str) -> Vec<codeindex_chunker::CodeBlock> {
    CodeParser::default().parse(path, source, &content_hash(source))
}

fn python_repository_class(methods: usize) -> String {
    let mut source = String::from("class Repository:\n    \"\"\"Stores records on disk.\"\"\"\n\n");
    for n in 0..methods {
        source.push_str(&format!(
            "    def load_{n}(self, key):\n        value = self.storage.get(key)\n        return value or self.default_for(\"{n}\")\n\n"
        ));
    }
    source
}

#[test]
fn parsing_is_idempotent() {
    let source = python_repository_class(30);
    assert_eq!(parse("/repo/store.py", &source), parse("/repo/store.py", &source));
}

#[test]
fn every_block_respects_size_limits() {
    let config = ChunkerConfig::default();
    let source = python_repository_class(40);
    let blocks = parse("/repo/store.py", &source);
    assert!(!blocks.is_empty());
    for block in &blocks {
        let len = block.content.chars().count();
        if block.chunk_source == ChunkSource::LineSegment {
            assert!(len <= config.max_block_chars);
        } else {
            assert!(len >= config.min_block_chars, "too small: {len}");
            assert!(len <= config.effective_max_chars(), "too large: {len}");
        }
    }
}

#[test]
fn oversized_class_is_split_into_methods_with_hierarchy() {
    let blocks = parse("/repo/store.py", &python_repository_class(30));
    let method = blocks
        .iter()
        .find(|b| b.identifier.as_deref() == Some("load_7"))
        .expect("method block");
    assert_eq!(method.block_type, "function_definition");
    assert_eq!(method.chunk_source, ChunkSource::Grammar);
    assert_eq!(method.parent_chain.len(), 1);
    assert_eq!(method.parent_chain[0].identifier, "Repository");
    assert_eq!(method.parent_chain[0].container_type, ContainerType::Class);
    assert_eq!(
        method.hierarchy_display.as_deref(),
        Some("class Repository > method load_7")
    );
}

#[test]
fn small_class_absorbs_its_methods() {
    let source = "class Point:\n    def norm(self):\n        return (self.x ** 2 + self.y ** 2) ** 0.5\n";
    let blocks = parse("/repo/point.py", source);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].block_type, "class_definition");
    assert_eq!(blocks[0].identifier.as_deref(), Some("Point"));
}

#[test]
fn oversized_leaf_comment_falls_back_to_lines() {
    let config = ChunkerConfig::default();
    let mut source = String::from("function render(items) {\n  /*\n");
    for n in 0..60 {
        source.push_str(&format!("   * note {n:02}: rendering keeps the list ordered and stable across frames\n"));
    }
    source.push_str("   */\n  return items.map((item) => item.toString());\n}\n");

    let blocks = parse("/repo/render.js", &source);
    let comment_blocks: Vec<_> = blocks
        .iter()
        .filter(|b| b.chunk_source != ChunkSource::Grammar)
        .collect();
    assert!(comment_blocks.len() >= 2);
    for block in comment_blocks {
        assert_eq!(block.block_type, "comment");
        assert!(block.content.chars().count() <= config.effective_max_chars());
    }
}

#[test]
fn minified_line_pieces_record_their_offsets() {
    let config = ChunkerConfig::default();
    let payload: String = (0..600).map(|n| format!("{n:04}|")).collect();
    let source = format!("const data = \"{payload}\";");
    let blocks = parse("/repo/min.js", &source);

    let offsets: Vec<Option<usize>> = blocks.iter().map(|b| b.line_offset).collect();
    let expected: Vec<Option<usize>> = (0..4).map(|n| Some(n * config.max_block_chars)).collect();
    assert_eq!(offsets, expected);
    assert!(blocks.iter().all(|b| b.chunk_source == ChunkSource::LineSegment));
}

#[test]
fn unsupported_files_produce_no_blocks() {
    assert!(parse("/repo/image.bmp", &"pixel data ".repeat(50)).is_empty());
}

#[test]
fn markdown_uses_whole_file_fallback() {
    let source = "# Title\n\nThis document explains how the indexing pipeline fits together.\n";
    let blocks = parse("/repo/README.md", source);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].block_type, "fallback_chunk");
    assert_eq!(blocks[0].start_line, 1);
    assert_eq!(blocks[0].end_line, 4);
}

#[tokio::test]
async fn parse_file_hashes_disk_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lib.rs");
    let source = "pub fn answer_to_everything() -> u64 {\n    40 + 2\n}\n";
    tokio::fs::write(&path, source).await.unwrap();

    let blocks = CodeParser::default().parse_file(&path).await;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].file_hash, content_hash(source));
    assert_eq!(blocks[0].file_path, path.to_string_lossy());
}
