use crate::block::{char_len, content_hash, ChunkSource, CodeBlock};
use crate::config::ChunkerConfig;
use crate::dedup::deduplicate_blocks;
use crate::definitions::{collect_definitions, container_type, node_identifier};
use crate::error::{ChunkerError, Result};
use crate::hierarchy::{hierarchy_display, parent_chain};
use crate::language::Language;
use crate::line_chunker::LineChunker;
use crate::sink::{BlockDraft, BlockSink};
use std::collections::VecDeque;
use std::path::Path;
use tree_sitter::{Node, Parser};

const FALLBACK_CHUNK: &str = "fallback_chunk";

/// Turns one file's text into embeddable [`CodeBlock`]s.
#[derive(Debug, Clone, Default)]
pub struct CodeParser {
    config: ChunkerConfig,
}

impl CodeParser {
    #[must_use]
    pub const fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Parse `content` into blocks. Failures are logged and yield no blocks so a
    /// single malformed file never aborts a scan.
    #[must_use]
    pub fn parse(&self, file_path: &str, content: &str, file_hash: &str) -> Vec<CodeBlock> {
        match self.try_parse(file_path, content, file_hash) {
            Ok(blocks) => blocks,
            Err(err) => {
                log::warn!("Failed to parse {file_path}: {err}");
                Vec::new()
            }
        }
    }

    /// Read, hash and parse a file from disk.
    pub async fn parse_file(&self, path: &Path) -> Vec<CodeBlock> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) => {
                log::warn!("Failed to read {}: {err}", path.display());
                return Vec::new();
            }
        };
        let file_hash = content_hash(&content);
        self.parse(&path.to_string_lossy(), &content, &file_hash)
    }

    /// Like [`parse`](Self::parse) but surfaces grammar failures.
    pub fn try_parse(&self, file_path: &str, content: &str, file_hash: &str) -> Result<Vec<CodeBlock>> {
        let language = Language::from_path(file_path);
        if !language.is_indexable() {
            return Ok(Vec::new());
        }

        let mut sink = BlockSink::new(file_path, file_hash);
        if language.supports_ast() {
            self.chunk_with_grammar(&mut sink, language, file_path, content)?;
        } else {
            self.chunk_whole_file(&mut sink, content);
        }
        Ok(deduplicate_blocks(sink.into_blocks()))
    }

    fn chunk_with_grammar(
        &self,
        sink: &mut BlockSink<'_>,
        language: Language,
        file_path: &str,
        content: &str,
    ) -> Result<()> {
        let grammar = language.tree_sitter_language()?;
        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| ChunkerError::GrammarError {
                language: language.as_str().to_string(),
                message: e.to_string(),
            })?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ChunkerError::parse_failed(file_path))?;
        let source = content.as_bytes();

        let definitions = collect_definitions(language, tree.root_node());
        if definitions.is_empty() {
            self.chunk_whole_file(sink, content);
            return Ok(());
        }

        let effective_max = self.config.effective_max_chars();
        let mut queue: VecDeque<Node<'_>> = definitions.into();
        while let Some(node) = queue.pop_front() {
            let text = &content[node.byte_range()];
            let len = char_len(text);
            if len < self.config.min_block_chars {
                continue;
            }

            if len > effective_max {
                if node.child_count() > 0 {
                    let mut cursor = node.walk();
                    queue.extend(node.children(&mut cursor));
                } else {
                    let chain = parent_chain(node, source);
                    LineChunker {
                        config: &self.config,
                        block_type: node.kind(),
                        parent_chain: &chain,
                    }
                    .chunk(sink, text, node.start_position().row + 1);
                }
                continue;
            }

            let identifier = node_identifier(node, source);
            let chain = parent_chain(node, source);
            let display = hierarchy_display(
                &chain,
                container_type(node),
                node.kind(),
                identifier.as_deref(),
            );
            sink.push(BlockDraft {
                identifier,
                block_type: node.kind().to_string(),
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
                content: text.to_string(),
                chunk_source: ChunkSource::Grammar,
                parent_chain: chain,
                hierarchy_display: display,
                salt: None,
            });
        }
        Ok(())
    }

    fn chunk_whole_file(&self, sink: &mut BlockSink<'_>, content: &str) {
        if char_len(content) < self.config.min_block_chars {
            return;
        }
        LineChunker {
            config: &self.config,
            block_type: FALLBACK_CHUNK,
            parent_chain: &[],
        }
        .chunk(sink, content, 1);
    }
}
