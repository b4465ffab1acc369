use crate::block::{segment_hash, ChunkSource, CodeBlock, ParentContainer};
use std::collections::HashSet;

/// Fields of a block before its segment hash is known
pub(crate) struct BlockDraft {
    pub identifier: Option<String>,
    pub block_type: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub chunk_source: ChunkSource,
    pub parent_chain: Vec<ParentContainer>,
    pub hierarchy_display: Option<String>,
    /// Char offset of a piece cut from one line
    pub salt: Option<usize>,
}

/// Collects blocks for one file, dropping exact duplicates by segment hash.
pub(crate) struct BlockSink<'a> {
    file_path: &'a str,
    file_hash: &'a str,
    seen: HashSet<String>,
    blocks: Vec<CodeBlock>,
}

impl<'a> BlockSink<'a> {
    pub fn new(file_path: &'a str, file_hash: &'a str) -> Self {
        Self {
            file_path,
            file_hash,
            seen: HashSet::new(),
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, draft: BlockDraft) -> bool {
        let hash = segment_hash(
            self.file_path,
            draft.start_line,
            draft.end_line,
            draft.salt,
            &draft.content,
        );
        if !self.seen.insert(hash.clone()) {
            return false;
        }
        self.blocks.push(CodeBlock {
            file_path: self.file_path.to_string(),
            identifier: draft.identifier,
            block_type: draft.block_type,
            start_line: draft.start_line,
            end_line: draft.end_line,
            line_offset: draft.salt,
            content: draft.content,
            file_hash: self.file_hash.to_string(),
            segment_hash: hash,
            chunk_source: draft.chunk_source,
            parent_chain: draft.parent_chain,
            hierarchy_display: draft.hierarchy_display,
        });
        true
    }

    pub fn into_blocks(self) -> Vec<CodeBlock> {
        self.blocks
    }
}
