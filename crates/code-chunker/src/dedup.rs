use crate::block::CodeBlock;

/// Drop blocks that sit inside a higher-priority block of the same file.
///
/// Blocks are ranked by [`ChunkSource`](crate::ChunkSource) (grammar, then
/// fallback, then line segments); ties keep emission order. The survivors are
/// returned in file order.
pub fn deduplicate_blocks(mut blocks: Vec<CodeBlock>) -> Vec<CodeBlock> {
    blocks.sort_by_key(|block| block.chunk_source);

    let mut kept: Vec<CodeBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if kept.iter().any(|winner| winner.contains(&block)) {
            continue;
        }
        kept.push(block);
    }

    kept.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then(a.end_line.cmp(&b.end_line))
            .then(a.chunk_source.cmp(&b.chunk_source))
    });
    kept
}
