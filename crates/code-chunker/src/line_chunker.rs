use crate::block::{char_len, ChunkSource, ParentContainer};
use crate::config::ChunkerConfig;
use crate::hierarchy::hierarchy_display;
use crate::sink::{BlockDraft, BlockSink};

/// Line-based splitter used for grammar-less files and oversized leaf nodes.
pub(crate) struct LineChunker<'c> {
    pub config: &'c ChunkerConfig,
    /// Node kind of the leaf, or `fallback_chunk` for whole files
    pub block_type: &'c str,
    pub parent_chain: &'c [ParentContainer],
}

impl LineChunker<'_> {
    /// Split `text`, whose first line is `base_line` (1-based), into blocks.
    pub fn chunk(&self, sink: &mut BlockSink<'_>, text: &str, base_line: usize) {
        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len() - 1;
        // Each line counts its newline except the last one
        let lens: Vec<usize> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| char_len(line) + usize::from(i < last))
            .collect();
        let effective_max = self.config.effective_max_chars();

        let mut chunk_start = 0usize;
        let mut current_len = 0usize;
        let mut i = 0usize;
        while i < lines.len() {
            let line_len = lens[i];

            if line_len > effective_max {
                if i > chunk_start {
                    self.finalize(sink, &lines, chunk_start, i - 1, base_line);
                }
                self.split_oversized_line(sink, lines[i], base_line + i);
                i += 1;
                chunk_start = i;
                current_len = 0;
                continue;
            }

            if current_len > 0 && current_len + line_len > effective_max {
                let split_at = self.rebalance(&lens, chunk_start, i, current_len);
                self.finalize(sink, &lines, chunk_start, split_at, base_line);
                // Lines after the split point are accumulated again
                chunk_start = split_at + 1;
                current_len = 0;
                i = chunk_start;
                continue;
            }

            current_len += line_len;
            i += 1;
        }

        if chunk_start < lines.len() && current_len > 0 {
            self.finalize(sink, &lines, chunk_start, last, base_line);
        }
    }

    /// Pick the last line of the chunk ending before `next`. Moves the boundary
    /// back when the rest of the text would be too small to stand alone.
    fn rebalance(&self, lens: &[usize], chunk_start: usize, next: usize, current_len: usize) -> usize {
        let default_split = next - 1;
        let remainder: usize = lens[next..].iter().sum();
        let too_small_tail = remainder < self.config.min_chunk_remainder_chars;
        if current_len < self.config.min_block_chars || !too_small_tail || next - chunk_start < 2 {
            return default_split;
        }

        for k in (chunk_start..=next - 2).rev() {
            let head: usize = lens[chunk_start..=k].iter().sum();
            let tail: usize = lens[k + 1..].iter().sum();
            if head >= self.config.min_block_chars && tail >= self.config.min_chunk_remainder_chars {
                return k;
            }
        }
        default_split
    }

    fn finalize(&self, sink: &mut BlockSink<'_>, lines: &[&str], start: usize, end: usize, base_line: usize) {
        let content = lines[start..=end].join("\n");
        if char_len(&content) < self.config.min_block_chars {
            return;
        }
        sink.push(BlockDraft {
            identifier: None,
            block_type: self.block_type.to_string(),
            start_line: base_line + start,
            end_line: base_line + end,
            content,
            chunk_source: ChunkSource::Fallback,
            parent_chain: self.parent_chain.to_vec(),
            hierarchy_display: hierarchy_display(self.parent_chain, None, self.block_type, None),
            salt: None,
        });
    }

    /// Cut a single overlong line into fixed-size pieces; size checks do not apply.
    fn split_oversized_line(&self, sink: &mut BlockSink<'_>, line: &str, line_no: usize) {
        let chars: Vec<char> = line.chars().collect();
        let segment_type = format!("{}_segment", self.block_type);
        let width = self.config.max_block_chars.max(1);
        for (n, piece) in chars.chunks(width).enumerate() {
            sink.push(BlockDraft {
                identifier: None,
                block_type: segment_type.clone(),
                start_line: line_no,
                end_line: line_no,
                content: piece.iter().collect(),
                chunk_source: ChunkSource::LineSegment,
                parent_chain: self.parent_chain.to_vec(),
                hierarchy_display: hierarchy_display(self.parent_chain, None, &segment_type, None),
                salt: Some(n * width),
            });
        }
    }
}
