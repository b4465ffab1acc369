use serde::{Deserialize, Serialize};

/// Size policy for emitted blocks, in characters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Blocks shorter than this are dropped
    #[serde(default = "default_min_block_chars")]
    pub min_block_chars: usize,

    /// Target upper bound; oversized single lines are cut into pieces of this length
    #[serde(default = "default_max_block_chars")]
    pub max_block_chars: usize,

    /// Smallest tail a line-based split may leave behind
    #[serde(default = "default_min_chunk_remainder_chars")]
    pub min_chunk_remainder_chars: usize,

    /// Slack allowed above `max_block_chars` before a block is split
    #[serde(default = "default_max_chars_tolerance_factor")]
    pub max_chars_tolerance_factor: f64,
}

const fn default_min_block_chars() -> usize {
    50
}

const fn default_max_block_chars() -> usize {
    1000
}

const fn default_min_chunk_remainder_chars() -> usize {
    200
}

const fn default_max_chars_tolerance_factor() -> f64 {
    1.15
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_block_chars: default_min_block_chars(),
            max_block_chars: default_max_block_chars(),
            min_chunk_remainder_chars: default_min_chunk_remainder_chars(),
            max_chars_tolerance_factor: default_max_chars_tolerance_factor(),
        }
    }
}

impl ChunkerConfig {
    /// Largest block accepted without splitting
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn effective_max_chars(&self) -> usize {
        (self.max_block_chars as f64 * self.max_chars_tolerance_factor).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::ChunkerConfig;

    #[test]
    fn default_tolerance_allows_fifteen_percent() {
        assert_eq!(ChunkerConfig::default().effective_max_chars(), 1150);
    }
}
