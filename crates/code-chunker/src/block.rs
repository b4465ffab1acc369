use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Where a block came from. Declaration order is dedup priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkSource {
    Grammar,
    Fallback,
    LineSegment,
}

impl ChunkSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grammar => "grammar",
            Self::Fallback => "fallback",
            Self::LineSegment => "line-segment",
        }
    }
}

impl fmt::Display for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized kind of an enclosing container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    Class,
    Interface,
    Namespace,
    Module,
    Function,
    Method,
    Object,
    Property,
}

impl ContainerType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Namespace => "namespace",
            Self::Module => "module",
            Self::Function => "function",
            Self::Method => "method",
            Self::Object => "object",
            Self::Property => "property",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentContainer {
    pub identifier: String,
    pub container_type: ContainerType,
}

/// A contiguous span of one file selected for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlock {
    /// Absolute path of the source file
    pub file_path: String,
    pub identifier: Option<String>,
    /// Grammar node kind, `fallback_chunk`, or `<kind>_segment`
    pub block_type: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    /// Char offset within the line for pieces of one oversized line
    #[serde(default)]
    pub line_offset: Option<usize>,
    pub content: String,
    pub file_hash: String,
    pub segment_hash: String,
    pub chunk_source: ChunkSource,
    /// Enclosing containers, outermost first
    pub parent_chain: Vec<ParentContainer>,
    pub hierarchy_display: Option<String>,
}

impl CodeBlock {
    /// True when `other` lies inside this block both by line range and by text
    #[must_use]
    pub fn contains(&self, other: &CodeBlock) -> bool {
        self.file_path == other.file_path
            && self.start_line <= other.start_line
            && other.end_line <= self.end_line
            && self.content.contains(other.content.as_str())
    }
}

/// Hex sha256 of a whole file
#[must_use]
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

pub(crate) fn segment_hash(
    file_path: &str,
    start_line: usize,
    end_line: usize,
    salt: Option<usize>,
    content: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(format!("-{start_line}-{end_line}-").as_bytes());
    if let Some(salt) = salt {
        hasher.update(format!("{salt}-").as_bytes());
    }
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_source_orders_by_priority() {
        assert!(ChunkSource::Grammar < ChunkSource::Fallback);
        assert!(ChunkSource::Fallback < ChunkSource::LineSegment);
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let a = content_hash("fn main() {}");
        assert_eq!(a, content_hash("fn main() {}"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("fn main() { }"));
    }

    #[test]
    fn segment_hash_depends_on_position_and_salt() {
        let base = segment_hash("/a.rs", 1, 3, None, "x");
        assert_ne!(base, segment_hash("/a.rs", 2, 3, None, "x"));
        assert_ne!(base, segment_hash("/a.rs", 1, 3, Some(0), "x"));
        assert_eq!(base, segment_hash("/a.rs", 1, 3, None, "x"));
    }

    #[test]
    fn displays_source_name() {
        assert_eq!(ChunkSource::LineSegment.to_string(), "line-segment");
        assert_eq!(ChunkSource::Grammar.to_string(), "grammar");
    }
}
