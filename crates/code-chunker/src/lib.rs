//! # Code Index Chunker
//!
//! Splits source files into blocks sized for embedding.
//!
//! ## Strategy
//!
//! ```text
//! File
//!   │
//!   ├──> Grammar available?
//!   │      ├─ yes: definitions (functions, classes, ...)
//!   │      │        ├─ fits       -> grammar block
//!   │      │        ├─ too large  -> descend into children
//!   │      │        └─ large leaf -> line chunks
//!   │      └─ no definitions -> whole-file line chunks
//!   │
//!   └──> Deduplicate (grammar > fallback > line segment)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use codeindex_chunker::{content_hash, CodeParser};
//!
//! let source = "def greet(name):\n    return f'hello {name}, nice to meet you today'\n";
//! let parser = CodeParser::default();
//! for block in parser.parse("/repo/app.py", source, &content_hash(source)) {
//!     println!("{}:{}-{} {}", block.file_path, block.start_line, block.end_line, block.block_type);
//! }
//! ```

mod block;
mod config;
mod dedup;
mod definitions;
mod error;
mod hierarchy;
mod language;
mod line_chunker;
mod parser;
mod sink;

pub use block::{content_hash, ChunkSource, CodeBlock, ContainerType, ParentContainer};
pub use config::ChunkerConfig;
pub use dedup::deduplicate_blocks;
pub use error::{ChunkerError, Result};
pub use language::{is_supported_path, supported_extensions, Language};
pub use parser::CodeParser;
