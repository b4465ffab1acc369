use crate::error::{ChunkerError, Result};
use std::path::Path;

/// Source language of an indexed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Swift,
    Kotlin,
    Scala,
    Php,
    Markdown,
    Shell,
    Vue,
    Svelte,
    Sql,
    Unknown,
}

struct Entry {
    language: Language,
    name: &'static str,
    extensions: &'static [&'static str],
}

const fn entry(language: Language, name: &'static str, extensions: &'static [&'static str]) -> Entry {
    Entry {
        language,
        name,
        extensions,
    }
}

// Extensions are matched lowercase.
const LANGUAGES: &[Entry] = &[
    entry(Language::Rust, "rust", &["rs"]),
    entry(Language::Python, "python", &["py", "pyw"]),
    entry(Language::JavaScript, "javascript", &["js", "jsx", "mjs", "cjs"]),
    entry(Language::TypeScript, "typescript", &["ts", "mts", "cts"]),
    entry(Language::Tsx, "tsx", &["tsx"]),
    entry(Language::Go, "go", &["go"]),
    entry(Language::Java, "java", &["java"]),
    entry(Language::C, "c", &["c", "h"]),
    entry(Language::Cpp, "cpp", &["cpp", "cc", "cxx", "hpp", "hh", "hxx"]),
    entry(Language::CSharp, "csharp", &["cs"]),
    entry(Language::Ruby, "ruby", &["rb"]),
    entry(Language::Swift, "swift", &["swift"]),
    entry(Language::Kotlin, "kotlin", &["kt", "kts"]),
    entry(Language::Scala, "scala", &["scala"]),
    entry(Language::Php, "php", &["php"]),
    entry(Language::Markdown, "markdown", &["md", "markdown"]),
    entry(Language::Shell, "shell", &["sh", "bash", "zsh"]),
    entry(Language::Vue, "vue", &["vue"]),
    entry(Language::Svelte, "svelte", &["svelte"]),
    entry(Language::Sql, "sql", &["sql"]),
];

/// Every extension the indexer picks up, with or without a grammar.
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    LANGUAGES
        .iter()
        .flat_map(|entry| entry.extensions.iter().copied())
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        LANGUAGES
            .iter()
            .find(|entry| entry.extensions.contains(&ext.as_str()))
            .map_or(Self::Unknown, |entry| entry.language)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => Self::Unknown,
        }
    }

    /// Lowercase name stored in chunk metadata
    pub fn as_str(self) -> &'static str {
        LANGUAGES
            .iter()
            .find(|entry| entry.language == self)
            .map_or("unknown", |entry| entry.name)
    }

    /// Whether files of this language are indexed at all
    pub const fn is_indexable(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Languages chunked along definitions; the rest fall back to line windows.
    pub fn supports_ast(self) -> bool {
        self.grammar().is_some()
    }

    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        self.grammar()
            .ok_or_else(|| ChunkerError::unsupported_language(self.as_str()))
    }

    fn grammar(self) -> Option<tree_sitter::Language> {
        let grammar = match self {
            Self::Rust => tree_sitter_rust::LANGUAGE,
            Self::Python => tree_sitter_python::LANGUAGE,
            Self::JavaScript => tree_sitter_javascript::LANGUAGE,
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX,
            _ => return None,
        };
        Some(grammar.into())
    }
}

/// Whether the path has an extension the indexer handles
pub fn is_supported_path(path: impl AsRef<Path>) -> bool {
    Language::from_path(path).is_indexable()
}
