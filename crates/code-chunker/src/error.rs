use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChunkerError>;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to load grammar for {language}: {message}")]
    GrammarError { language: String, message: String },

    #[error("Failed to parse {0}")]
    ParseError(String),
}

impl ChunkerError {
    pub fn unsupported_language(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(language.into())
    }

    pub fn parse_failed(path: impl Into<String>) -> Self {
        Self::ParseError(path.into())
    }
}
