//! Error types shared across crates
//!
//! Subsystem crates define their own error enums and convert into [`Error`]
//! at crate boundaries.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Web search error: {0}")]
    WebSearch(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error came from a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Result alias used by capability traits
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::WebSearch("provider unreachable".to_string());
        assert_eq!(err.to_string(), "Web search error: provider unreachable");
        assert!(Error::Timeout(250).is_timeout());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_from_serde() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{oops");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
