//! LLM integration
//!
//! Features:
//! - Ollama-compatible chat and embedding backend with retry/backoff
//! - Prompt templates for analysis, grading, rewriting, validation and synthesis
//! - Tolerant JSON extraction from model output

pub mod backend;
pub mod prompt;

pub use backend::{LlmConfig, OllamaBackend};
pub use prompt::{extract_json, parse_json, PromptBuilder, PromptTemplates};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for multi_rag_core::Error {
    fn from(err: LlmError) -> Self {
        multi_rag_core::Error::Llm(err.to_string())
    }
}
