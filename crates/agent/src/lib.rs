//! Retrieval orchestration agents
//!
//! Features:
//! - Query analysis (intent, complexity, entities, ambiguity)
//! - Rule-based strategy routing
//! - Relevance grading with bounded query rewriting
//! - Answer validation (relevance, consistency, coverage)
//! - Cited answer synthesis with extractive fallback
//! - Explicit stage machine with a request deadline
//! - Session conversation memory
//! - Document ingestion into the dense and sparse indexes

pub mod analyzer;
pub mod grader;
pub mod ingest;
pub mod memory;
pub mod orchestrator;
pub mod rewriter;
pub mod router;
pub mod state;
pub mod synthesis;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{is_trivial_greeting, QueryAnalyzer};
pub use grader::{mean_score, Grader};
pub use ingest::{DocumentIngestor, IngestReport};
pub use memory::{token_window, InMemoryConversationStore};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use rewriter::QueryRewriter;
pub use router::Router;
pub use state::{Grade, GradingResult, PipelineState, RoutingDecision, Stage, ValidationResult};
pub use synthesis::{Synthesis, Synthesizer, INSUFFICIENT_INFORMATION};
pub use validator::Validator;

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rewrite produced no new query")]
    NoOpRewrite,

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl From<multi_rag_llm::LlmError> for AgentError {
    fn from(err: multi_rag_llm::LlmError) -> Self {
        match err {
            multi_rag_llm::LlmError::InvalidResponse(msg) => AgentError::InvalidOutput(msg),
            other => AgentError::Generation(other.to_string()),
        }
    }
}

impl From<multi_rag_core::Error> for AgentError {
    fn from(err: multi_rag_core::Error) -> Self {
        match err {
            multi_rag_core::Error::Timeout(ms) => AgentError::Timeout(ms),
            multi_rag_core::Error::Memory(msg) => AgentError::Memory(msg),
            multi_rag_core::Error::InvalidInput(msg) => AgentError::InvalidInput(msg),
            multi_rag_core::Error::Serialization(e) => AgentError::InvalidOutput(e.to_string()),
            multi_rag_core::Error::Rag(msg)
            | multi_rag_core::Error::Graph(msg)
            | multi_rag_core::Error::WebSearch(msg)
            | multi_rag_core::Error::Embedding(msg) => AgentError::Retrieval(msg),
            other => AgentError::Generation(other.to_string()),
        }
    }
}

impl From<multi_rag_rag::RagError> for AgentError {
    fn from(err: multi_rag_rag::RagError) -> Self {
        match err {
            multi_rag_rag::RagError::Timeout(ms) => AgentError::Timeout(ms),
            other => AgentError::Retrieval(other.to_string()),
        }
    }
}

impl From<AgentError> for multi_rag_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(msg) => multi_rag_core::Error::InvalidInput(msg),
            AgentError::Timeout(ms) => multi_rag_core::Error::Timeout(ms),
            other => multi_rag_core::Error::Agent(other.to_string()),
        }
    }
}
