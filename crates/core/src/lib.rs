//! Core traits and types for the multi-source retrieval engine
//!
//! This crate provides foundational types used across all other crates:
//! - Capability traits for pluggable backends (generation, embedding, search)
//! - Candidate and analysis types shared by every pipeline stage
//! - Request/response shapes and streaming progress events
//! - Conversation message types
//! - Error types

pub mod error;
pub mod candidate;
pub mod analysis;
pub mod conversation;
pub mod events;
pub mod response;
pub mod llm_types;
pub mod traits;

pub use error::{Error, Result};
pub use candidate::{Candidate, SourceTag};
pub use analysis::{AnalysisResult, QueryComplexity, QueryIntent, RetrievalStrategy};
pub use conversation::{ConversationMessage, MessageRole};
pub use events::PipelineEvent;
pub use response::{
    QueryRequest, QueryResponse, ResponseMetadata, SourceRef, StageError, StageErrorKind,
};
pub use llm_types::{GenerateRequest, GenerateResponse, Message, Role, TokenUsage};

// Trait re-exports
pub use traits::{
    // Generation
    TextGenerator, Embedder,
    // Retrieval
    VectorSearch, RetrieveOptions, MetadataFilter, FilterOp,
    GraphSearch, GraphQuery, GraphLimits, GraphResult, GraphEntity, GraphRelationship, GraphPath,
    WebSearch, WebResult,
    RelevanceScorer,
    // Memory
    ConversationStore,
};
