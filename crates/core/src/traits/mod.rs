//! Capability traits consumed by the retrieval engine
//!
//! Every external collaborator sits behind one of these traits so that:
//! - Backends can be swapped without code changes
//! - Every pipeline stage can be tested with deterministic doubles
//!
//! # Trait Hierarchy
//!
//! ```text
//! Generation:
//!   - TextGenerator: prompt → text
//!   - Embedder: text → vector
//!
//! Retrieval:
//!   - VectorSearch: dense similarity search
//!   - GraphSearch: entity/relationship search over a knowledge graph
//!   - WebSearch: live web results
//!   - RelevanceScorer: (query, passage) pair scoring for reranking
//!
//! Memory:
//!   - ConversationStore: per-session bounded message log
//! ```

mod llm;
mod retriever;
mod memory;

pub use llm::{TextGenerator, Embedder};
pub use retriever::{
    VectorSearch, RetrieveOptions, MetadataFilter, FilterOp,
    GraphSearch, GraphQuery, GraphLimits, GraphResult, GraphEntity, GraphRelationship, GraphPath,
    WebSearch, WebResult,
    RelevanceScorer,
};
pub use memory::ConversationStore;
