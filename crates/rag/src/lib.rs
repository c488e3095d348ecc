//! Multi-source retrieval
//!
//! Features:
//! - In-memory dense vector store with metadata filters
//! - Sparse BM25 keyword index
//! - Weighted Reciprocal Rank Fusion
//! - Knowledge-graph store with entity, path and structured lookups
//! - Web search providers (Tavily, SerpAPI) with source credibility scoring
//! - Parallel strategy fan-out with per-strategy timeouts
//! - Hybrid reranking (retrieval score + pairwise relevance)
//! - Semantic chunking with embedding breakpoints and Max-Min grouping
//! - Retrieval evaluation (Precision@K, Recall@K, MRR)

pub mod chunker;
pub mod evaluation;
pub mod fusion;
pub mod graph_store;
pub mod reranker;
pub mod retriever;
pub mod sparse_search;
pub mod strategy;
pub mod vector_store;
pub mod web_search;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chunker::{ChunkedText, SemanticChunk, SemanticChunker};
pub use evaluation::{evaluate, EvaluationCase, EvaluationReport, RetrievalMetrics};
pub use fusion::{dedup_max_score, rrf_fuse, sort_by_score, RankedList, DEFAULT_RRF_K};
pub use graph_store::{GraphEdge, GraphNode, InMemoryGraphStore};
pub use reranker::{HybridReranker, LlmScorer, RerankerStats, SimpleScorer};
pub use retriever::{FailureKind, ParallelRetriever, RetrievalOutcome, StrategyFailure};
pub use sparse_search::{SparseConfig, SparseIndex, SparseResult};
pub use strategy::{GraphStrategy, StrategyExecutor, VectorStrategy, WebStrategy};
pub use vector_store::{Document, VectorStore};
pub use web_search::{build_web_search, credibility, SerpApiClient, TavilyClient};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Web search error: {0}")]
    WebSearch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl From<RagError> for multi_rag_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Graph(msg) => multi_rag_core::Error::Graph(msg),
            RagError::WebSearch(msg) => multi_rag_core::Error::WebSearch(msg),
            RagError::Embedding(msg) => multi_rag_core::Error::Embedding(msg),
            RagError::Timeout(ms) => multi_rag_core::Error::Timeout(ms),
            other => multi_rag_core::Error::Rag(other.to_string()),
        }
    }
}
