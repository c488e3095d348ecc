//! Retrieval traits for the vector, graph and web sources

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Candidate, Result};

/// Dense vector search
///
/// Implementations:
/// - `InMemoryVectorIndex` - brute-force cosine index over ingested chunks
///
/// # Example
///
/// ```ignore
/// let index: Arc<dyn VectorSearch> = Arc::new(InMemoryVectorIndex::new(embedder));
/// let options = RetrieveOptions::default().with_top_k(50);
/// let candidates = index.search("how does RRF work", &options).await?;
/// for c in candidates {
///     println!("{}: {}", c.score, c.text);
/// }
/// ```
#[async_trait]
pub trait VectorSearch: Send + Sync + 'static {
    /// Search for candidates similar to `query`
    ///
    /// # Returns
    /// Candidates sorted by similarity (highest first), tagged `SourceTag::Vector`
    async fn search(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<Candidate>>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Retrieval options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOptions {
    /// Number of candidates to return
    pub top_k: usize,
    /// Minimum similarity score (0.0 - 1.0)
    pub min_score: f32,
    /// Filter by metadata
    #[serde(default)]
    pub filters: Vec<MetadataFilter>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
            filters: Vec::new(),
        }
    }
}

impl RetrieveOptions {
    /// Set top_k
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set minimum score
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score.clamp(0.0, 1.0);
        self
    }

    /// Add a metadata filter
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Whether all filters accept the given metadata
    pub fn accepts(&self, metadata: &HashMap<String, serde_json::Value>) -> bool {
        self.filters.iter().all(|f| f.matches(metadata))
    }
}

/// Metadata filter for retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// Field name
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
    /// Value to compare
    pub value: serde_json::Value,
}

impl MetadataFilter {
    /// Create an equals filter
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Equals,
            value: value.into(),
        }
    }

    /// Create a contains filter
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Contains,
            value: serde_json::Value::String(value.into()),
        }
    }

    /// Evaluate the filter against a metadata map
    ///
    /// A missing field only satisfies `NotEquals`.
    pub fn matches(&self, metadata: &HashMap<String, serde_json::Value>) -> bool {
        let Some(actual) = metadata.get(&self.field) else {
            return matches!(self.op, FilterOp::NotEquals);
        };
        match self.op {
            FilterOp::Equals => actual == &self.value,
            FilterOp::NotEquals => actual != &self.value,
            FilterOp::Contains => match (actual, &self.value) {
                (serde_json::Value::String(a), serde_json::Value::String(v)) => a.contains(v.as_str()),
                (serde_json::Value::Array(items), v) => items.contains(v),
                _ => false,
            },
            FilterOp::GreaterThan => match (actual.as_f64(), self.value.as_f64()) {
                (Some(a), Some(v)) => a > v,
                _ => false,
            },
            FilterOp::LessThan => match (actual.as_f64(), self.value.as_f64()) {
                (Some(a), Some(v)) => a < v,
                _ => false,
            },
        }
    }
}

/// Filter operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
}

/// Query issued against a knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphQuery {
    /// Look up a named entity and expand its neighbourhood
    Entity { name: String },
    /// Shortest path between two named entities
    Path { from: String, to: String },
    /// A generated cypher-like query
    Structured { query: String },
}

/// Bounds applied to graph traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphLimits {
    /// Maximum hops from a matched entity
    pub max_hops: usize,
    /// Matches kept per label
    pub nodes_per_label: usize,
    /// Neighbours kept per matched entity
    pub neighbour_limit: usize,
    /// Labels to try, in priority order; empty means any label
    pub label_priority: Vec<String>,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_hops: 3,
            nodes_per_label: 3,
            neighbour_limit: 10,
            label_priority: vec!["Class".to_string(), "Function".to_string()],
        }
    }
}

/// Entity node returned from a graph search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntity {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Distance from the matched entity (0 for a direct match)
    #[serde(default)]
    pub hops: usize,
}

/// Directed relationship between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub source: String,
    pub target: String,
    pub rel_type: String,
}

/// Path between two entities, as alternating node names and relationship types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<String>,
    pub relationships: Vec<String>,
}

impl GraphPath {
    /// Number of hops in the path
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// Render as `A -[REL]-> B -[REL]-> C`
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                let rel = self.relationships.get(i - 1).map(String::as_str).unwrap_or("RELATED_TO");
                out.push_str(&format!(" -[{}]-> ", rel));
            }
            out.push_str(node);
        }
        out
    }
}

/// Graph search output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphResult {
    pub entities: Vec<GraphEntity>,
    pub relationships: Vec<GraphRelationship>,
    pub paths: Vec<GraphPath>,
}

impl GraphResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.paths.is_empty()
    }
}

/// Knowledge-graph search
#[async_trait]
pub trait GraphSearch: Send + Sync + 'static {
    async fn search(&self, query: &GraphQuery, limits: &GraphLimits) -> Result<GraphResult>;

    fn name(&self) -> &str;
}

/// Single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub content: String,
    /// Provider relevance score, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_score: Option<f32>,
    /// Set for a provider-synthesized direct answer
    #[serde(default)]
    pub is_answer: bool,
}

/// Web search provider
#[async_trait]
pub trait WebSearch: Send + Sync + 'static {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;

    fn name(&self) -> &str;
}

/// Pairwise (query, passage) relevance scorer used for reranking
///
/// Scores are raw; callers normalize them.
#[async_trait]
pub trait RelevanceScorer: Send + Sync + 'static {
    async fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;

    fn name(&self) -> &str;
}
