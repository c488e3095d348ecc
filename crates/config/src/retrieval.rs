//! Retrieval, reranking, graph, web and chunking configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates requested from each source
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,

    /// Candidates kept after reranking
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    /// Candidates kept after fan-in (dedup + sort + cap)
    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,

    /// Minimum dense similarity for vector hits
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// RRF weight for the dense list
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// RRF weight for the BM25 list
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f32,

    /// RRF k parameter
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Per-strategy timeout (milliseconds)
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,
}

fn default_retrieval_top_k() -> usize {
    50
}
fn default_rerank_top_k() -> usize {
    5
}
fn default_candidate_cap() -> usize {
    15
}
fn default_min_similarity() -> f32 {
    0.7
}
fn default_vector_weight() -> f32 {
    0.7
}
fn default_sparse_weight() -> f32 {
    0.3
}
fn default_rrf_k() -> f32 {
    60.0
}
fn default_strategy_timeout_ms() -> u64 {
    10_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
            rerank_top_k: default_rerank_top_k(),
            candidate_cap: default_candidate_cap(),
            min_similarity: default_min_similarity(),
            vector_weight: default_vector_weight(),
            sparse_weight: default_sparse_weight(),
            rrf_k: default_rrf_k(),
            strategy_timeout_ms: default_strategy_timeout_ms(),
        }
    }
}

impl RetrievalConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }
}

/// Reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Weight of the normalized cross-encoder score
    #[serde(default = "default_ce_weight")]
    pub ce_weight: f32,

    /// Weight of the original retrieval score
    #[serde(default = "default_retrieval_weight")]
    pub retrieval_weight: f32,

    /// Affine normalization: `(raw + offset) / scale`, clamped to [0, 1]
    #[serde(default = "default_score_offset")]
    pub score_offset: f32,

    #[serde(default = "default_score_scale")]
    pub score_scale: f32,

    /// Score pairs with the text generator instead of lexical overlap
    #[serde(default)]
    pub llm_scorer: bool,
}

fn default_ce_weight() -> f32 {
    0.7
}
fn default_retrieval_weight() -> f32 {
    0.3
}
fn default_score_offset() -> f32 {
    10.0
}
fn default_score_scale() -> f32 {
    20.0
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            ce_weight: default_ce_weight(),
            retrieval_weight: default_retrieval_weight(),
            score_offset: default_score_offset(),
            score_scale: default_score_scale(),
            llm_scorer: false,
        }
    }
}

/// Knowledge graph strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum hops for neighbour expansion and path search
    #[serde(default = "default_max_hop_depth")]
    pub max_hop_depth: usize,

    /// Entity labels tried in order when matching a name
    #[serde(default = "default_label_priority")]
    pub label_priority: Vec<String>,

    /// Entities taken from the analysis
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,

    /// Matches kept per label
    #[serde(default = "default_nodes_per_label")]
    pub nodes_per_label: usize,

    /// Neighbours kept per matched entity
    #[serde(default = "default_neighbour_limit")]
    pub neighbour_limit: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_hop_depth() -> usize {
    3
}
fn default_label_priority() -> Vec<String> {
    vec!["Class".to_string(), "Function".to_string()]
}
fn default_max_entities() -> usize {
    3
}
fn default_nodes_per_label() -> usize {
    3
}
fn default_neighbour_limit() -> usize {
    10
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_hop_depth: default_max_hop_depth(),
            label_priority: default_label_priority(),
            max_entities: default_max_entities(),
            nodes_per_label: default_nodes_per_label(),
            neighbour_limit: default_neighbour_limit(),
        }
    }
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider name (only `tavily` is built in)
    #[serde(default = "default_web_provider")]
    pub provider: String,

    /// Provider endpoint
    #[serde(default = "default_web_endpoint")]
    pub endpoint: String,

    /// Provider API key
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Results requested per query
    #[serde(default = "default_web_max_results")]
    pub max_results: usize,

    /// Request timeout (seconds)
    #[serde(default = "default_web_timeout")]
    pub timeout_secs: u64,
}

fn default_web_provider() -> String {
    "tavily".to_string()
}
fn default_web_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}
fn default_web_max_results() -> usize {
    5
}
fn default_web_timeout() -> u64 {
    10
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_web_provider(),
            endpoint: default_web_endpoint(),
            api_key: None,
            max_results: default_web_max_results(),
            timeout_secs: default_web_timeout(),
        }
    }
}

/// Semantic chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Chunks below this size always absorb the next sentence (characters)
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Hard ceiling on chunk size (characters)
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Max-Min merge threshold on cosine similarity
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Percentile used to derive the breakpoint threshold
    #[serde(default = "default_breakpoint_percentile")]
    pub breakpoint_percentile: f32,

    /// Sentences per embedding request
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

fn default_min_chunk_size() -> usize {
    100
}
fn default_max_chunk_size() -> usize {
    1000
}
fn default_similarity_threshold() -> f32 {
    0.5
}
fn default_breakpoint_percentile() -> f32 {
    90.0
}
fn default_embed_batch_size() -> usize {
    20
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            similarity_threshold: default_similarity_threshold(),
            breakpoint_percentile: default_breakpoint_percentile(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.top_k, 50);
        assert_eq!(config.rerank_top_k, 5);
        assert_eq!(config.candidate_cap, 15);
        assert_eq!(config.rrf_k, 60.0);
        assert_eq!(config.strategy_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_graph_label_priority_override() {
        let config: GraphConfig =
            serde_json::from_str(r#"{"label_priority": ["Module", "Class"]}"#).unwrap();
        assert_eq!(config.label_priority, vec!["Module", "Class"]);
        assert_eq!(config.max_hop_depth, 3);
        assert!(config.enabled);
    }

    #[test]
    fn test_chunker_defaults() {
        let config = ChunkerConfig::default();
        assert_eq!(config.min_chunk_size, 100);
        assert_eq!(config.max_chunk_size, 1000);
        assert_eq!(config.breakpoint_percentile, 90.0);
        assert_eq!(config.embed_batch_size, 20);
    }
}
