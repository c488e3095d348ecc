//! Retrieval strategies
//!
//! One [`StrategyExecutor`] per [`RetrievalStrategy`]; the parallel
//! retriever picks them from a registry keyed by strategy.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use multi_rag_config::{GraphConfig, RetrievalConfig};
use multi_rag_core::{
    AnalysisResult, Candidate, GraphLimits, GraphQuery, GraphResult, GraphSearch,
    RetrievalStrategy, RetrieveOptions, SourceTag, TextGenerator, VectorSearch, WebSearch,
};
use multi_rag_llm::{parse_json, prompt::system, PromptBuilder, PromptTemplates};

use crate::fusion::{rrf_fuse, RankedList};
use crate::sparse_search::SparseIndex;
use crate::web_search::result_credibility;
use crate::RagError;

/// A retrieval strategy
#[async_trait]
pub trait StrategyExecutor: Send + Sync + 'static {
    /// Strategy this executor implements
    fn strategy(&self) -> RetrievalStrategy;

    /// Retrieve candidates for a query
    async fn execute(&self, query: &str, analysis: &AnalysisResult) -> Result<Vec<Candidate>, RagError>;
}

/// Dense vector search, fused with BM25 when the sparse index has content
pub struct VectorStrategy {
    vector: Arc<dyn VectorSearch>,
    sparse: Option<Arc<SparseIndex>>,
    config: RetrievalConfig,
}

impl VectorStrategy {
    pub fn new(vector: Arc<dyn VectorSearch>, config: RetrievalConfig) -> Self {
        Self {
            vector,
            sparse: None,
            config,
        }
    }

    pub fn with_sparse_index(mut self, index: Arc<SparseIndex>) -> Self {
        self.sparse = Some(index);
        self
    }

    fn sparse_candidates(&self, query: &str) -> Vec<Candidate> {
        let Some(sparse) = self.sparse.as_ref().filter(|s| s.doc_count() > 0) else {
            return Vec::new();
        };

        let results = sparse.search(query, Some(self.config.top_k));
        // BM25 is unbounded; scale by the best hit
        let best = results.first().map(|r| r.score).unwrap_or(1.0).max(f32::EPSILON);

        results
            .into_iter()
            .map(|r| {
                let mut candidate =
                    Candidate::new(r.id, r.content, (r.score / best).clamp(0.0, 1.0), SourceTag::Vector);
                candidate.metadata = r.metadata;
                candidate.with_metadata("bm25_score", r.score as f64)
            })
            .collect()
    }
}

#[async_trait]
impl StrategyExecutor for VectorStrategy {
    fn strategy(&self) -> RetrievalStrategy {
        RetrievalStrategy::Vector
    }

    async fn execute(&self, query: &str, _analysis: &AnalysisResult) -> Result<Vec<Candidate>, RagError> {
        let options = RetrieveOptions::default().with_top_k(self.config.top_k);
        let dense = self
            .vector
            .search(query, &options)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        let sparse = self.sparse_candidates(query);

        if sparse.is_empty() {
            // Dense only: apply the similarity floor
            let kept: Vec<Candidate> = dense
                .into_iter()
                .filter(|c| c.score >= self.config.min_similarity)
                .collect();
            tracing::debug!(results = kept.len(), "Vector search (dense only)");
            return Ok(kept);
        }

        let dense_count = dense.len();
        let sparse_count = sparse.len();
        let mut fused = rrf_fuse(
            &[
                RankedList::new(dense, self.config.vector_weight),
                RankedList::new(sparse, self.config.sparse_weight),
            ],
            self.config.rrf_k,
        );
        fused.truncate(self.config.top_k);

        tracing::debug!(
            dense = dense_count,
            sparse = sparse_count,
            fused = fused.len(),
            "Hybrid vector search"
        );
        Ok(fused)
    }
}

/// Candidate scores for graph results
const ENTITY_SCORE: f32 = 0.8;
const HOP_DECAY: f32 = 0.1;
const MIN_NEIGHBOUR_SCORE: f32 = 0.3;
const PATH_SCORE: f32 = 0.75;

#[derive(Debug, Deserialize)]
struct GeneratedQuery {
    query: String,
    #[serde(default)]
    explanation: String,
}

/// Knowledge-graph strategy
///
/// Named entities get neighbour expansion plus a path between the first two.
/// Without entities, the generator writes a structured query; if that
/// fails, query keywords are matched against node names.
pub struct GraphStrategy {
    graph: Arc<dyn GraphSearch>,
    llm: Option<Arc<dyn TextGenerator>>,
    config: GraphConfig,
}

impl GraphStrategy {
    pub fn new(graph: Arc<dyn GraphSearch>, config: GraphConfig) -> Self {
        Self {
            graph,
            llm: None,
            config,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn TextGenerator>) -> Self {
        self.llm = Some(llm);
        self
    }

    fn limits(&self) -> GraphLimits {
        GraphLimits {
            max_hops: self.config.max_hop_depth,
            nodes_per_label: self.config.nodes_per_label,
            neighbour_limit: self.config.neighbour_limit,
            label_priority: self.config.label_priority.clone(),
        }
    }

    fn entity_score(hops: usize) -> f32 {
        if hops == 0 {
            ENTITY_SCORE
        } else {
            (ENTITY_SCORE - HOP_DECAY * hops as f32).max(MIN_NEIGHBOUR_SCORE)
        }
    }

    fn to_candidates(result: &GraphResult, seen: &mut HashSet<String>) -> Vec<Candidate> {
        let mut out = Vec::new();

        for entity in &result.entities {
            let id = format!("graph:{}", entity.id);
            if !seen.insert(id.clone()) {
                continue;
            }

            let mut text = if entity.description.is_empty() {
                entity.name.clone()
            } else {
                format!("{}: {}", entity.name, entity.description)
            };
            if entity.hops == 0 {
                let relations: Vec<String> = result
                    .relationships
                    .iter()
                    .filter(|r| r.source == entity.name || r.target == entity.name)
                    .map(|r| format!("{} -[{}]-> {}", r.source, r.rel_type, r.target))
                    .collect();
                if !relations.is_empty() {
                    text.push_str("\nRelationships: ");
                    text.push_str(&relations.join("; "));
                }
            }

            out.push(
                Candidate::new(id, text, Self::entity_score(entity.hops), SourceTag::Graph)
                    .with_metadata("entity", entity.name.clone())
                    .with_metadata("label", entity.label.clone())
                    .with_metadata("hops", entity.hops),
            );
        }

        for path in &result.paths {
            let id = format!("graph:path:{}", path.nodes.join("->"));
            if !seen.insert(id.clone()) {
                continue;
            }
            out.push(
                Candidate::new(id, path.describe(), PATH_SCORE, SourceTag::Graph)
                    .with_metadata("path_length", path.len()),
            );
        }

        out
    }

    async fn generate_query(&self, question: &str) -> Option<GeneratedQuery> {
        let llm = self.llm.as_ref()?;
        let request = PromptBuilder::new()
            .system_prompt(system::GRAPH_QUERY)
            .user_message(&PromptTemplates::graph_query(question, &self.config.label_priority))
            .temperature(0.0)
            .json()
            .build();

        match llm.generate(request).await {
            Ok(response) => match parse_json::<GeneratedQuery>(&response.text) {
                Ok(generated) if !generated.query.trim().is_empty() => Some(generated),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Unparsable graph query, falling back to keyword search");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Graph query generation failed, falling back to keyword search");
                None
            }
        }
    }

    fn keyword_queries(question: &str, limit: usize) -> Vec<String> {
        extract_keywords(question)
            .into_iter()
            .take(3)
            .map(|kw| {
                format!(
                    "MATCH (n) WHERE n.name CONTAINS '{}' RETURN n LIMIT {}",
                    kw.replace('\'', ""),
                    limit
                )
            })
            .collect()
    }
}

#[async_trait]
impl StrategyExecutor for GraphStrategy {
    fn strategy(&self) -> RetrievalStrategy {
        RetrievalStrategy::Graph
    }

    async fn execute(&self, query: &str, analysis: &AnalysisResult) -> Result<Vec<Candidate>, RagError> {
        let limits = self.limits();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut last_error: Option<multi_rag_core::Error> = None;

        let entities: Vec<&String> = analysis.entities.iter().take(self.config.max_entities).collect();

        if !entities.is_empty() {
            for name in &entities {
                match self
                    .graph
                    .search(&GraphQuery::Entity { name: (*name).clone() }, &limits)
                    .await
                {
                    Ok(result) => candidates.extend(Self::to_candidates(&result, &mut seen)),
                    Err(e) => {
                        tracing::warn!(entity = %name, error = %e, "Graph entity lookup failed");
                        last_error = Some(e);
                    }
                }
            }

            if entities.len() >= 2 {
                let path_query = GraphQuery::Path {
                    from: entities[0].clone(),
                    to: entities[1].clone(),
                };
                match self.graph.search(&path_query, &limits).await {
                    Ok(result) => candidates.extend(Self::to_candidates(&result, &mut seen)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Graph path lookup failed");
                        last_error = Some(e);
                    }
                }
            }
        } else {
            let queries = match self.generate_query(query).await {
                Some(generated) => {
                    tracing::debug!(
                        query = %generated.query,
                        explanation = %generated.explanation,
                        "Generated graph query"
                    );
                    vec![generated.query]
                }
                None => Self::keyword_queries(query, self.config.neighbour_limit),
            };

            for structured in queries {
                match self
                    .graph
                    .search(&GraphQuery::Structured { query: structured.clone() }, &limits)
                    .await
                {
                    Ok(result) => candidates.extend(Self::to_candidates(&result, &mut seen)),
                    Err(e) => {
                        tracing::warn!(query = %structured, error = %e, "Structured graph query failed");
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) if candidates.is_empty() => Err(RagError::Graph(e.to_string())),
            _ => Ok(candidates),
        }
    }
}

/// Web search strategy scored by source credibility
pub struct WebStrategy {
    web: Arc<dyn WebSearch>,
    max_results: usize,
}

impl WebStrategy {
    pub fn new(web: Arc<dyn WebSearch>, max_results: usize) -> Self {
        Self { web, max_results }
    }
}

#[async_trait]
impl StrategyExecutor for WebStrategy {
    fn strategy(&self) -> RetrievalStrategy {
        RetrievalStrategy::Web
    }

    async fn execute(&self, query: &str, _analysis: &AnalysisResult) -> Result<Vec<Candidate>, RagError> {
        let results = self
            .web
            .search(query, self.max_results)
            .await
            .map_err(|e| RagError::WebSearch(e.to_string()))?;

        let mut candidates: Vec<Candidate> = results
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let credibility = result_credibility(&r);
                let id = if r.url.is_empty() {
                    format!("web:{}", i)
                } else {
                    format!("web:{}", r.url)
                };
                let mut candidate = Candidate::new(
                    id,
                    format!("{}\n{}", r.title, r.content),
                    credibility,
                    SourceTag::Web,
                )
                .with_metadata("url", r.url)
                .with_metadata("title", r.title)
                .with_metadata("credibility", credibility as f64);
                if let Some(provider_score) = r.provider_score {
                    candidate = candidate.with_metadata("provider_score", provider_score as f64);
                }
                candidate
            })
            .collect();

        // Stable: provider order within a tier
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(provider = self.web.name(), results = candidates.len(), "Web search");
        Ok(candidates)
    }
}

/// Extract keywords from text
pub fn extract_keywords(text: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "is", "are", "was", "were", "be", "been",
        "i", "you", "we", "they", "it", "this", "that",
        "what", "which", "who", "whom", "whose", "how", "why", "when", "where",
        "to", "for", "in", "on", "at", "by", "with", "from", "of", "about",
        "and", "or", "but", "if", "then", "else", "does", "do", "can",
    ];

    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(str::to_lowercase)
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .take(5)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_store::{GraphNode, InMemoryGraphStore};
    use crate::testing::{CannedGenerator, FailingGenerator, ScriptedVectorSearch, ScriptedWebSearch};
    use crate::vector_store::Document;
    use multi_rag_core::WebResult;

    fn analysis_with(entities: &[&str]) -> AnalysisResult {
        AnalysisResult {
            entities: entities.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn graph() -> Arc<InMemoryGraphStore> {
        let store = InMemoryGraphStore::new();
        store.add_node(GraphNode::new("1", "Retriever", "Class").with_description("fetches documents"));
        store.add_node(GraphNode::new("2", "Embedder", "Class").with_description("embeds text"));
        store.add_node(GraphNode::new("3", "tokenize", "Function"));
        store.add_edge("1", "2", "USES").unwrap();
        store.add_edge("2", "3", "CALLS").unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_vector_dense_only_applies_floor() {
        let vector = ScriptedVectorSearch::new(vec![
            Candidate::new("a", "A", 0.9, SourceTag::Vector),
            Candidate::new("b", "B", 0.5, SourceTag::Vector),
        ]);
        let strategy = VectorStrategy::new(Arc::new(vector), RetrievalConfig::default());
        let out = strategy.execute("q", &AnalysisResult::default()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }

    #[tokio::test]
    async fn test_vector_hybrid_fusion() {
        let vector = ScriptedVectorSearch::new(vec![
            Candidate::new("a", "rust async runtime", 0.9, SourceTag::Vector),
            Candidate::new("b", "graph storage", 0.5, SourceTag::Vector),
        ]);
        let sparse = Arc::new(SparseIndex::default());
        sparse.index_documents(&[
            Document::new("b", "graph storage"),
            Document::new("c", "graph traversal"),
        ]);

        let strategy =
            VectorStrategy::new(Arc::new(vector), RetrievalConfig::default()).with_sparse_index(sparse);
        let out = strategy.execute("graph", &AnalysisResult::default()).await.unwrap();

        let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"c"));
        assert!(out.iter().all(|c| c.metadata.contains_key("rrf_score")));
        assert!(out.iter().all(|c| (0.0..=1.0).contains(&c.score)));
    }

    #[tokio::test]
    async fn test_graph_entities_and_path() {
        let strategy = GraphStrategy::new(graph(), GraphConfig::default());
        let out = strategy
            .execute("How does Retriever use Embedder?", &analysis_with(&["Retriever", "Embedder"]))
            .await
            .unwrap();

        let retriever = out.iter().find(|c| c.id == "graph:1").unwrap();
        assert_eq!(retriever.score, 0.8);
        assert!(retriever.text.starts_with("Retriever: fetches documents"));
        assert!(retriever.text.contains("Retriever -[USES]-> Embedder"));

        let tokenize = out.iter().find(|c| c.id == "graph:3").unwrap();
        assert!((tokenize.score - 0.6).abs() < 1e-6);

        let path = out.iter().find(|c| c.id.starts_with("graph:path:")).unwrap();
        assert_eq!(path.score, 0.75);
        assert_eq!(path.text, "Retriever -[USES]-> Embedder");
        assert!(out.iter().all(|c| c.source == SourceTag::Graph));
    }

    #[test]
    fn test_neighbour_score_floor() {
        assert_eq!(GraphStrategy::entity_score(0), 0.8);
        assert!((GraphStrategy::entity_score(1) - 0.7).abs() < 1e-6);
        assert_eq!(GraphStrategy::entity_score(9), 0.3);
    }

    #[tokio::test]
    async fn test_graph_generated_query() {
        let llm = CannedGenerator::new(vec![
            r#"{"query": "MATCH (n:Function) WHERE n.name CONTAINS 'token' RETURN n LIMIT 5", "explanation": "functions"}"#,
        ]);
        let strategy = GraphStrategy::new(graph(), GraphConfig::default()).with_llm(Arc::new(llm));
        let out = strategy.execute("what tokenizes input", &AnalysisResult::default()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "graph:3");
    }

    #[tokio::test]
    async fn test_graph_keyword_fallback() {
        let strategy =
            GraphStrategy::new(graph(), GraphConfig::default()).with_llm(Arc::new(FailingGenerator));
        let out = strategy.execute("explain the embedder", &AnalysisResult::default()).await.unwrap();
        assert!(out.iter().any(|c| c.id == "graph:2"));
    }

    #[tokio::test]
    async fn test_web_credibility_sorting() {
        let web = ScriptedWebSearch::new(vec![
            WebResult {
                title: "Blog".into(),
                url: "https://example.com/post".into(),
                content: "opinion".into(),
                provider_score: Some(0.99),
                is_answer: false,
            },
            WebResult {
                title: "Docs".into(),
                url: "https://docs.python.org/3/".into(),
                content: "reference".into(),
                provider_score: None,
                is_answer: false,
            },
            WebResult {
                title: "Article".into(),
                url: "https://realpython.com/x".into(),
                content: "tutorial".into(),
                provider_score: None,
                is_answer: false,
            },
        ]);
        let strategy = WebStrategy::new(Arc::new(web), 5);
        let out = strategy.execute("q", &AnalysisResult::default()).await.unwrap();

        let scores: Vec<f32> = out.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5]);
        assert_eq!(out[0].text, "Docs\nreference");
        assert_eq!(out[0].metadata["url"], "https://docs.python.org/3/");
        assert_eq!(out[0].source, SourceTag::Web);
    }

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords("What is the Retriever used for?");
        assert_eq!(keywords, vec!["retriever", "used"]);
    }
}
