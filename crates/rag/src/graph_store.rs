//! In-memory knowledge graph
//!
//! Labelled nodes and typed edges with bounded-hop traversal. Implements
//! [`GraphSearch`] for entity lookup, shortest paths and a small read-only
//! query form:
//!
//! ```text
//! MATCH (n:Label) WHERE n.name CONTAINS 'term' RETURN n LIMIT 10
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use multi_rag_core::{
    GraphEntity, GraphLimits, GraphPath, GraphQuery, GraphRelationship, GraphResult, GraphSearch,
};

use crate::RagError;

/// Graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            label: label.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn to_entity(&self, hops: usize) -> GraphEntity {
        GraphEntity {
            id: self.id.clone(),
            name: self.name.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            hops,
        }
    }
}

/// Directed, typed edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub rel_type: String,
}

/// Parsed structured query
#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub label: Option<String>,
    pub field: Option<String>,
    pub op: Option<String>,
    pub term: Option<String>,
    pub limit: Option<usize>,
}

static MATCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*MATCH\s*\(\s*(\w+)\s*(?::\s*(\w+))?\s*\)\s*(?:WHERE\s+\w+\.(name|description)\s+(CONTAINS|=)\s+'([^']*)'\s*)?RETURN\s+\w+\s*(?:LIMIT\s+(\d+))?\s*;?\s*$",
    )
    .expect("valid match regex")
});

/// Parse the supported `MATCH ... RETURN` form
pub fn parse_match_query(query: &str) -> Result<MatchQuery, RagError> {
    let caps = MATCH_RE
        .captures(query)
        .ok_or_else(|| RagError::Graph(format!("Unsupported graph query: {}", query)))?;

    Ok(MatchQuery {
        label: caps.get(2).map(|m| m.as_str().to_string()),
        field: caps.get(3).map(|m| m.as_str().to_lowercase()),
        op: caps.get(4).map(|m| m.as_str().to_uppercase()),
        term: caps.get(5).map(|m| m.as_str().to_string()),
        limit: caps.get(6).and_then(|m| m.as_str().parse().ok()),
    })
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, GraphNode>,
    /// Insertion order for deterministic scans
    order: Vec<String>,
    edges: Vec<GraphEdge>,
    /// Undirected adjacency: node -> (edge index)
    adjacency: HashMap<String, Vec<usize>>,
}

/// In-memory knowledge graph store
#[derive(Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<Inner>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node
    pub fn add_node(&self, node: GraphNode) {
        let mut inner = self.inner.write();
        if !inner.nodes.contains_key(&node.id) {
            inner.order.push(node.id.clone());
        }
        inner.nodes.insert(node.id.clone(), node);
    }

    /// Add an edge between existing nodes
    pub fn add_edge(
        &self,
        source: &str,
        target: &str,
        rel_type: impl Into<String>,
    ) -> Result<(), RagError> {
        let mut inner = self.inner.write();
        for id in [source, target] {
            if !inner.nodes.contains_key(id) {
                return Err(RagError::NotFound(format!("Graph node {}", id)));
            }
        }

        let idx = inner.edges.len();
        inner.edges.push(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.into(),
        });
        inner.adjacency.entry(source.to_string()).or_default().push(idx);
        inner.adjacency.entry(target.to_string()).or_default().push(idx);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }

    /// Nodes with `label` whose name contains `term` (case-insensitive)
    ///
    /// Exact name matches sort first.
    pub fn search_nodes(&self, label: Option<&str>, term: &str, limit: usize) -> Vec<GraphNode> {
        let inner = self.inner.read();
        Self::scan(&inner, label, |node| contains_ci(&node.name, term), term, limit)
    }

    fn scan(
        inner: &Inner,
        label: Option<&str>,
        predicate: impl Fn(&GraphNode) -> bool,
        term: &str,
        limit: usize,
    ) -> Vec<GraphNode> {
        let mut hits: Vec<&GraphNode> = inner
            .order
            .iter()
            .filter_map(|id| inner.nodes.get(id))
            .filter(|node| label.map_or(true, |l| node.label.eq_ignore_ascii_case(l)))
            .filter(|node| predicate(node))
            .collect();
        hits.sort_by_key(|node| !node.name.eq_ignore_ascii_case(term));
        hits.into_iter().take(limit).cloned().collect()
    }

    /// Resolve a name using the label priority list
    fn resolve(inner: &Inner, name: &str, labels: &[String], limit: usize) -> Vec<GraphNode> {
        for label in labels {
            let found = Self::scan(inner, Some(label), |n| contains_ci(&n.name, name), name, limit);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Undirected BFS up to `max_hops`, excluding the start node
    fn neighbours(inner: &Inner, start: &str, max_hops: usize, limit: usize) -> Vec<(String, usize)> {
        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

        visited.insert(start);
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            for &edge_idx in inner.adjacency.get(current).into_iter().flatten() {
                let edge = &inner.edges[edge_idx];
                let next = if edge.source == current {
                    edge.target.as_str()
                } else {
                    edge.source.as_str()
                };
                if visited.insert(next) {
                    out.push((next.to_string(), depth + 1));
                    if out.len() >= limit {
                        return out;
                    }
                    queue.push_back((next, depth + 1));
                }
            }
        }

        out
    }

    /// Shortest undirected path within `max_hops` edges
    fn shortest_path(inner: &Inner, from: &str, to: &str, max_hops: usize) -> Option<GraphPath> {
        let name_of = |id: &str| inner.nodes.get(id).map(|n| n.name.clone()).unwrap_or_default();

        if from == to {
            return Some(GraphPath {
                nodes: vec![name_of(from)],
                relationships: Vec::new(),
            });
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut parent: HashMap<&str, (&str, usize)> = HashMap::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

        visited.insert(from);
        queue.push_back((from, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if current == to {
                let mut nodes = vec![name_of(to)];
                let mut relationships = Vec::new();
                let mut node = to;
                while let Some(&(prev, edge_idx)) = parent.get(node) {
                    relationships.push(inner.edges[edge_idx].rel_type.clone());
                    nodes.push(name_of(prev));
                    node = prev;
                }
                nodes.reverse();
                relationships.reverse();
                return Some(GraphPath { nodes, relationships });
            }
            if depth >= max_hops {
                continue;
            }
            for &edge_idx in inner.adjacency.get(current).into_iter().flatten() {
                let edge = &inner.edges[edge_idx];
                let next = if edge.source == current {
                    edge.target.as_str()
                } else {
                    edge.source.as_str()
                };
                if visited.insert(next) {
                    parent.insert(next, (current, edge_idx));
                    queue.push_back((next, depth + 1));
                }
            }
        }

        None
    }

    /// Edges whose endpoints are both in `ids`
    fn relationships_within(inner: &Inner, ids: &HashSet<String>) -> Vec<GraphRelationship> {
        let name_of = |id: &str| inner.nodes.get(id).map(|n| n.name.clone()).unwrap_or_default();
        inner
            .edges
            .iter()
            .filter(|e| ids.contains(&e.source) && ids.contains(&e.target))
            .map(|e| GraphRelationship {
                source: name_of(&e.source),
                target: name_of(&e.target),
                rel_type: e.rel_type.clone(),
            })
            .collect()
    }

    fn entity_search(inner: &Inner, name: &str, limits: &GraphLimits) -> GraphResult {
        let matched = Self::resolve(inner, name, &limits.label_priority, limits.nodes_per_label);

        let mut entities = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for node in &matched {
            if seen.insert(node.id.clone()) {
                entities.push(node.to_entity(0));
            }
        }
        for node in &matched {
            for (id, hops) in Self::neighbours(inner, &node.id, limits.max_hops, limits.neighbour_limit) {
                if seen.insert(id.clone()) {
                    if let Some(n) = inner.nodes.get(&id) {
                        entities.push(n.to_entity(hops));
                    }
                }
            }
        }

        let relationships = Self::relationships_within(inner, &seen);
        GraphResult {
            entities,
            relationships,
            paths: Vec::new(),
        }
    }

    fn path_search(inner: &Inner, from: &str, to: &str, limits: &GraphLimits) -> GraphResult {
        let from_nodes = Self::resolve(inner, from, &limits.label_priority, 1);
        let to_nodes = Self::resolve(inner, to, &limits.label_priority, 1);

        let paths = match (from_nodes.first(), to_nodes.first()) {
            (Some(a), Some(b)) => Self::shortest_path(inner, &a.id, &b.id, limits.max_hops)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };

        GraphResult {
            entities: Vec::new(),
            relationships: Vec::new(),
            paths,
        }
    }

    fn structured_search(inner: &Inner, query: &str, limits: &GraphLimits) -> Result<GraphResult, RagError> {
        let parsed = parse_match_query(query)?;
        let term = parsed.term.clone().unwrap_or_default();
        let limit = parsed.limit.unwrap_or(limits.neighbour_limit);
        let exact = parsed.op.as_deref() == Some("=");
        let on_description = parsed.field.as_deref() == Some("description");

        let predicate = |node: &GraphNode| {
            let value = if on_description { &node.description } else { &node.name };
            if parsed.term.is_none() {
                true
            } else if exact {
                value == &term
            } else {
                contains_ci(value, &term)
            }
        };

        let nodes = Self::scan(inner, parsed.label.as_deref(), predicate, &term, limit);
        let ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

        Ok(GraphResult {
            entities: nodes.iter().map(|n| n.to_entity(0)).collect(),
            relationships: Self::relationships_within(inner, &ids),
            paths: Vec::new(),
        })
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl GraphSearch for InMemoryGraphStore {
    async fn search(
        &self,
        query: &GraphQuery,
        limits: &GraphLimits,
    ) -> multi_rag_core::Result<GraphResult> {
        let inner = self.inner.read();
        let result = match query {
            GraphQuery::Entity { name } => Self::entity_search(&inner, name, limits),
            GraphQuery::Path { from, to } => Self::path_search(&inner, from, to, limits),
            GraphQuery::Structured { query } => Self::structured_search(&inner, query, limits)?,
        };
        tracing::trace!(
            entities = result.entities.len(),
            paths = result.paths.len(),
            "Graph search complete"
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "in_memory_graph"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Retriever -[USES]-> Embedder -[CALLS]-> embed_batch ; Reranker -[USES]-> Retriever
    fn sample() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        store.add_node(GraphNode::new("c1", "Retriever", "Class").with_description("Fetches candidates"));
        store.add_node(GraphNode::new("c2", "Embedder", "Class").with_description("Embeds text"));
        store.add_node(GraphNode::new("f1", "embed_batch", "Function"));
        store.add_node(GraphNode::new("c3", "Reranker", "Class"));
        store.add_node(GraphNode::new("f2", "retriever_factory", "Function"));
        store.add_edge("c1", "c2", "USES").unwrap();
        store.add_edge("c2", "f1", "CALLS").unwrap();
        store.add_edge("c3", "c1", "USES").unwrap();
        store
    }

    #[tokio::test]
    async fn test_entity_search_with_neighbours() {
        let store = sample();
        let result = store
            .search(&GraphQuery::Entity { name: "retriever".into() }, &GraphLimits::default())
            .await
            .unwrap();

        // Class label wins over Function for "retriever"
        assert_eq!(result.entities[0].name, "Retriever");
        assert_eq!(result.entities[0].hops, 0);
        assert!(result.entities.iter().all(|e| e.name != "retriever_factory"));

        let embed_batch = result.entities.iter().find(|e| e.name == "embed_batch").unwrap();
        assert_eq!(embed_batch.hops, 2);
        assert!(!result.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_label_priority_fallback() {
        let store = sample();
        let result = store
            .search(&GraphQuery::Entity { name: "embed_batch".into() }, &GraphLimits::default())
            .await
            .unwrap();
        assert_eq!(result.entities[0].label, "Function");
    }

    #[tokio::test]
    async fn test_hop_and_neighbour_limits() {
        let store = sample();
        let limits = GraphLimits {
            max_hops: 1,
            ..Default::default()
        };
        let result = store
            .search(&GraphQuery::Entity { name: "Reranker".into() }, &limits)
            .await
            .unwrap();
        let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Reranker", "Retriever"]);

        let limits = GraphLimits {
            neighbour_limit: 1,
            ..Default::default()
        };
        let result = store
            .search(&GraphQuery::Entity { name: "Embedder".into() }, &limits)
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 2);
    }

    #[tokio::test]
    async fn test_shortest_path() {
        let store = sample();
        let result = store
            .search(
                &GraphQuery::Path { from: "Reranker".into(), to: "Embedder".into() },
                &GraphLimits::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].describe(), "Reranker -[USES]-> Retriever -[USES]-> Embedder");

        let short = GraphLimits {
            max_hops: 1,
            ..Default::default()
        };
        let result = store
            .search(&GraphQuery::Path { from: "Reranker".into(), to: "embed_batch".into() }, &short)
            .await
            .unwrap();
        assert!(result.paths.is_empty());
    }

    #[tokio::test]
    async fn test_structured_query() {
        let store = sample();
        let query = "MATCH (n:Class) WHERE n.name CONTAINS 'er' RETURN n LIMIT 2";
        let result = store
            .search(&GraphQuery::Structured { query: query.into() }, &GraphLimits::default())
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 2);
        assert!(result.entities.iter().all(|e| e.label == "Class"));
    }

    #[tokio::test]
    async fn test_structured_query_rejects_writes() {
        let store = sample();
        let result = store
            .search(
                &GraphQuery::Structured { query: "MATCH (n) DETACH DELETE n".into() },
                &GraphLimits::default(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.node_count(), 5);
    }

    #[test]
    fn test_parse_match_query() {
        let parsed = parse_match_query("match (n:Function) where n.name = 'embed' return n").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("Function"));
        assert_eq!(parsed.op.as_deref(), Some("="));
        assert_eq!(parsed.limit, None);

        let bare = parse_match_query("MATCH (n) RETURN n LIMIT 5;").unwrap();
        assert_eq!(bare.label, None);
        assert_eq!(bare.limit, Some(5));
    }

    #[test]
    fn test_add_edge_requires_nodes() {
        let store = sample();
        assert!(matches!(store.add_edge("c1", "missing", "USES"), Err(RagError::NotFound(_))));
        assert_eq!(store.edge_count(), 3);
    }
}
