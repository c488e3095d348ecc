//! Strategy routing
//!
//! Pure mapping from an [`AnalysisResult`] to an ordered set of retrieval
//! strategies, each with a human-readable reason. Vector search is always
//! part of the plan.

use multi_rag_core::{AnalysisResult, QueryComplexity, RetrievalStrategy};

use crate::state::RoutingDecision;

/// Strategies the router may pick besides vector search
#[derive(Debug, Clone, Copy)]
pub struct Router {
    graph_enabled: bool,
    web_enabled: bool,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            graph_enabled: true,
            web_enabled: true,
        }
    }
}

impl Router {
    pub fn new(graph_enabled: bool, web_enabled: bool) -> Self {
        Self {
            graph_enabled,
            web_enabled,
        }
    }

    pub fn route(&self, analysis: &AnalysisResult) -> RoutingDecision {
        let mut decision = RoutingDecision::default();

        let relational = matches!(
            analysis.complexity,
            QueryComplexity::Moderate | QueryComplexity::MultiHop
        );

        if analysis.entities.len() > 1 && relational {
            if self.graph_enabled {
                decision.add(
                    RetrievalStrategy::Graph,
                    Some("Multiple entities detected, using graph for relationships"),
                );
            }
            decision.add(RetrievalStrategy::Vector, Some("Vector search for semantic matching"));
        } else if analysis.time_sensitive {
            if self.web_enabled {
                decision.add(RetrievalStrategy::Web, Some("Time-sensitive query, using web search"));
            }
            decision.add(RetrievalStrategy::Vector, Some("Vector search as fallback"));
        } else if analysis.requires_code {
            decision.add(
                RetrievalStrategy::Vector,
                Some("Code example needed, searching documentation"),
            );
        } else if analysis.complexity == QueryComplexity::MultiHop {
            decision.add(RetrievalStrategy::Vector, None);
            if self.graph_enabled {
                decision.add(
                    RetrievalStrategy::Graph,
                    Some("Multi-hop query, using hybrid vector + graph"),
                );
            } else {
                decision
                    .reasons
                    .push("Multi-hop query, using enhanced vector search".to_string());
            }
        } else {
            decision.add(RetrievalStrategy::Vector, Some("Standard vector search"));
        }

        if !decision.strategies.contains(&RetrievalStrategy::Vector) {
            decision.strategies.push(RetrievalStrategy::Vector);
        }

        tracing::debug!(strategies = ?decision.strategies, reasons = ?decision.reasons, "Routed query");
        decision
    }
}
