//! Query analysis types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified intent of a user query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    #[default]
    FactualQa,
    Comparison,
    Explanation,
    HowTo,
    CodeExample,
    /// Greetings and other trivial turns that skip retrieval
    Greeting,
}

impl QueryIntent {
    /// Parse a loosely formatted intent label, e.g. `"how-to"` or `"Factual QA"`
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "factual_qa" | "factual" => Some(Self::FactualQa),
            "comparison" | "compare" => Some(Self::Comparison),
            "explanation" | "explain" => Some(Self::Explanation),
            "how_to" | "howto" => Some(Self::HowTo),
            "code_example" | "code" => Some(Self::CodeExample),
            "greeting" | "chitchat" | "trivial" => Some(Self::Greeting),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FactualQa => "factual_qa",
            Self::Comparison => "comparison",
            Self::Explanation => "explanation",
            Self::HowTo => "how_to",
            Self::CodeExample => "code_example",
            Self::Greeting => "greeting",
        }
    }
}

/// Query complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    #[default]
    Simple,
    Moderate,
    MultiHop,
}

impl QueryComplexity {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace('-', "_").as_str() {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "multi_hop" | "multihop" | "complex" => Some(Self::MultiHop),
            _ => None,
        }
    }
}

/// Retrieval strategy selectable by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    Vector,
    Graph,
    Web,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of analyzing a raw query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    pub intent: QueryIntent,
    /// Named entities, in order of appearance
    #[serde(default)]
    pub entities: Vec<String>,
    pub complexity: QueryComplexity,
    #[serde(default)]
    pub time_sensitive: bool,
    #[serde(default)]
    pub requires_code: bool,
    /// Ambiguity estimate (0.0 - 1.0)
    #[serde(default)]
    pub ambiguity: f32,
}

impl AnalysisResult {
    pub fn is_greeting(&self) -> bool {
        self.intent == QueryIntent::Greeting
    }
}
