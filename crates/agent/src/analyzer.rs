//! Query analysis
//!
//! Trivial greetings are recognised lexically; everything else goes to the
//! generator, which returns a JSON characterisation of the query.

use std::sync::Arc;

use serde::Deserialize;

use multi_rag_core::{AnalysisResult, QueryComplexity, QueryIntent, TextGenerator};
use multi_rag_llm::{parse_json, prompt::system, PromptBuilder, PromptTemplates};

use crate::AgentError;

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "hiya",
    "yo",
    "thanks",
    "thank you",
    "thx",
    "good morning",
    "good afternoon",
    "good evening",
    "bye",
    "goodbye",
];

/// Whether the whole query is a greeting or thanks
pub fn is_trivial_greeting(query: &str) -> bool {
    let normalized: String = query
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        return false;
    }
    GREETINGS.iter().any(|g| {
        normalized == *g
            || normalized
                .strip_prefix(g)
                .is_some_and(|rest| matches!(rest.trim_start_matches(',').trim(), "there" | "all" | "so much"))
    })
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    complexity: String,
    #[serde(default)]
    time_sensitive: bool,
    #[serde(default)]
    requires_code_examples: bool,
    #[serde(default)]
    ambiguity_score: f32,
}

impl From<RawAnalysis> for AnalysisResult {
    fn from(raw: RawAnalysis) -> Self {
        let mut entities: Vec<String> = Vec::with_capacity(raw.entities.len());
        for entity in raw.entities {
            let entity = entity.trim().to_string();
            if !entity.is_empty() && !entities.contains(&entity) {
                entities.push(entity);
            }
        }

        let ambiguity = if raw.ambiguity_score.is_nan() {
            0.0
        } else {
            raw.ambiguity_score.clamp(0.0, 1.0)
        };

        AnalysisResult {
            intent: QueryIntent::parse(&raw.intent).unwrap_or_default(),
            entities,
            complexity: QueryComplexity::parse(&raw.complexity).unwrap_or_default(),
            time_sensitive: raw.time_sensitive,
            requires_code: raw.requires_code_examples,
            ambiguity,
        }
    }
}

/// Classifies intent, entities and complexity of a raw query
pub struct QueryAnalyzer {
    llm: Arc<dyn TextGenerator>,
    temperature: f32,
}

impl QueryAnalyzer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm, temperature: 0.0 }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Analyze a query
    ///
    /// Errors only when the generator fails or its output is unusable; the
    /// caller falls back to [`QueryAnalyzer::fallback`].
    pub async fn analyze(&self, query: &str) -> Result<AnalysisResult, AgentError> {
        if is_trivial_greeting(query) {
            tracing::debug!("Greeting detected lexically");
            return Ok(AnalysisResult {
                intent: QueryIntent::Greeting,
                ..Default::default()
            });
        }

        let request = PromptBuilder::new()
            .system_prompt(system::ANALYZER)
            .user_message(&PromptTemplates::analysis(query))
            .temperature(self.temperature)
            .json()
            .build();

        let response = self.llm.generate(request).await?;
        let raw: RawAnalysis = parse_json(&response.text)?;
        let analysis = AnalysisResult::from(raw);

        tracing::debug!(
            intent = analysis.intent.as_str(),
            entities = analysis.entities.len(),
            complexity = ?analysis.complexity,
            "Query analyzed"
        );
        Ok(analysis)
    }

    /// Analysis used when generation fails
    pub fn fallback() -> AnalysisResult {
        AnalysisResult::default()
    }
}
