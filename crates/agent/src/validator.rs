//! Evidence validation
//!
//! Estimates answer confidence from the final candidates and flags issues
//! for synthesis. Never blocks the pipeline.

use std::sync::Arc;

use serde::Deserialize;

use multi_rag_config::OrchestratorConfig;
use multi_rag_core::{Candidate, TextGenerator};
use multi_rag_llm::{parse_json, prompt::system, PromptBuilder, PromptTemplates};

use crate::grader::mean_score;
use crate::state::ValidationResult;
use crate::AgentError;

const RELEVANCE_WEIGHT: f32 = 0.4;
const CONSISTENCY_WEIGHT: f32 = 0.3;
const COVERAGE_WEIGHT: f32 = 0.3;
const HALLUCINATION_RELEVANCE: f32 = 0.5;
const MAX_ISSUES: usize = 2;
const SOURCE_CHARS: usize = 400;

fn default_relevance() -> f32 {
    0.5
}
fn default_consistency() -> f32 {
    0.8
}
fn default_coverage() -> f32 {
    0.5
}

#[derive(Debug, Deserialize)]
struct RawValidation {
    #[serde(default = "default_relevance")]
    relevance_score: f32,
    #[serde(default = "default_consistency")]
    consistency_score: f32,
    #[serde(default = "default_coverage")]
    coverage_score: f32,
    #[serde(default, alias = "issues")]
    potential_issues: Vec<String>,
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub struct Validator {
    llm: Arc<dyn TextGenerator>,
    pass_threshold: f32,
    max_sources: usize,
    temperature: f32,
}

impl Validator {
    pub fn new(llm: Arc<dyn TextGenerator>, config: &OrchestratorConfig) -> Self {
        Self {
            llm,
            pass_threshold: config.validation_pass_threshold,
            max_sources: config.answer_sources,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn sources(&self, candidates: &[Candidate]) -> String {
        candidates
            .iter()
            .take(self.max_sources)
            .enumerate()
            .map(|(i, c)| {
                let head: String = c.text.chars().take(SOURCE_CHARS).collect();
                format!("[Source {}] (Score: {:.2})\n{}", i + 1, c.score, head)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Weighted confidence from the three judged dimensions
    pub fn confidence(relevance: f32, consistency: f32, coverage: f32) -> f32 {
        RELEVANCE_WEIGHT * relevance + CONSISTENCY_WEIGHT * consistency + COVERAGE_WEIGHT * coverage
    }

    pub async fn validate(&self, query: &str, candidates: &[Candidate]) -> Result<ValidationResult, AgentError> {
        if candidates.is_empty() {
            return Ok(ValidationResult {
                relevance: 0.0,
                consistency: 0.0,
                coverage: 0.0,
                confidence: 0.0,
                issues: vec!["No documents retrieved to validate".to_string()],
                hallucination_risk: false,
                passed: false,
            });
        }

        let request = PromptBuilder::new()
            .system_prompt(system::VALIDATOR)
            .user_message(&PromptTemplates::validation(query, &self.sources(candidates)))
            .temperature(self.temperature)
            .json()
            .build();

        let response = self.llm.generate(request).await?;
        let raw: RawValidation = parse_json(&response.text)?;

        let relevance = unit(raw.relevance_score);
        let consistency = unit(raw.consistency_score);
        let coverage = unit(raw.coverage_score);
        let confidence = Self::confidence(relevance, consistency, coverage);
        let issues: Vec<String> = raw
            .potential_issues
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();

        let result = ValidationResult {
            relevance,
            consistency,
            coverage,
            confidence,
            hallucination_risk: relevance < HALLUCINATION_RELEVANCE || issues.len() > MAX_ISSUES,
            passed: confidence >= self.pass_threshold,
            issues,
        };
        tracing::debug!(
            confidence = result.confidence,
            issues = result.issues.len(),
            hallucination_risk = result.hallucination_risk,
            "Validated evidence"
        );
        Ok(result)
    }

    /// Confidence from mean retrieval score
    pub fn fallback(&self, candidates: &[Candidate]) -> ValidationResult {
        let confidence = mean_score(candidates);
        ValidationResult {
            relevance: confidence,
            consistency: confidence,
            coverage: confidence,
            confidence,
            issues: Vec::new(),
            hallucination_risk: confidence < HALLUCINATION_RELEVANCE,
            passed: confidence >= self.pass_threshold,
        }
    }
}
