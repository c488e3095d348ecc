//! Retrieval quality grading
//!
//! An LLM judge scores the top candidates against the query. When the judge
//! is unavailable, the mean candidate score decides.

use std::sync::Arc;

use serde::Deserialize;

use multi_rag_config::OrchestratorConfig;
use multi_rag_core::{Candidate, TextGenerator};
use multi_rag_llm::{parse_json, prompt::system, PromptBuilder, PromptTemplates};

use crate::state::{Grade, GradingResult};
use crate::AgentError;

#[derive(Debug, Deserialize)]
struct RawGrade {
    #[serde(default)]
    grade: String,
    #[serde(default)]
    relevance_score: f32,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    needs_rewrite: Option<bool>,
}

/// Mean of clamped candidate scores (0 for an empty list)
pub fn mean_score(candidates: &[Candidate]) -> f32 {
    if candidates.is_empty() {
        return 0.0;
    }
    candidates.iter().map(|c| c.clamped_score()).sum::<f32>() / candidates.len() as f32
}

pub struct Grader {
    llm: Arc<dyn TextGenerator>,
    threshold: f32,
    digest_size: usize,
    digest_chars: usize,
    temperature: f32,
}

impl Grader {
    pub fn new(llm: Arc<dyn TextGenerator>, config: &OrchestratorConfig) -> Self {
        Self {
            llm,
            threshold: config.grade_threshold,
            digest_size: config.grading_digest_size,
            digest_chars: config.digest_chars,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn digest(&self, candidates: &[Candidate]) -> String {
        candidates
            .iter()
            .take(self.digest_size)
            .enumerate()
            .map(|(i, c)| {
                let head: String = c.text.chars().take(self.digest_chars).collect();
                format!("[Doc {}] {}", i + 1, head)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn verdict(&self, judged_pass: bool, score: f32) -> Grade {
        if judged_pass && score >= self.threshold {
            Grade::Pass
        } else {
            Grade::Fail
        }
    }

    /// Grade candidates for `query`
    ///
    /// An empty list fails immediately with score 0. Errors only when the
    /// judge fails; the caller then uses [`Grader::fallback`].
    pub async fn grade(&self, query: &str, candidates: &[Candidate]) -> Result<GradingResult, AgentError> {
        if candidates.is_empty() {
            return Ok(GradingResult {
                grade: Grade::Fail,
                score: 0.0,
                reason: "No documents retrieved".to_string(),
                needs_rewrite: true,
            });
        }

        let request = PromptBuilder::new()
            .system_prompt(system::GRADER)
            .user_message(&PromptTemplates::grading(query, &self.digest(candidates)))
            .temperature(self.temperature)
            .json()
            .build();

        let response = self.llm.generate(request).await?;
        let raw: RawGrade = parse_json(&response.text)?;

        let score = if raw.relevance_score.is_nan() {
            0.0
        } else {
            raw.relevance_score.clamp(0.0, 1.0)
        };
        let grade = self.verdict(raw.grade.trim().eq_ignore_ascii_case("pass"), score);

        let result = GradingResult {
            grade,
            score,
            reason: raw.reasoning,
            needs_rewrite: raw.needs_rewrite.unwrap_or(grade == Grade::Fail) || grade == Grade::Fail,
        };
        tracing::debug!(grade = ?result.grade, score = result.score, "Graded retrieval");
        Ok(result)
    }

    /// Grade by mean retrieval score
    pub fn fallback(&self, candidates: &[Candidate]) -> GradingResult {
        let score = mean_score(candidates);
        let grade = self.verdict(true, score);
        GradingResult {
            grade,
            score,
            reason: "Fallback scoring based on retrieval scores".to_string(),
            needs_rewrite: grade == Grade::Fail,
        }
    }
}
