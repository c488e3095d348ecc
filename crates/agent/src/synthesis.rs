//! Answer synthesis
//!
//! Composes the final answer from the top candidates, the validation report
//! and the conversation window. Generation failures degrade to an extractive
//! answer instead of an error.

use std::sync::Arc;

use multi_rag_config::OrchestratorConfig;
use multi_rag_core::{Candidate, ConversationMessage, SourceRef, TextGenerator};
use multi_rag_llm::{prompt::system, PromptBuilder, PromptTemplates};

use crate::grader::mean_score;
use crate::state::ValidationResult;
use crate::AgentError;

/// Answer returned when nothing was retrieved
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer this question accurately.";
/// Confidence attached to [`INSUFFICIENT_INFORMATION`]
pub const INSUFFICIENT_CONFIDENCE: f32 = 0.1;

const GREETING_REPLY: &str = "Hello! Ask me a technical question and I'll look it up for you.";
const CONTEXT_CHARS: usize = 500;

/// Synthesized answer
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
}

impl Synthesis {
    pub fn insufficient() -> Self {
        Self {
            answer: INSUFFICIENT_INFORMATION.to_string(),
            sources: Vec::new(),
            confidence: INSUFFICIENT_CONFIDENCE,
        }
    }
}

pub struct Synthesizer {
    llm: Arc<dyn TextGenerator>,
    max_sources: usize,
    preview_chars: usize,
    temperature: f32,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn TextGenerator>, config: &OrchestratorConfig) -> Self {
        Self {
            llm,
            max_sources: config.answer_sources,
            preview_chars: config.preview_chars,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cited sources for the top candidates
    pub fn sources(&self, candidates: &[Candidate]) -> Vec<SourceRef> {
        candidates
            .iter()
            .take(self.max_sources)
            .map(|c| SourceRef {
                id: c.id.clone(),
                score: c.score,
                preview: c.preview(self.preview_chars),
            })
            .collect()
    }

    fn context(&self, candidates: &[Candidate]) -> String {
        candidates
            .iter()
            .take(self.max_sources)
            .enumerate()
            .map(|(i, c)| {
                let text: String = c.text.chars().take(CONTEXT_CHARS).collect();
                format!("[Source {}] {}", i + 1, text)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn caveats(validation: Option<&ValidationResult>) -> Vec<String> {
        let Some(validation) = validation else {
            return Vec::new();
        };
        let mut caveats = validation.issues.clone();
        if validation.hallucination_risk {
            caveats.push("Sources may not fully support an answer; say so where unsure".to_string());
        }
        caveats
    }

    fn confidence(&self, candidates: &[Candidate], validation: Option<&ValidationResult>) -> f32 {
        match validation {
            Some(v) => v.confidence,
            None => mean_score(&candidates[..candidates.len().min(self.max_sources)]),
        }
    }

    /// Generate a cited answer
    ///
    /// Empty candidates yield [`Synthesis::insufficient`] without calling the
    /// generator. Errors only when generation fails; the caller then uses
    /// [`Synthesizer::extractive_fallback`].
    pub async fn synthesize(
        &self,
        query: &str,
        candidates: &[Candidate],
        validation: Option<&ValidationResult>,
        history: &[ConversationMessage],
    ) -> Result<Synthesis, AgentError> {
        if candidates.is_empty() {
            return Ok(Synthesis::insufficient());
        }

        let request = PromptBuilder::new()
            .system_prompt(system::SYNTHESIZER)
            .with_context(&self.context(candidates))
            .with_history(history)
            .user_message(&PromptTemplates::synthesis(query, &Self::caveats(validation)))
            .temperature(self.temperature)
            .build();

        let response = self.llm.generate(request).await?;
        let answer = response.text.trim().to_string();
        if answer.is_empty() {
            return Err(AgentError::InvalidOutput("empty answer".to_string()));
        }

        Ok(Synthesis {
            answer,
            sources: self.sources(candidates),
            confidence: self.confidence(candidates, validation),
        })
    }

    /// Answer from the best candidate's text, at half confidence
    pub fn extractive_fallback(
        &self,
        candidates: &[Candidate],
        validation: Option<&ValidationResult>,
    ) -> Synthesis {
        let Some(best) = candidates.first() else {
            return Synthesis::insufficient();
        };
        Synthesis {
            answer: format!("Based on the retrieved sources:\n\n{}", best.text),
            sources: self.sources(candidates),
            confidence: self.confidence(candidates, validation) * 0.5,
        }
    }

    /// Reply to small talk without retrieval
    pub async fn greet(&self, query: &str, history: &[ConversationMessage]) -> Result<Synthesis, AgentError> {
        let request = PromptBuilder::new()
            .system_prompt(system::CONVERSATIONAL)
            .with_history(history)
            .user_message(query)
            .temperature(self.temperature)
            .build();
        let response = self.llm.generate(request).await?;
        let answer = response.text.trim().to_string();
        if answer.is_empty() {
            return Err(AgentError::InvalidOutput("empty greeting".to_string()));
        }
        Ok(Synthesis {
            answer,
            sources: Vec::new(),
            confidence: 1.0,
        })
    }

    pub fn greeting_fallback() -> Synthesis {
        Synthesis {
            answer: GREETING_REPLY.to_string(),
            sources: Vec::new(),
            confidence: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedGenerator, FailingGenerator};
    use multi_rag_core::SourceTag;

    fn docs(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| {
                Candidate::new(
                    format!("d{}", i),
                    format!("{}{}", i, "y".repeat(150)),
                    1.0 - i as f32 * 0.1,
                    SourceTag::Vector,
                )
            })
            .collect()
    }

    fn synthesizer(llm: Arc<dyn TextGenerator>) -> Synthesizer {
        Synthesizer::new(llm, &OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_empty_candidates_insufficient() {
        let out = synthesizer(Arc::new(FailingGenerator))
            .synthesize("q", &[], None, &[])
            .await
            .unwrap();
        assert_eq!(out.answer, "I don't have enough information to answer this question accurately.");
        assert_eq!(out.confidence, 0.1);
        assert!(out.sources.is_empty());
    }

    #[tokio::test]
    async fn test_sources_top_five_with_preview() {
        let s = synthesizer(Arc::new(CannedGenerator::new(vec!["RRF fuses rankings [Source 1]."])));
        let out = s.synthesize("q", &docs(7), None, &[]).await.unwrap();

        assert_eq!(out.sources.len(), 5);
        assert_eq!(out.sources[0].id, "d0");
        assert_eq!(out.sources[0].preview.chars().count(), 103);
        assert!(out.sources[0].preview.ends_with("..."));
        // Mean of top five scores
        assert!((out.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_validation_confidence_preferred() {
        let s = synthesizer(Arc::new(CannedGenerator::new(vec!["answer"])));
        let validation = ValidationResult {
            relevance: 0.9,
            consistency: 0.9,
            coverage: 0.9,
            confidence: 0.9,
            issues: vec![],
            hallucination_risk: false,
            passed: true,
        };
        let out = s.synthesize("q", &docs(2), Some(&validation), &[]).await.unwrap();
        assert_eq!(out.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_generation_failure_extractive_fallback() {
        let s = synthesizer(Arc::new(FailingGenerator));
        let candidates = docs(2);
        assert!(s.synthesize("q", &candidates, None, &[]).await.is_err());

        let out = s.extractive_fallback(&candidates, None);
        assert!(out.answer.contains(&candidates[0].text));
        assert!((out.confidence - 0.475).abs() < 1e-6);
        assert_eq!(out.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_greeting() {
        let s = synthesizer(Arc::new(CannedGenerator::new(vec!["Hi! What can I help with?"])));
        let out = s.greet("hi", &[]).await.unwrap();
        assert!(out.sources.is_empty());
        assert_eq!(out.answer, "Hi! What can I help with?");
    }
}
