//! Query rewriting for the retry loop

use std::sync::Arc;

use multi_rag_core::TextGenerator;
use multi_rag_llm::{prompt::system, PromptBuilder, PromptTemplates};

use crate::AgentError;

pub struct QueryRewriter {
    llm: Arc<dyn TextGenerator>,
    temperature: f32,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm, temperature: 0.3 }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Strip quoting and labels models like to add around a bare query
    fn clean(raw: &str) -> String {
        let line = raw
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        let line = line
            .strip_prefix("Rewritten query:")
            .or_else(|| line.strip_prefix("Rewritten Query:"))
            .unwrap_or(line)
            .trim();
        line.trim_matches(|c: char| c == '"' || c == '\'' || c == '`').trim().to_string()
    }

    /// Produce a revised query
    ///
    /// Fails when generation fails or the output is empty or identical to
    /// `current`; the caller treats that as a no-op rewrite.
    pub async fn rewrite(
        &self,
        original: &str,
        current: &str,
        reason: &str,
        attempt: u32,
    ) -> Result<String, AgentError> {
        let request = PromptBuilder::new()
            .system_prompt(system::REWRITER)
            .user_message(&PromptTemplates::rewrite(original, reason, attempt))
            .temperature(self.temperature)
            .build();

        let response = self.llm.generate(request).await?;
        let rewritten = Self::clean(&response.text);

        if rewritten.is_empty() || rewritten.eq_ignore_ascii_case(current.trim()) {
            return Err(AgentError::NoOpRewrite);
        }

        tracing::debug!(attempt, original, rewritten = %rewritten, "Query rewritten");
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedGenerator, FailingGenerator};

    #[test]
    fn test_clean() {
        assert_eq!(QueryRewriter::clean("\"reciprocal rank fusion\"\n"), "reciprocal rank fusion");
        assert_eq!(QueryRewriter::clean("Rewritten query: `bm25 scoring`"), "bm25 scoring");
        assert_eq!(QueryRewriter::clean("\n\n  graph traversal  \nextra"), "graph traversal");
        assert_eq!(QueryRewriter::clean(""), "");
    }

    #[tokio::test]
    async fn test_rewrite() {
        let rewriter = QueryRewriter::new(Arc::new(CannedGenerator::new(vec!["\"how does RRF fuse rankings\""])));
        let out = rewriter.rewrite("rrf?", "rrf?", "too vague", 1).await.unwrap();
        assert_eq!(out, "how does RRF fuse rankings");
    }

    #[tokio::test]
    async fn test_identical_or_failed_rewrite_is_noop() {
        let rewriter = QueryRewriter::new(Arc::new(CannedGenerator::new(vec!["RRF?"])));
        let err = rewriter.rewrite("rrf?", "rrf?", "", 1).await.unwrap_err();
        assert!(matches!(err, AgentError::NoOpRewrite));

        let rewriter = QueryRewriter::new(Arc::new(FailingGenerator));
        assert!(rewriter.rewrite("rrf?", "rrf?", "", 1).await.is_err());
    }
}
