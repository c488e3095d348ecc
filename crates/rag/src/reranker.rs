//! Hybrid reranking
//!
//! Refines a fused ranking with a pairwise relevance scorer:
//!
//! ```text
//! normalized = clamp((raw + offset) / scale, 0, 1)
//! hybrid     = ce_weight * normalized + retrieval_weight * retrieval_score
//! ```
//!
//! Candidates are sorted by the hybrid score and truncated to `top_k`. When
//! the list is already within `top_k` the scorer is not called at all.
//!
//! Scorers report raw scores on the cross-encoder logit scale (roughly
//! -10..10), which the default normalization maps onto [0, 1].

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use multi_rag_config::RerankerConfig;
use multi_rag_core::{Candidate, GenerateRequest, RelevanceScorer, TextGenerator};

/// Reranker statistics
#[derive(Debug, Clone, Default)]
pub struct RerankerStats {
    /// Total rerank calls
    pub total_calls: usize,
    /// Calls skipped because the list was already within top_k
    pub skipped: usize,
    /// Total documents scored
    pub total_docs: usize,
    /// Scorer failures that fell back to retrieval order
    pub fallbacks: usize,
}

/// Hybrid reranker over an injectable [`RelevanceScorer`]
pub struct HybridReranker {
    scorer: Arc<dyn RelevanceScorer>,
    config: RerankerConfig,
    stats: Mutex<RerankerStats>,
}

impl HybridReranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, config: RerankerConfig) -> Self {
        Self {
            scorer,
            config,
            stats: Mutex::new(RerankerStats::default()),
        }
    }

    /// Reranker backed by [`SimpleScorer`]
    pub fn simple(config: RerankerConfig) -> Self {
        Self::new(Arc::new(SimpleScorer), config)
    }

    /// Map a raw scorer output onto [0, 1]
    pub fn normalize(&self, raw: f32) -> f32 {
        if raw.is_nan() {
            return 0.0;
        }
        ((raw + self.config.score_offset) / self.config.score_scale).clamp(0.0, 1.0)
    }

    /// Combine a normalized pairwise score with the retrieval score
    pub fn hybrid_score(&self, normalized: f32, retrieval: f32) -> f32 {
        self.config.ce_weight * normalized + self.config.retrieval_weight * retrieval
    }

    /// Rerank candidates for a query
    ///
    /// Never fails: if the scorer errors, the input order is kept and
    /// truncated to `top_k`.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Vec<Candidate> {
        self.stats.lock().total_calls += 1;

        if candidates.len() <= top_k {
            self.stats.lock().skipped += 1;
            return candidates;
        }

        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();

        let raw_scores = match self.scorer.score_pairs(query, &passages).await {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                tracing::warn!(
                    scorer = self.scorer.name(),
                    expected = candidates.len(),
                    got = scores.len(),
                    "Scorer returned wrong number of scores, falling back to retrieval order"
                );
                self.stats.lock().fallbacks += 1;
                candidates.truncate(top_k);
                return candidates;
            }
            Err(e) => {
                tracing::warn!(
                    scorer = self.scorer.name(),
                    error = %e,
                    "Reranking failed, falling back to retrieval order"
                );
                self.stats.lock().fallbacks += 1;
                candidates.truncate(top_k);
                return candidates;
            }
        };

        self.stats.lock().total_docs += candidates.len();

        let mut scored: Vec<(f32, Candidate)> = candidates
            .into_iter()
            .zip(raw_scores)
            .map(|(candidate, raw)| {
                let normalized = self.normalize(raw);
                let retrieval = candidate.clamped_score();
                let hybrid = self.hybrid_score(normalized, retrieval);
                let mut candidate = candidate
                    .with_metadata("retrieval_score", retrieval as f64)
                    .with_metadata("rerank_score", normalized as f64);
                candidate.score = hybrid.clamp(0.0, 1.0);
                (hybrid, candidate)
            })
            .collect();

        // Stable sort keeps retrieval order for equal hybrid scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        tracing::debug!(
            scorer = self.scorer.name(),
            scored = scored.len(),
            top_k,
            "Reranked candidates"
        );

        scored.into_iter().take(top_k).map(|(_, c)| c).collect()
    }

    /// Get reranker statistics
    pub fn stats(&self) -> RerankerStats {
        self.stats.lock().clone()
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        *self.stats.lock() = RerankerStats::default();
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Keyword-overlap scorer (no model required)
pub struct SimpleScorer;

impl SimpleScorer {
    /// Jaccard overlap of lowercased words, in [0, 1]
    pub fn score(query: &str, document: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let doc_lower = document.to_lowercase();

        let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
        let doc_words: HashSet<&str> = doc_lower.split_whitespace().collect();

        let overlap = query_words.intersection(&doc_words).count();
        let union = query_words.union(&doc_words).count();

        if union > 0 {
            overlap as f32 / union as f32
        } else {
            0.0
        }
    }
}

#[async_trait]
impl RelevanceScorer for SimpleScorer {
    async fn score_pairs(
        &self,
        query: &str,
        passages: &[String],
    ) -> multi_rag_core::Result<Vec<f32>> {
        // Onto the logit scale so the default normalization is the identity
        Ok(passages
            .iter()
            .map(|p| Self::score(query, p) * 20.0 - 10.0)
            .collect())
    }

    fn name(&self) -> &str {
        "keyword_overlap"
    }
}

/// LLM-as-judge relevance scorer
///
/// Asks the generator for a 0..1 rating per passage. Unparsable ratings
/// count as neutral (0.5); a generation failure fails the whole call so the
/// reranker falls back to retrieval order.
pub struct LlmScorer {
    llm: Arc<dyn TextGenerator>,
    max_passage_chars: usize,
}

impl LlmScorer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            llm,
            max_passage_chars: 500,
        }
    }

    fn parse_rating(text: &str) -> f32 {
        text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .find_map(|token| token.parse::<f32>().ok())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(0.5)
    }
}

#[async_trait]
impl RelevanceScorer for LlmScorer {
    async fn score_pairs(
        &self,
        query: &str,
        passages: &[String],
    ) -> multi_rag_core::Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for passage in passages {
            let excerpt: String = passage.chars().take(self.max_passage_chars).collect();
            let prompt = format!(
                "Rate the relevance of this document to the query on a scale of 0.0 to 1.0.\n\nQuery: \"{}\"\n\nDocument:\n{}\n\nReturn ONLY a number between 0.0 and 1.0.",
                query, excerpt
            );
            let request = GenerateRequest::new(
                "You are a relevance scoring expert. Return only a decimal number.",
            )
            .with_user_message(prompt)
            .with_temperature(0.0)
            .with_max_tokens(8);

            let response = self.llm.generate(request).await?;
            scores.push(Self::parse_rating(&response.text) * 20.0 - 10.0);
        }
        Ok(scores)
    }

    fn name(&self) -> &str {
        "llm_judge"
    }
}
