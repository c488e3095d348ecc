//! Deterministic capability doubles for tests

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use multi_rag_core::{
    AnalysisResult, Candidate, Embedder, Error, GenerateRequest, GenerateResponse, RetrievalStrategy,
    RetrieveOptions, TextGenerator, VectorSearch, WebResult, WebSearch,
};

use crate::sparse_search::tokenize;
use crate::strategy::StrategyExecutor;
use crate::RagError;

/// Bag-of-words embedder hashing lowercased words into fixed buckets
pub struct KeywordEmbedder {
    dimension: usize,
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}

impl KeywordEmbedder {
    fn bucket(&self, word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimension as u64) as usize
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        for word in tokenize(text) {
            v[self.bucket(&word)] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> multi_rag_core::Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

/// Returns canned replies in order, repeating the last
pub struct CannedGenerator {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl CannedGenerator {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            last: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, _request: GenerateRequest) -> multi_rag_core::Result<GenerateResponse> {
        let next = self.replies.lock().pop_front();
        let text = match next {
            Some(reply) => {
                *self.last.lock() = reply.clone();
                reply
            }
            None => self.last.lock().clone(),
        };
        Ok(GenerateResponse::text(text))
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

/// Always fails
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _request: GenerateRequest) -> multi_rag_core::Result<GenerateResponse> {
        Err(Error::Llm("backend unavailable".to_string()))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Returns fixed candidates regardless of query
pub struct ScriptedVectorSearch {
    results: Vec<Candidate>,
}

impl ScriptedVectorSearch {
    pub fn new(results: Vec<Candidate>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl VectorSearch for ScriptedVectorSearch {
    async fn search(&self, _query: &str, options: &RetrieveOptions) -> multi_rag_core::Result<Vec<Candidate>> {
        Ok(self
            .results
            .iter()
            .filter(|c| c.score >= options.min_score)
            .take(options.top_k)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Returns fixed web results
pub struct ScriptedWebSearch {
    results: Vec<WebResult>,
}

impl ScriptedWebSearch {
    pub fn new(results: Vec<WebResult>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl WebSearch for ScriptedWebSearch {
    async fn search(&self, _query: &str, max_results: usize) -> multi_rag_core::Result<Vec<WebResult>> {
        Ok(self.results.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

enum Behaviour {
    Ok(Vec<Candidate>),
    Fail,
    Slow(Duration),
}

/// Strategy with a fixed outcome
pub struct StaticStrategy {
    strategy: RetrievalStrategy,
    behaviour: Behaviour,
}

impl StaticStrategy {
    pub fn ok(strategy: RetrievalStrategy, candidates: Vec<Candidate>) -> Self {
        Self {
            strategy,
            behaviour: Behaviour::Ok(candidates),
        }
    }

    pub fn failing(strategy: RetrievalStrategy) -> Self {
        Self {
            strategy,
            behaviour: Behaviour::Fail,
        }
    }

    pub fn slow(strategy: RetrievalStrategy, delay: Duration) -> Self {
        Self {
            strategy,
            behaviour: Behaviour::Slow(delay),
        }
    }
}

#[async_trait]
impl StrategyExecutor for StaticStrategy {
    fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    async fn execute(&self, _query: &str, _analysis: &AnalysisResult) -> Result<Vec<Candidate>, RagError> {
        match &self.behaviour {
            Behaviour::Ok(candidates) => Ok(candidates.clone()),
            Behaviour::Fail => Err(RagError::Search(format!("{} backend down", self.strategy))),
            Behaviour::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }
}
