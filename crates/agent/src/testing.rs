//! Deterministic capability doubles for pipeline tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use multi_rag_core::{
    AnalysisResult, Candidate, Error, GenerateRequest, GenerateResponse, RetrievalStrategy, Role,
    TextGenerator,
};
use multi_rag_rag::{RagError, StrategyExecutor};

pub use multi_rag_rag::testing::{
    CannedGenerator, FailingGenerator, KeywordEmbedder, ScriptedVectorSearch, ScriptedWebSearch,
    StaticStrategy,
};

/// Replies keyed by system prompt, so one generator can serve every stage
///
/// Each key holds a queue; the last reply repeats. Unknown system prompts
/// fail like a provider fault.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<String, VecDeque<String>>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, system_prompt: &str, replies: &[&str]) -> Self {
        self.replies.lock().insert(
            system_prompt.to_string(),
            replies.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Sleep before answering calls with this system prompt
    pub fn delay_on(mut self, system_prompt: &str, delay: Duration) -> Self {
        self.delays.insert(system_prompt.to_string(), delay);
        self
    }

    /// System prompts of every call, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, system_prompt: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == system_prompt).count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerateRequest) -> multi_rag_core::Result<GenerateResponse> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().push(system.clone());
        if let Some(delay) = self.delays.get(&system) {
            tokio::time::sleep(*delay).await;
        }

        let mut replies = self.replies.lock();
        let queue = replies
            .get_mut(&system)
            .ok_or_else(|| Error::Llm("no scripted reply".to_string()))?;
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply
            .map(GenerateResponse::text)
            .ok_or_else(|| Error::Llm("no scripted reply".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Strategy that records the queries it receives
pub struct RecordingStrategy {
    strategy: RetrievalStrategy,
    candidates: Vec<Candidate>,
    delay: Option<Duration>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl RecordingStrategy {
    pub fn new(strategy: RetrievalStrategy, candidates: Vec<Candidate>) -> Self {
        Self {
            strategy,
            candidates,
            delay: None,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the recorded queries
    pub fn queries(&self) -> Arc<Mutex<Vec<String>>> {
        self.queries.clone()
    }
}

#[async_trait]
impl StrategyExecutor for RecordingStrategy {
    fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    async fn execute(&self, query: &str, _analysis: &AnalysisResult) -> Result<Vec<Candidate>, RagError> {
        self.queries.lock().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.candidates.clone())
    }
}
