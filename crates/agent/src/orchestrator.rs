//! Pipeline orchestrator
//!
//! Drives one request through an explicit stage machine:
//!
//! ```text
//! Start -> Analyze -> Route -> Retrieve -> Grade -> Validate -> Synthesize -> Done
//!                        |         ^          |
//!                        |         +- Rewrite +   (score below threshold, budget left)
//!                        +---------------------------------> Synthesize   (greetings)
//! ```
//!
//! The rewrite cycle is bounded by a counter carried in [`PipelineState`].
//! Stage failures are recorded as [`StageError`](multi_rag_core::StageError)s
//! and replaced by deterministic fallbacks, so every run reaches `Done`. The
//! request deadline is checked before each stage and bounds every awaited
//! call; once it passes the run jumps to `Synthesize` and answers from
//! whatever state exists.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{timeout_at, Instant};

use multi_rag_config::{OrchestratorConfig, RerankerConfig};
use multi_rag_core::{
    ConversationMessage, ConversationStore, PipelineEvent, QueryRequest, QueryResponse,
    ResponseMetadata, RetrievalStrategy, StageErrorKind, TextGenerator,
};
use multi_rag_rag::{HybridReranker, ParallelRetriever};

use crate::analyzer::QueryAnalyzer;
use crate::grader::Grader;
use crate::rewriter::QueryRewriter;
use crate::router::Router;
use crate::state::{PipelineState, Stage};
use crate::synthesis::{Synthesis, Synthesizer};
use crate::validator::Validator;

const DEFAULT_RERANK_TOP_K: usize = 5;
const DEFAULT_WINDOW_TOKENS: usize = 4000;

type Events<'a> = Option<&'a UnboundedSender<PipelineEvent>>;

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    llm: Arc<dyn TextGenerator>,
    retriever: Arc<ParallelRetriever>,
    reranker: Option<Arc<HybridReranker>>,
    memory: Option<Arc<dyn ConversationStore>>,
    config: OrchestratorConfig,
    rerank_top_k: usize,
    window_tokens: usize,
    judge_temperature: f32,
    synthesis_temperature: f32,
}

impl OrchestratorBuilder {
    pub fn new(llm: Arc<dyn TextGenerator>, retriever: Arc<ParallelRetriever>) -> Self {
        Self {
            llm,
            retriever,
            reranker: None,
            memory: None,
            config: OrchestratorConfig::default(),
            rerank_top_k: DEFAULT_RERANK_TOP_K,
            window_tokens: DEFAULT_WINDOW_TOKENS,
            judge_temperature: 0.0,
            synthesis_temperature: 0.7,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reranker(mut self, reranker: Arc<HybridReranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn ConversationStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn rerank_top_k(mut self, top_k: usize) -> Self {
        self.rerank_top_k = top_k.max(1);
        self
    }

    /// Token budget for the conversation window passed to synthesis
    pub fn window_tokens(mut self, tokens: usize) -> Self {
        self.window_tokens = tokens;
        self
    }

    /// Temperatures for judgment calls and for answer synthesis
    pub fn temperatures(mut self, judge: f32, synthesis: f32) -> Self {
        self.judge_temperature = judge;
        self.synthesis_temperature = synthesis;
        self
    }

    pub fn build(self) -> Orchestrator {
        let router = Router::new(
            self.retriever.has_strategy(RetrievalStrategy::Graph),
            self.retriever.has_strategy(RetrievalStrategy::Web),
        );
        let reranker = self
            .reranker
            .unwrap_or_else(|| Arc::new(HybridReranker::simple(RerankerConfig::default())));

        Orchestrator {
            analyzer: QueryAnalyzer::new(self.llm.clone()).with_temperature(self.judge_temperature),
            router,
            retriever: self.retriever,
            reranker,
            grader: Grader::new(self.llm.clone(), &self.config).with_temperature(self.judge_temperature),
            rewriter: QueryRewriter::new(self.llm.clone()),
            validator: Validator::new(self.llm.clone(), &self.config)
                .with_temperature(self.judge_temperature),
            synthesizer: Synthesizer::new(self.llm, &self.config)
                .with_temperature(self.synthesis_temperature),
            memory: self.memory,
            config: self.config,
            rerank_top_k: self.rerank_top_k,
            window_tokens: self.window_tokens,
        }
    }
}

/// Retrieval orchestration engine
///
/// Holds long-lived capabilities only; all per-request data lives in a
/// [`PipelineState`] owned by the call, so one instance serves concurrent
/// requests.
pub struct Orchestrator {
    analyzer: QueryAnalyzer,
    router: Router,
    retriever: Arc<ParallelRetriever>,
    reranker: Arc<HybridReranker>,
    grader: Grader,
    rewriter: QueryRewriter,
    validator: Validator,
    synthesizer: Synthesizer,
    memory: Option<Arc<dyn ConversationStore>>,
    config: OrchestratorConfig,
    rerank_top_k: usize,
    window_tokens: usize,
}

impl Orchestrator {
    pub fn builder(llm: Arc<dyn TextGenerator>, retriever: Arc<ParallelRetriever>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(llm, retriever)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answer a request
    ///
    /// Always returns a well-formed response; recovered failures are listed
    /// in `metadata.errors`.
    pub async fn process(&self, request: QueryRequest, events: Events<'_>) -> QueryResponse {
        let started = Instant::now();
        metrics::counter!("multi_rag_requests_total").increment(1);

        let history = match request.conversation_history.clone() {
            Some(history) => history,
            None => self.load_history(request.session_id.as_deref()).await,
        };

        let state = PipelineState::new(request.query.clone())
            .with_session(request.session_id.clone())
            .with_history(history);

        let (state, synthesis) = self.run(state, events).await;

        if let Some(session_id) = state.session_id.as_deref() {
            self.remember(session_id, &state.original_query, &synthesis.answer).await;
        }

        let elapsed = started.elapsed();
        metrics::histogram!("multi_rag_request_duration_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            trace = ?state.trace_names(),
            rewrites = state.rewrite_count,
            errors = state.errors.len(),
            degraded = state.degraded,
            confidence = synthesis.confidence,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        QueryResponse {
            answer: synthesis.answer,
            sources: synthesis.sources,
            metadata: ResponseMetadata {
                confidence: synthesis.confidence,
                strategies_used: state.strategies_used.clone(),
                rewrites: state.rewrite_count,
                query_analysis: state.analysis.clone(),
                agent_trace: state.trace_names(),
                errors: state.errors,
                degraded: state.degraded,
            },
        }
    }

    /// Drive `state` from `Start` to `Done`
    pub async fn run(&self, mut state: PipelineState, events: Events<'_>) -> (PipelineState, Synthesis) {
        let deadline = Instant::now() + self.config.request_deadline();
        let mut stage = Stage::Start;
        let mut synthesis = None;

        loop {
            if !matches!(stage, Stage::Synthesize | Stage::Done) && Instant::now() >= deadline {
                self.degrade(&mut state, stage);
                stage = Stage::Synthesize;
            }
            state.enter(stage);

            stage = match stage {
                Stage::Start => Stage::Analyze,
                Stage::Analyze => {
                    self.analyze(&mut state, deadline, events).await;
                    Stage::Route
                }
                Stage::Route => {
                    self.route(&mut state, events);
                    if state.is_greeting() {
                        Stage::Synthesize
                    } else {
                        Stage::Retrieve
                    }
                }
                Stage::Retrieve => {
                    self.retrieve(&mut state, deadline, events).await;
                    Stage::Grade
                }
                Stage::Grade => {
                    self.grade(&mut state, deadline, events).await;
                    if self.should_rewrite(&state) {
                        Stage::Rewrite
                    } else {
                        Stage::Validate
                    }
                }
                Stage::Rewrite => {
                    self.rewrite(&mut state, deadline, events).await;
                    Stage::Retrieve
                }
                Stage::Validate => {
                    self.validate(&mut state, deadline, events).await;
                    Stage::Synthesize
                }
                Stage::Synthesize => {
                    synthesis = Some(self.synthesize(&mut state, deadline, events).await);
                    Stage::Done
                }
                Stage::Done => break,
            };
        }

        let synthesis = synthesis.unwrap_or_else(Synthesis::insufficient);
        (state, synthesis)
    }

    fn should_rewrite(&self, state: &PipelineState) -> bool {
        state
            .grading
            .as_ref()
            .is_some_and(|g| g.score < self.grader.threshold())
            && state.rewrite_count < self.config.max_rewrites
    }

    fn degrade(&self, state: &mut PipelineState, stage: Stage) {
        if state.degraded {
            return;
        }
        tracing::warn!(stage = %stage, deadline_ms = self.config.request_deadline_ms, "Request deadline exceeded, answering from partial state");
        metrics::counter!("multi_rag_degraded_total").increment(1);
        state.degraded = true;
        state.record_error(
            stage,
            StageErrorKind::Timeout,
            format!("request deadline of {}ms exceeded", self.config.request_deadline_ms),
        );
    }

    fn generation_failure(state: &mut PipelineState, stage: Stage, error: &crate::AgentError) {
        tracing::warn!(stage = %stage, error = %error, "Stage failed, falling back");
        state.record_error(stage, StageErrorKind::GenerationFailure, error.to_string());
    }

    fn emit(events: Events<'_>, stage: Stage, message: impl Into<String>) {
        if let Some(tx) = events {
            let _ = tx.send(PipelineEvent::thinking(stage.as_str(), message));
        }
    }

    async fn analyze(&self, state: &mut PipelineState, deadline: Instant, events: Events<'_>) {
        Self::emit(events, Stage::Analyze, "Analyzing query");
        let analysis = match timeout_at(deadline, self.analyzer.analyze(state.query())).await {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                Self::generation_failure(state, Stage::Analyze, &e);
                QueryAnalyzer::fallback()
            }
            Err(_) => {
                self.degrade(state, Stage::Analyze);
                QueryAnalyzer::fallback()
            }
        };
        state.analysis = Some(analysis);
    }

    fn route(&self, state: &mut PipelineState, events: Events<'_>) {
        if state.is_greeting() {
            Self::emit(events, Stage::Route, "Greeting detected, skipping retrieval");
            return;
        }
        let analysis = state.analysis.clone().unwrap_or_default();
        let decision = self.router.route(&analysis);
        let names: Vec<&str> = decision.strategies.iter().map(|s| s.as_str()).collect();
        Self::emit(events, Stage::Route, format!("Routing to {}", names.join(", ")));
        tracing::debug!(strategies = ?names, reasons = ?decision.reasons, "Routed query");
        state.routing = Some(decision);
    }

    async fn retrieve(&self, state: &mut PipelineState, deadline: Instant, events: Events<'_>) {
        let strategies = state
            .routing
            .as_ref()
            .map(|r| r.strategies.clone())
            .unwrap_or_else(|| vec![RetrievalStrategy::Vector]);
        let analysis = state.analysis.clone().unwrap_or_default();
        let query = state.query().to_string();

        Self::emit(events, Stage::Retrieve, format!("Searching {} source(s)", strategies.len()));

        let pass = async {
            let mut outcome = self.retriever.retrieve(&query, &analysis, &strategies, events).await;
            let fused = std::mem::take(&mut outcome.candidates);
            let candidates = self.reranker.rerank(&query, fused, self.rerank_top_k).await;
            (outcome, candidates)
        };

        let (outcome, candidates) = match timeout_at(deadline, pass).await {
            Ok(result) => result,
            Err(_) => {
                self.degrade(state, Stage::Retrieve);
                return;
            }
        };

        for strategy in &outcome.executed {
            if outcome.counts.contains_key(strategy) {
                state.mark_used(*strategy);
            }
        }
        for failure in &outcome.failures {
            state.record_error(
                Stage::Retrieve,
                StageErrorKind::SourceUnavailable,
                format!("{}: {}", failure.strategy, failure.message),
            );
        }

        if candidates.is_empty() {
            state.record_error(
                Stage::Retrieve,
                StageErrorKind::NoResults,
                format!("no candidates for query '{}'", query),
            );
            // Keep the previous pass's results as the best available
            if !state.candidates.is_empty() {
                return;
            }
        }
        state.candidates = candidates;
    }

    async fn grade(&self, state: &mut PipelineState, deadline: Instant, events: Events<'_>) {
        Self::emit(events, Stage::Grade, "Grading retrieved documents");
        let grading = match timeout_at(deadline, self.grader.grade(state.query(), &state.candidates)).await {
            Ok(Ok(grading)) => grading,
            Ok(Err(e)) => {
                Self::generation_failure(state, Stage::Grade, &e);
                self.grader.fallback(&state.candidates)
            }
            Err(_) => {
                self.degrade(state, Stage::Grade);
                return;
            }
        };
        state.grading = Some(grading);
    }

    async fn rewrite(&self, state: &mut PipelineState, deadline: Instant, events: Events<'_>) {
        let attempt = state.rewrite_count + 1;
        Self::emit(events, Stage::Rewrite, format!("Rewriting query (attempt {})", attempt));
        let reason = state
            .grading
            .as_ref()
            .map(|g| g.reason.clone())
            .unwrap_or_default();

        let result = timeout_at(
            deadline,
            self.rewriter
                .rewrite(&state.original_query, state.query(), &reason, attempt),
        )
        .await;

        match result {
            Ok(Ok(query)) => {
                tracing::info!(attempt, query = %query, "Query rewritten");
                metrics::counter!("multi_rag_rewrites_total").increment(1);
                state.replace_query(query);
                state.rewrite_count = attempt;
            }
            Ok(Err(e)) => {
                // Retrying the same query cannot change the grade
                Self::generation_failure(state, Stage::Rewrite, &e);
                state.rewrite_count = self.config.max_rewrites;
            }
            Err(_) => self.degrade(state, Stage::Rewrite),
        }
    }

    async fn validate(&self, state: &mut PipelineState, deadline: Instant, events: Events<'_>) {
        Self::emit(events, Stage::Validate, "Validating evidence");
        let validation =
            match timeout_at(deadline, self.validator.validate(state.query(), &state.candidates)).await {
                Ok(Ok(validation)) => validation,
                Ok(Err(e)) => {
                    Self::generation_failure(state, Stage::Validate, &e);
                    self.validator.fallback(&state.candidates)
                }
                Err(_) => {
                    self.degrade(state, Stage::Validate);
                    return;
                }
            };
        state.validation = Some(validation);
    }

    async fn synthesize(&self, state: &mut PipelineState, deadline: Instant, events: Events<'_>) -> Synthesis {
        Self::emit(events, Stage::Synthesize, "Composing answer");

        if state.is_greeting() {
            return match timeout_at(deadline, self.synthesizer.greet(&state.original_query, &state.history)).await {
                Ok(Ok(synthesis)) => synthesis,
                Ok(Err(e)) => {
                    Self::generation_failure(state, Stage::Synthesize, &e);
                    Synthesizer::greeting_fallback()
                }
                Err(_) => {
                    self.degrade(state, Stage::Synthesize);
                    Synthesizer::greeting_fallback()
                }
            };
        }

        if state.degraded {
            return self
                .synthesizer
                .extractive_fallback(&state.candidates, state.validation.as_ref());
        }

        let result = timeout_at(
            deadline,
            self.synthesizer.synthesize(
                &state.original_query,
                &state.candidates,
                state.validation.as_ref(),
                &state.history,
            ),
        )
        .await;
        match result {
            Ok(Ok(synthesis)) => synthesis,
            Ok(Err(e)) => {
                Self::generation_failure(state, Stage::Synthesize, &e);
                self.synthesizer
                    .extractive_fallback(&state.candidates, state.validation.as_ref())
            }
            Err(_) => {
                self.degrade(state, Stage::Synthesize);
                self.synthesizer
                    .extractive_fallback(&state.candidates, state.validation.as_ref())
            }
        }
    }

    async fn load_history(&self, session_id: Option<&str>) -> Vec<ConversationMessage> {
        let (Some(memory), Some(session_id)) = (self.memory.as_ref(), session_id) else {
            return Vec::new();
        };
        match memory.window(session_id, self.window_tokens).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Failed to load conversation history");
                Vec::new()
            }
        }
    }

    async fn remember(&self, session_id: &str, query: &str, answer: &str) {
        let Some(memory) = self.memory.as_ref() else {
            return;
        };
        for message in [ConversationMessage::user(query), ConversationMessage::assistant(answer)] {
            if let Err(e) = memory.append(session_id, message).await {
                tracing::warn!(session_id, error = %e, "Failed to store conversation message");
                return;
            }
        }
    }
}
