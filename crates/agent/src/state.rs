//! Per-request pipeline state
//!
//! One `PipelineState` is created per request and owned by that request's
//! orchestrator run. Stages mutate it in place; nothing in it is shared.

use std::fmt;

use serde::{Deserialize, Serialize};

use multi_rag_core::{
    AnalysisResult, Candidate, ConversationMessage, RetrievalStrategy, StageError, StageErrorKind,
};

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Analyze,
    Route,
    Retrieve,
    Grade,
    Rewrite,
    Validate,
    Synthesize,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Analyze => "analyze",
            Stage::Route => "route",
            Stage::Retrieve => "retrieve",
            Stage::Grade => "grade",
            Stage::Rewrite => "rewrite",
            Stage::Validate => "validate",
            Stage::Synthesize => "synthesize",
            Stage::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pass/fail verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Pass,
    Fail,
}

/// Grader output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub grade: Grade,
    pub score: f32,
    pub reason: String,
    pub needs_rewrite: bool,
}

impl GradingResult {
    pub fn passed(&self) -> bool {
        self.grade == Grade::Pass
    }
}

/// Validator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub relevance: f32,
    pub consistency: f32,
    pub coverage: f32,
    pub confidence: f32,
    pub issues: Vec<String>,
    pub hallucination_risk: bool,
    pub passed: bool,
}

/// Router output
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected strategies in priority order
    pub strategies: Vec<RetrievalStrategy>,
    pub reasons: Vec<String>,
}

impl RoutingDecision {
    pub(crate) fn add(&mut self, strategy: RetrievalStrategy, reason: Option<&str>) {
        if !self.strategies.contains(&strategy) {
            self.strategies.push(strategy);
        }
        if let Some(reason) = reason {
            self.reasons.push(reason.to_string());
        }
    }

    pub fn primary(&self) -> Option<RetrievalStrategy> {
        self.strategies.first().copied()
    }
}

/// Mutable state threaded through the orchestrator
#[derive(Debug, Clone)]
pub struct PipelineState {
    query: String,
    pub original_query: String,
    pub session_id: Option<String>,
    pub history: Vec<ConversationMessage>,
    pub analysis: Option<AnalysisResult>,
    pub routing: Option<RoutingDecision>,
    /// Strategies that actually ran, across all retrieval passes
    pub strategies_used: Vec<RetrievalStrategy>,
    pub candidates: Vec<Candidate>,
    pub rewrite_count: u32,
    pub grading: Option<GradingResult>,
    pub validation: Option<ValidationResult>,
    pub trace: Vec<Stage>,
    pub errors: Vec<StageError>,
    /// Deadline forced an early answer
    pub degraded: bool,
}

impl PipelineState {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            original_query: query.clone(),
            query,
            session_id: None,
            history: Vec::new(),
            analysis: None,
            routing: None,
            strategies_used: Vec::new(),
            candidates: Vec::new(),
            rewrite_count: 0,
            grading: None,
            validation: None,
            trace: Vec::new(),
            errors: Vec::new(),
            degraded: false,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.history = history;
        self
    }

    /// Current (possibly rewritten) query
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Replace the current query; only the rewrite stage calls this
    pub(crate) fn replace_query(&mut self, query: String) {
        self.query = query;
    }

    pub fn enter(&mut self, stage: Stage) {
        self.trace.push(stage);
    }

    pub fn record_error(&mut self, stage: Stage, kind: StageErrorKind, message: impl Into<String>) {
        self.errors.push(StageError::new(stage.as_str(), kind, message));
    }

    pub fn mark_used(&mut self, strategy: RetrievalStrategy) {
        if !self.strategies_used.contains(&strategy) {
            self.strategies_used.push(strategy);
        }
    }

    pub fn trace_names(&self) -> Vec<String> {
        self.trace.iter().map(|s| s.as_str().to_string()).collect()
    }

    pub fn is_greeting(&self) -> bool {
        self.analysis.as_ref().is_some_and(|a| a.is_greeting())
    }
}
