//! Request/response shapes exchanged with the transport layer

use serde::{Deserialize, Serialize};

use crate::{AnalysisResult, ConversationMessage, RetrievalStrategy};

/// Incoming query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// History supplied by the caller; takes precedence over stored history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<ConversationMessage>>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
            conversation_history: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.conversation_history = Some(history);
        self
    }
}

/// Cited source in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub score: f32,
    pub preview: String,
}

/// Failure category recorded when a stage recovers from an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// A retrieval strategy failed or timed out
    SourceUnavailable,
    /// Text generation failed or returned unparsable output
    GenerationFailure,
    /// The request deadline expired
    Timeout,
    /// Retrieval produced no candidates
    NoResults,
}

/// A recovered, stage-local failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: String,
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(stage: impl Into<String>, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub confidence: f32,
    pub strategies_used: Vec<RetrievalStrategy>,
    pub rewrites: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_analysis: Option<AnalysisResult>,
    pub agent_trace: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StageError>,
    /// Set when the request deadline forced an early answer
    #[serde(default)]
    pub degraded: bool,
}

/// Final answer with citations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub metadata: ResponseMetadata,
}
