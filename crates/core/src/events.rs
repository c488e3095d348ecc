//! Streaming progress events
//!
//! Per request the transport observes exactly one `connection.established`,
//! any number of `agent.thinking` / `retrieval.progress`, then exactly one
//! terminal `message.complete` or `error`.

use serde::{Deserialize, Serialize};

use crate::{QueryResponse, RetrievalStrategy};

/// Progress event emitted while a query is processed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    #[serde(rename = "connection.established")]
    ConnectionEstablished { session_id: String },

    #[serde(rename = "agent.thinking")]
    AgentThinking { stage: String, message: String },

    #[serde(rename = "retrieval.progress")]
    RetrievalProgress {
        strategy: RetrievalStrategy,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },

    #[serde(rename = "message.complete")]
    MessageComplete { response: QueryResponse },

    #[serde(rename = "error")]
    Error { message: String },
}

impl PipelineEvent {
    pub fn thinking(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentThinking {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Whether this event ends the stream for a request
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageComplete { .. } | Self::Error { .. })
    }

    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection.established",
            Self::AgentThinking { .. } => "agent.thinking",
            Self::RetrievalProgress { .. } => "retrieval.progress",
            Self::MessageComplete { .. } => "message.complete",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_names() {
        let event = PipelineEvent::thinking("analyze", "Analyzing query");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent.thinking");
        assert_eq!(json["stage"], "analyze");

        let event = PipelineEvent::RetrievalProgress {
            strategy: RetrievalStrategy::Graph,
            status: "completed".to_string(),
            count: Some(4),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "retrieval.progress");
        assert_eq!(json["strategy"], "graph");
    }

    #[test]
    fn test_terminal_events() {
        assert!(PipelineEvent::Error { message: "boom".into() }.is_terminal());
        assert!(!PipelineEvent::ConnectionEstablished { session_id: "s".into() }.is_terminal());
        assert!(!PipelineEvent::thinking("grade", "").is_terminal());
    }
}
