//! Conversation history types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// A single message in a session's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Role of the speaker
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
    /// When the message was recorded
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Optional metadata (sources, confidence, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ConversationMessage {
    /// Create a new message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Estimate token count (roughly 4 characters per token)
    pub fn estimated_tokens(&self) -> usize {
        self.content.chars().count() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user = ConversationMessage::user("What is RRF?");
        let asst = ConversationMessage::assistant("Reciprocal rank fusion.")
            .with_metadata(serde_json::json!({ "confidence": 0.8 }));

        assert_eq!(user.role, MessageRole::User);
        assert_eq!(asst.role, MessageRole::Assistant);
        assert!(asst.metadata.is_some());
    }

    #[test]
    fn test_estimated_tokens() {
        let msg = ConversationMessage::user("a".repeat(40));
        assert_eq!(msg.estimated_tokens(), 10);
    }

    #[test]
    fn test_deserialize_without_timestamp() {
        let msg: ConversationMessage =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "hi");
    }
}
