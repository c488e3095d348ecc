//! Conversation store trait

use async_trait::async_trait;

use crate::{ConversationMessage, Result};

/// Per-session, append-only conversation log with bounded retention
///
/// Single writer per session is assumed.
#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    /// Append a message to a session's history
    async fn append(&self, session_id: &str, message: ConversationMessage) -> Result<()>;

    /// Most recent messages fitting in `max_tokens`, oldest first
    async fn window(&self, session_id: &str, max_tokens: usize) -> Result<Vec<ConversationMessage>>;

    /// Drop a session's history
    async fn clear(&self, session_id: &str) -> Result<()>;
}
