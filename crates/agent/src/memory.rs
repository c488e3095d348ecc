//! Conversation memory
//!
//! Per-session message log with a sliding size bound and a TTL refreshed on
//! every append. Expired sessions read as empty and are evicted on access.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use multi_rag_config::MemoryConfig;
use multi_rag_core::{ConversationMessage, ConversationStore};

struct SessionLog {
    messages: Vec<ConversationMessage>,
    expires_at: Instant,
}

/// In-memory [`ConversationStore`]
pub struct InMemoryConversationStore {
    sessions: DashMap<String, SessionLog>,
    buffer_size: usize,
    ttl: Duration,
}

impl InMemoryConversationStore {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            buffer_size: config.buffer_size.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Full retained history, oldest first
    pub fn history(&self, session_id: &str) -> Vec<ConversationMessage> {
        self.evict_if_expired(session_id);
        self.sessions
            .get(session_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Live session count
    pub fn session_count(&self) -> usize {
        let now = Instant::now();
        self.sessions.retain(|_, log| log.expires_at > now);
        self.sessions.len()
    }

    fn evict_if_expired(&self, session_id: &str) {
        let now = Instant::now();
        if self
            .sessions
            .remove_if(session_id, |_, log| log.expires_at <= now)
            .is_some()
        {
            tracing::debug!(session_id, "Evicted expired conversation");
        }
    }
}

/// Most recent messages whose estimated tokens fit in `max_tokens`, oldest first
pub fn token_window(messages: &[ConversationMessage], max_tokens: usize) -> Vec<ConversationMessage> {
    let mut used = 0usize;
    let mut window: Vec<ConversationMessage> = Vec::new();
    for message in messages.iter().rev() {
        let tokens = message.estimated_tokens();
        if used + tokens > max_tokens {
            break;
        }
        used += tokens;
        window.push(message.clone());
    }
    window.reverse();
    window
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, session_id: &str, message: ConversationMessage) -> multi_rag_core::Result<()> {
        self.evict_if_expired(session_id);

        let expires_at = Instant::now() + self.ttl;
        let mut log = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionLog {
                messages: Vec::new(),
                expires_at,
            });
        log.messages.push(message);
        if log.messages.len() > self.buffer_size {
            let excess = log.messages.len() - self.buffer_size;
            log.messages.drain(..excess);
        }
        log.expires_at = expires_at;
        Ok(())
    }

    async fn window(&self, session_id: &str, max_tokens: usize) -> multi_rag_core::Result<Vec<ConversationMessage>> {
        Ok(token_window(&self.history(session_id), max_tokens))
    }

    async fn clear(&self, session_id: &str) -> multi_rag_core::Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(buffer_size: usize) -> InMemoryConversationStore {
        InMemoryConversationStore::new(&MemoryConfig {
            buffer_size,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_append_trims_to_buffer() {
        let store = store(3);
        for i in 0..5 {
            store.append("s", ConversationMessage::user(format!("m{}", i))).await.unwrap();
        }
        let history = store.history("s");
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_window_respects_token_budget() {
        let store = store(10);
        store.append("s", ConversationMessage::user("a".repeat(40))).await.unwrap();
        store.append("s", ConversationMessage::assistant("b".repeat(40))).await.unwrap();
        store.append("s", ConversationMessage::user("c".repeat(40))).await.unwrap();

        // 10 tokens each; budget fits the two most recent
        let window = store.window("s", 25).await.unwrap();
        assert_eq!(window.len(), 2);
        assert!(window[0].content.starts_with('b'));
        assert!(window[1].content.starts_with('c'));

        assert!(store.window("missing", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_reads_empty() {
        let store = store(10).with_ttl(Duration::ZERO);
        store.append("s", ConversationMessage::user("hello")).await.unwrap();
        assert!(store.history("s").is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = store(10);
        store.append("s", ConversationMessage::user("hello")).await.unwrap();
        store.clear("s").await.unwrap();
        assert!(store.history("s").is_empty());
    }
}
