//! WebSocket Handler
//!
//! Streams pipeline progress for each query. A connection first receives
//! `connection.established`; every query then produces any number of
//! `agent.thinking` / `retrieval.progress` events followed by exactly one
//! `message.complete` or `error`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use multi_rag_core::{PipelineEvent, QueryRequest};

use crate::state::AppState;

/// Messages accepted from the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Message {
        query: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    Ping,
}

/// Destination for pipeline events
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one event; false once the client is gone
    async fn send_event(&mut self, event: &PipelineEvent) -> bool;
}

#[async_trait]
impl EventSink for WebSocket {
    async fn send_event(&mut self, event: &PipelineEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event = event.event_type(), error = %e, "Failed to serialize event");
                return true;
            }
        };
        self.send(Message::Text(payload)).await.is_ok()
    }
}

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
        ws.on_upgrade(move |socket| Self::handle_socket(socket, state))
    }

    async fn handle_socket(mut socket: WebSocket, state: AppState) {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %session_id, "WebSocket connected");

        let established = PipelineEvent::ConnectionEstablished {
            session_id: session_id.clone(),
        };
        if !socket.send_event(&established).await {
            return;
        }

        while let Some(message) = socket.recv().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive failed");
                    break;
                }
            };

            let delivered = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping) => {
                    socket
                        .send(Message::Text(r#"{"type":"pong"}"#.to_string()))
                        .await
                        .is_ok()
                }
                Ok(ClientMessage::Message { query, session_id: requested }) => {
                    let session = requested.unwrap_or_else(|| session_id.clone());
                    Self::answer(&mut socket, &state, query, session).await
                }
                Err(e) => {
                    let error = PipelineEvent::Error {
                        message: format!("Invalid message: {}", e),
                    };
                    socket.send_event(&error).await
                }
            };
            if !delivered {
                break;
            }
        }

        tracing::info!(session_id = %session_id, "WebSocket disconnected");
    }

    /// Run one query, forwarding progress; false once the client is gone
    async fn answer<S: EventSink>(sink: &mut S, state: &AppState, query: String, session_id: String) -> bool {
        if query.trim().is_empty() {
            let error = PipelineEvent::Error {
                message: "query must not be empty".to_string(),
            };
            return sink.send_event(&error).await;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = state.orchestrator.clone();
        let request = QueryRequest::new(query).with_session(session_id.clone());
        let task = tokio::spawn(async move { orchestrator.process(request, Some(&tx)).await });

        // Channel closes when the run finishes and drops its sender
        while let Some(event) = rx.recv().await {
            if !sink.send_event(&event).await {
                tracing::debug!(session_id = %session_id, "Client gone, cancelling query");
                task.abort();
                return false;
            }
        }

        let terminal = match task.await {
            Ok(response) => PipelineEvent::MessageComplete { response },
            Err(e) => {
                tracing::error!(error = %e, "Query task failed");
                PipelineEvent::Error {
                    message: "internal error while processing query".to_string(),
                }
            }
        };
        sink.send_event(&terminal).await
    }
}
