//! Multi-source retrieval server
//!
//! HTTP and WebSocket endpoints over the retrieval orchestrator.

pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
pub use websocket::{ClientMessage, WebSocketHandler};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<multi_rag_agent::AgentError> for ServerError {
    fn from(err: multi_rag_agent::AgentError) -> Self {
        match err {
            multi_rag_agent::AgentError::InvalidInput(msg) => ServerError::InvalidRequest(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<multi_rag_rag::RagError> for ServerError {
    fn from(err: multi_rag_rag::RagError) -> Self {
        match err {
            multi_rag_rag::RagError::NotFound(msg) => ServerError::NotFound(msg),
            other => ServerError::InvalidRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
