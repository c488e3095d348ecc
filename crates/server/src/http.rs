//! HTTP Endpoints
//!
//! REST API for querying, ingestion and session history.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use multi_rag_agent::IngestReport;
use multi_rag_core::{ConversationStore, QueryRequest, QueryResponse};
use multi_rag_rag::{GraphEdge, GraphNode};

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::WebSocketHandler;
use crate::ServerError;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_origins, state.config.server.cors_enabled);
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/documents", post(ingest_document))
        .route("/api/graph", post(load_graph))
        .route("/api/sessions/:id/history", get(session_history))
        .route("/api/sessions/:id", delete(clear_session))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/ws/chat", get(WebSocketHandler::handle))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns a permissive layer (for dev)
/// - If no configured origin parses, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        return layer.allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    layer.allow_origin(parsed_origins)
}

/// Answer a query
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ServerError> {
    if request.query.trim().is_empty() {
        return Err(ServerError::InvalidRequest("query must not be empty".to_string()));
    }
    let response = state.orchestrator.process(request, None).await;
    Ok(Json(response))
}

/// Document ingestion request
#[derive(Debug, Deserialize)]
struct IngestRequest {
    #[serde(default)]
    doc_id: Option<String>,
    text: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

/// Chunk and index a document
async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestReport>), ServerError> {
    let doc_id = request
        .doc_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let report = state
        .ingestor
        .ingest(&doc_id, &request.text, &request.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// Knowledge graph load request
#[derive(Debug, Deserialize)]
struct GraphRequest {
    #[serde(default)]
    nodes: Vec<GraphNode>,
    #[serde(default)]
    edges: Vec<GraphEdge>,
}

/// Add nodes and edges to the knowledge graph
async fn load_graph(
    State(state): State<AppState>,
    Json(request): Json<GraphRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    for node in request.nodes {
        state.graph.add_node(node);
    }
    for edge in request.edges {
        state.graph.add_edge(&edge.source, &edge.target, edge.rel_type)?;
    }
    Ok(Json(serde_json::json!({
        "nodes": state.graph.node_count(),
        "edges": state.graph.edge_count(),
    })))
}

/// Conversation window for a session
async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let messages = state
        .memory
        .window(&id, state.config.memory.window_tokens)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!({
        "session_id": id,
        "messages": messages,
    })))
}

/// Drop a session's history
async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state
        .memory
        .clear(&id)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "strategies": state.retriever.available(),
        "documents": state.ingestor.document_count(),
        "graph_nodes": state.graph.node_count(),
        "sessions": state.memory.session_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use multi_rag_config::Settings;
    use multi_rag_core::{Embedder, Error, GenerateRequest, GenerateResponse, TextGenerator};

    /// Generator that is always down, so every stage takes its fallback
    struct Offline;

    #[async_trait]
    impl TextGenerator for Offline {
        async fn generate(&self, _request: GenerateRequest) -> multi_rag_core::Result<GenerateResponse> {
            Err(Error::Llm("offline".to_string()))
        }

        fn model_name(&self) -> &str {
            "offline"
        }
    }

    /// Letter-frequency embedder
    struct Letters;

    #[async_trait]
    impl Embedder for Letters {
        async fn embed(&self, text: &str) -> multi_rag_core::Result<Vec<f32>> {
            let mut v = vec![0.0; 26];
            for c in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                v[(c - b'a') as usize] += 1.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> Option<usize> {
            Some(26)
        }
    }

    fn app() -> Router {
        let state = AppState::with_capabilities(Settings::default(), Arc::new(Offline), Arc::new(Letters), None);
        create_router(state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let response = app()
            .oneshot(post_json("/api/chat", serde_json::json!({ "query": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_then_chat() {
        let app = app();
        let text = "Reciprocal rank fusion merges ranked lists from several retrievers. \
            Each list contributes a weighted reciprocal of the rank plus a constant.";

        let response = app
            .clone()
            .oneshot(post_json("/api/documents", serde_json::json!({ "doc_id": "rrf", "text": text })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["doc_id"], "rrf");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({ "query": "how does reciprocal rank fusion merge lists", "session_id": "s1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert!(!body["answer"].as_str().unwrap().is_empty());
        assert_eq!(body["metadata"]["agent_trace"][0], "start");
        assert!(body["metadata"]["errors"].is_array());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/sessions/s1/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json(response).await["messages"].as_array().unwrap().len(), 2);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/sessions/s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_graph_edge_to_unknown_node() {
        let response = app()
            .oneshot(post_json(
                "/api/graph",
                serde_json::json!({
                    "nodes": [{ "id": "a", "name": "Retriever", "label": "Class" }],
                    "edges": [{ "source": "a", "target": "missing", "rel_type": "CALLS" }]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
