//! LLM Backend implementations
//!
//! Ollama-compatible chat and embedding endpoints.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use multi_rag_core::{
    Embedder, GenerateRequest, GenerateResponse, Message, TextGenerator, TokenUsage,
};

use crate::LlmError;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// Embedding model name/ID
    pub embedding_model: String,
    /// API endpoint
    pub endpoint: String,
    /// API key (optional, sent as bearer token)
    pub api_key: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Default temperature when a request does not set one
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5:7b-instruct-q4_K_M".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl From<&multi_rag_config::LlmConfig> for LlmConfig {
    fn from(config: &multi_rag_config::LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.api_url(path));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Execute a single POST and decode the body (used by retry logic)
    async fn execute<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self.post(path).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::from(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            // 5xx errors are retryable, 4xx are not
            if status.is_server_error() {
                return Err(LlmError::Network(format!("Server error {}: {}", status, error)));
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(LlmError::ModelNotFound(error));
            }
            return Err(LlmError::Api(error));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    /// Run `execute` with exponential backoff on transient failures
    async fn execute_with_retry<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    "LLM request failed, retrying in {:?} (attempt {}/{})",
                    backoff, attempt, self.config.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute(path, body).await {
                Ok(result) => return Ok(result),
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    /// Check if an error is retryable
    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    fn chat_request(&self, request: &GenerateRequest) -> OllamaChatRequest {
        OllamaChatRequest {
            model: request.model.clone().unwrap_or_else(|| self.config.model.clone()),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            format: request.json_mode.then(|| "json".to_string()),
            options: Some(OllamaOptions {
                temperature: Some(request.temperature.unwrap_or(self.config.temperature)),
                num_predict: Some(
                    request.max_tokens.map(|t| t as i32).unwrap_or(self.config.max_tokens as i32),
                ),
            }),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaBackend {
    async fn generate(&self, request: GenerateRequest) -> multi_rag_core::Result<GenerateResponse> {
        let start = std::time::Instant::now();
        let body = self.chat_request(&request);

        let result: OllamaChatResponse = self.execute_with_retry("/chat", &body).await?;

        let usage = match (result.prompt_eval_count, result.eval_count) {
            (Some(p), Some(c)) => Some(TokenUsage::new(p as u32, c as u32)),
            _ => None,
        };

        tracing::debug!(
            model = %body.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "LLM generation complete"
        );

        Ok(GenerateResponse {
            text: result.message.content,
            usage,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Embedder for OllamaBackend {
    async fn embed(&self, text: &str) -> multi_rag_core::Result<Vec<f32>> {
        let body = OllamaEmbeddingRequest {
            model: self.config.embedding_model.clone(),
            prompt: text.to_string(),
        };
        let result: OllamaEmbeddingResponse = self
            .execute_with_retry("/embeddings", &body)
            .await
            .map_err(|e| multi_rag_core::Error::Embedding(e.to_string()))?;

        if result.embedding.is_empty() {
            return Err(multi_rag_core::Error::Embedding(
                "provider returned an empty embedding".to_string(),
            ));
        }
        Ok(result.embedding)
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = multi_rag_config::LlmConfig {
            endpoint: "http://llm:11434/".to_string(),
            timeout_secs: 5,
            ..Default::default()
        };
        let config = LlmConfig::from(&settings);
        assert_eq!(config.endpoint, "http://llm:11434");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_message_conversion() {
        let msg = Message::user("Hello");
        let ollama_msg: OllamaMessage = (&msg).into();
        assert_eq!(ollama_msg.role, "user");
        assert_eq!(ollama_msg.content, "Hello");
    }

    #[test]
    fn test_chat_request_json_mode() {
        let backend = OllamaBackend::new(LlmConfig::default()).unwrap();
        let request = GenerateRequest::new("sys")
            .with_user_message("q")
            .with_temperature(0.0)
            .with_json_mode();
        let body = backend.chat_request(&request);

        assert_eq!(body.format.as_deref(), Some("json"));
        assert_eq!(body.messages.len(), 2);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["options"]["temperature"], 0.0);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_is_retryable() {
        assert!(OllamaBackend::is_retryable(&LlmError::Timeout));
        assert!(OllamaBackend::is_retryable(&LlmError::Network("reset".into())));
        assert!(!OllamaBackend::is_retryable(&LlmError::Api("bad request".into())));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        let backend = OllamaBackend::new(LlmConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            max_retries: 0,
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();

        let result = backend.generate(GenerateRequest::new("s").with_user_message("q")).await;
        assert!(matches!(result, Err(multi_rag_core::Error::Llm(_))));
        assert!(!backend.is_available().await);
    }
}
