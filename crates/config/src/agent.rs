//! Orchestration, generation and memory configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum rewrite attempts before proceeding with best-available results
    #[serde(default = "default_max_rewrites")]
    pub max_rewrites: u32,

    /// Grade score required to skip rewriting
    #[serde(default = "default_grade_threshold")]
    pub grade_threshold: f32,

    /// Total time budget for one request (milliseconds)
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,

    /// Number of top candidates shown to the grader
    #[serde(default = "default_digest_size")]
    pub grading_digest_size: usize,

    /// Characters per candidate in the grading digest
    #[serde(default = "default_digest_chars")]
    pub digest_chars: usize,

    /// Number of candidates cited in the answer
    #[serde(default = "default_answer_sources")]
    pub answer_sources: usize,

    /// Characters per source preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Confidence at or above which validation passes
    #[serde(default = "default_validation_pass")]
    pub validation_pass_threshold: f32,
}

fn default_max_rewrites() -> u32 {
    2
}
fn default_grade_threshold() -> f32 {
    0.7
}
fn default_request_deadline_ms() -> u64 {
    30_000
}
fn default_digest_size() -> usize {
    5
}
fn default_digest_chars() -> usize {
    200
}
fn default_answer_sources() -> usize {
    5
}
fn default_preview_chars() -> usize {
    100
}
fn default_validation_pass() -> f32 {
    0.6
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rewrites: default_max_rewrites(),
            grade_threshold: default_grade_threshold(),
            request_deadline_ms: default_request_deadline_ms(),
            grading_digest_size: default_digest_size(),
            digest_chars: default_digest_chars(),
            answer_sources: default_answer_sources(),
            preview_chars: default_preview_chars(),
            validation_pass_threshold: default_validation_pass(),
        }
    }
}

impl OrchestratorConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/ID
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Embedding model name/ID
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// API endpoint (Ollama-compatible)
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key (for hosted gateways)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature for answer synthesis
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Temperature for analysis, grading and validation calls
    #[serde(default)]
    pub judge_temperature: f32,

    /// Request timeout (seconds)
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff (milliseconds, doubles each retry)
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_llm_model() -> String {
    "qwen2.5:7b-instruct-q4_K_M".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_max_tokens() -> usize {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    100
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            embedding_model: default_embedding_model(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            judge_temperature: 0.0,
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Messages retained per session
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Session time-to-live (seconds), refreshed on every append
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Token budget for the history window fed to synthesis
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
}

fn default_buffer_size() -> usize {
    10
}
fn default_ttl_secs() -> u64 {
    86_400 // 24 hours
}
fn default_window_tokens() -> usize {
    4000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            ttl_secs: default_ttl_secs(),
            window_tokens: default_window_tokens(),
        }
    }
}
