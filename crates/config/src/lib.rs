//! Configuration management for the multi-source retrieval engine
//!
//! Supports loading configuration from:
//! - YAML/TOML/JSON files (`config/default`, `config/{env}`)
//! - Environment variables (MULTI_RAG_ prefix, `__` separator)
//! - Runtime overrides
//!
//! Every field has a serde default, so an empty file (or no file at all)
//! yields a complete, validated [`Settings`].

pub mod settings;
pub mod agent;
pub mod retrieval;

pub use settings::{
    Settings, ServerConfig, ObservabilityConfig, LogFormat, load_settings, load_settings_from,
};
pub use agent::{OrchestratorConfig, LlmConfig, MemoryConfig};
pub use retrieval::{RetrievalConfig, RerankerConfig, GraphConfig, WebConfig, ChunkerConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingField(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}

impl From<ConfigError> for multi_rag_core::Error {
    fn from(err: ConfigError) -> Self {
        multi_rag_core::Error::Config(err.to_string())
    }
}
