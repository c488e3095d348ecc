//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    ChunkerConfig, ConfigError, GraphConfig, LlmConfig, MemoryConfig, OrchestratorConfig,
    RerankerConfig, RetrievalConfig, WebConfig,
};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Orchestrator configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reranker configuration
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Knowledge graph configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Web search configuration
    #[serde(default)]
    pub web: WebConfig,

    /// Chunker configuration
    #[serde(default)]
    pub chunker: ChunkerConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Validate all sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_retrieval()?;
        self.validate_reranker()?;
        self.validate_orchestrator()?;
        self.validate_chunker()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Port cannot be 0"));
        }
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let retrieval = &self.retrieval;

        for (field, value) in [
            ("retrieval.vector_weight", retrieval.vector_weight),
            ("retrieval.sparse_weight", retrieval.sparse_weight),
            ("retrieval.min_similarity", retrieval.min_similarity),
        ] {
            check_unit(field, value)?;
        }

        if retrieval.rrf_k <= 0.0 {
            return Err(ConfigError::invalid(
                "retrieval.rrf_k",
                format!("Must be positive, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.candidate_cap == 0 || retrieval.rerank_top_k == 0 {
            return Err(ConfigError::invalid(
                "retrieval.candidate_cap",
                "candidate_cap and rerank_top_k must be at least 1",
            ));
        }

        Ok(())
    }

    fn validate_reranker(&self) -> Result<(), ConfigError> {
        check_unit("reranker.ce_weight", self.reranker.ce_weight)?;
        check_unit("reranker.retrieval_weight", self.reranker.retrieval_weight)?;
        if self.reranker.score_scale <= 0.0 {
            return Err(ConfigError::invalid(
                "reranker.score_scale",
                format!("Must be positive, got {}", self.reranker.score_scale),
            ));
        }
        Ok(())
    }

    fn validate_orchestrator(&self) -> Result<(), ConfigError> {
        check_unit("orchestrator.grade_threshold", self.orchestrator.grade_threshold)?;
        check_unit(
            "orchestrator.validation_pass_threshold",
            self.orchestrator.validation_pass_threshold,
        )?;
        if self.orchestrator.request_deadline_ms == 0 {
            return Err(ConfigError::invalid(
                "orchestrator.request_deadline_ms",
                "Deadline cannot be 0",
            ));
        }
        Ok(())
    }

    fn validate_chunker(&self) -> Result<(), ConfigError> {
        let chunker = &self.chunker;

        if chunker.min_chunk_size > chunker.max_chunk_size {
            return Err(ConfigError::invalid(
                "chunker.min_chunk_size",
                format!(
                    "min_chunk_size ({}) exceeds max_chunk_size ({})",
                    chunker.min_chunk_size, chunker.max_chunk_size
                ),
            ));
        }

        if !(chunker.breakpoint_percentile > 0.0 && chunker.breakpoint_percentile <= 100.0) {
            return Err(ConfigError::invalid(
                "chunker.breakpoint_percentile",
                format!("Must be in (0, 100], got {}", chunker.breakpoint_percentile),
            ));
        }

        if chunker.embed_batch_size == 0 {
            return Err(ConfigError::invalid(
                "chunker.embed_batch_size",
                "Batch size cannot be 0",
            ));
        }

        Ok(())
    }
}

fn check_unit(field: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("Must be between 0.0 and 1.0, got {}", value),
        ));
    }
    Ok(())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins (empty falls back to localhost)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            cors_enabled: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/default`, `config/{env}` and `MULTI_RAG__*` variables
///
/// Priority: env vars > config/{env} > config/default > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings with an explicit config directory
pub fn load_settings_from(config_dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = config_dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = config_dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("MULTI_RAG")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        config_dir = %config_dir.display(),
        env = env.unwrap_or("default"),
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.retrieval.rerank_top_k, 5);
        assert_eq!(settings.observability.log_format, LogFormat::Json);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_weight_validation() {
        let mut settings = Settings::default();

        settings.retrieval.vector_weight = 1.5;
        assert!(settings.validate().is_err());

        settings.retrieval.vector_weight = 0.7;
        settings.reranker.ce_weight = -0.1;
        assert!(settings.validate().is_err());

        settings.reranker.ce_weight = 0.7;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rrf_k_validation() {
        let mut settings = Settings::default();
        settings.retrieval.rrf_k = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_chunker_validation() {
        let mut settings = Settings::default();
        settings.chunker.min_chunk_size = 2000;
        assert!(settings.validate().is_err());

        settings.chunker.min_chunk_size = 100;
        settings.chunker.breakpoint_percentile = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(dir.path(), None).unwrap();
        assert_eq!(settings.orchestrator.max_rewrites, 2);
    }

    #[test]
    fn test_load_from_files_with_env_overlay() {
        let dir = tempfile::tempdir().unwrap();

        let mut default = std::fs::File::create(dir.path().join("default.json")).unwrap();
        write!(
            default,
            r#"{{"server": {{"port": 9000}}, "graph": {{"max_hop_depth": 2}}}}"#
        )
        .unwrap();

        let mut staging = std::fs::File::create(dir.path().join("staging.json")).unwrap();
        write!(staging, r#"{{"server": {{"port": 9100}}}}"#).unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.graph.max_hop_depth, 2);
        assert_eq!(settings.retrieval.candidate_cap, 15);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut default = std::fs::File::create(dir.path().join("default.json")).unwrap();
        write!(default, r#"{{"reranker": {{"ce_weight": 3.0}}}}"#).unwrap();

        assert!(load_settings_from(dir.path(), None).is_err());
    }
}
