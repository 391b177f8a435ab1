//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which text-generation backend the service talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmBackend {
    /// A locally hosted Ollama endpoint.
    Ollama,
    /// The hosted Hugging Face inference endpoint.
    HuggingFace,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,

    // Document store
    pub mongodb_uri: String,
    pub mongodb_db_name: String,

    // Vector store
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub embedding_dimension: u64,

    // Generation and embedding backends
    pub llm_backend: LlmBackend,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub embedding_model: String,
    pub huggingface_api_key: Option<String>,
    pub huggingface_model: String,

    // Auth
    pub jwt_secret: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Store Settings ---
        let mongodb_uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let mongodb_db_name =
            std::env::var("MONGODB_DB_NAME").unwrap_or_else(|_| "autofix_ai".to_string());

        let qdrant_url =
            std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string());
        let qdrant_api_key = std::env::var("QDRANT_API_KEY").ok();

        let embedding_dimension_str =
            std::env::var("EMBEDDING_DIMENSION").unwrap_or_else(|_| "768".to_string());
        let embedding_dimension = embedding_dimension_str.parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string(), e.to_string())
        })?;

        // --- Load LLM Settings ---
        let llm_backend_str = std::env::var("LLM_BACKEND").unwrap_or_else(|_| "ollama".to_string());
        let llm_backend = match llm_backend_str.to_lowercase().as_str() {
            "ollama" => LlmBackend::Ollama,
            "huggingface" => LlmBackend::HuggingFace,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LLM_BACKEND".to_string(),
                    format!("'{}' is not one of: ollama, huggingface", other),
                ))
            }
        };

        let ollama_base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let ollama_model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string());
        let embedding_model =
            std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "nomic-embed-text".to_string());

        let huggingface_api_key = std::env::var("HUGGINGFACE_API_KEY").ok();
        let huggingface_model = std::env::var("HUGGINGFACE_MODEL")
            .unwrap_or_else(|_| "meta-llama/Llama-2-7b-chat-hf".to_string());

        // --- Load Auth Settings ---
        let jwt_secret = std::env::var("JWT_SECRET_KEY")
            .map_err(|_| ConfigError::MissingVar("JWT_SECRET_KEY".to_string()))?;

        Ok(Self {
            bind_address,
            log_level,
            mongodb_uri,
            mongodb_db_name,
            qdrant_url,
            qdrant_api_key,
            embedding_dimension,
            llm_backend,
            ollama_base_url,
            ollama_model,
            embedding_model,
            huggingface_api_key,
            huggingface_model,
            jwt_secret,
        })
    }
}
