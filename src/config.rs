use config::{ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::retrieval::chunking::DEFAULT_CHUNK_SIZE;
use crate::retrieval::completion::DEFAULT_COMPLETION_MODEL;
use crate::retrieval::embeddings::DEFAULT_EMBEDDING_MODEL;
use crate::retrieval::store::RetentionConfig;
use crate::utils::retry::RetryPolicy;

/// Application configuration, read from environment variables (and `.env`).
///
/// Every key is the upper-cased field name, e.g. `CHUNK_SIZE` or `QA_INDEX_TTL_SECS`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub secret_key: String,
    pub cors_allow_origin: String,

    // Embeddings
    pub rag_embedding_engine: String,
    pub rag_embedding_model: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base_url: Option<String>,
    pub openai_max_concurrent: usize,

    // Deep Q&A
    pub deepqa_completion_model: String,
    pub chunk_size: usize,
    pub top_k: usize,
    pub deepqa_max_tokens: u32,
    pub deepqa_temperature: f32,

    // External calls
    pub embedding_timeout_secs: u64,
    pub completion_timeout_secs: u64,
    pub external_max_attempts: u32,
    pub external_retry_delay_ms: u64,

    // Prepared index retention
    pub qa_index_max_entries: usize,
    pub qa_index_ttl_secs: Option<u64>,
    pub qa_index_cleanup_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: "sqlite://insightiq.db".to_string(),
            database_max_connections: 10,
            secret_key: String::new(),
            cors_allow_origin: "*".to_string(),
            rag_embedding_engine: "local".to_string(),
            rag_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            openai_api_key: None,
            openai_api_base_url: None,
            openai_max_concurrent: 10,
            deepqa_completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            top_k: 5,
            deepqa_max_tokens: 512,
            deepqa_temperature: 0.2,
            embedding_timeout_secs: 60,
            completion_timeout_secs: 60,
            external_max_attempts: 3,
            external_retry_delay_ms: 500,
            qa_index_max_entries: 256,
            qa_index_ttl_secs: None,
            qa_index_cleanup_interval_secs: 300,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment(Environment::default().try_parsing(true))
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::Message("SECRET_KEY must be set".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Message("CHUNK_SIZE must be positive".to_string()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Message("TOP_K must be positive".to_string()));
        }
        if self.external_max_attempts == 0 {
            return Err(ConfigError::Message(
                "EXTERNAL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn embedding_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.external_max_attempts,
            base_delay: Duration::from_millis(self.external_retry_delay_ms),
            attempt_timeout: Duration::from_secs(self.embedding_timeout_secs),
        }
    }

    pub fn completion_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.external_max_attempts,
            base_delay: Duration::from_millis(self.external_retry_delay_ms),
            attempt_timeout: Duration::from_secs(self.completion_timeout_secs),
        }
    }

    pub fn retention(&self) -> RetentionConfig {
        RetentionConfig {
            max_entries: self.qa_index_max_entries,
            ttl: self.qa_index_ttl_secs.map(Duration::from_secs),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            secret_key: "test-secret".to_string(),
            ..Self::default()
        }
    }
}
