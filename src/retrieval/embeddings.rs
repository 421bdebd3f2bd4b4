use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::Config;
use crate::utils::retry::Retryable;

/// Default local model, 384-dimensional
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Error types for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::ApiError(_) | EmbeddingError::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        EmbeddingError::Timeout(after)
    }
}

/// Trait for embedding providers
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a list of texts, one vector per text, in input order
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI embedding provider
pub struct OpenAIEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
    /// Semaphore to limit concurrent requests
    semaphore: Arc<Semaphore>,
}

impl OpenAIEmbeddings {
    /// Create a new OpenAI embedding provider
    pub fn new(
        api_key: Option<String>,
        api_base: Option<String>,
        model: Option<String>,
        max_concurrent: usize,
    ) -> Result<Self, EmbeddingError> {
        let api_key = api_key.ok_or_else(|| {
            EmbeddingError::ConfigError("OPENAI_API_KEY not set and no API key provided".to_string())
        })?;

        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());

        // Determine dimension based on model
        let dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536, // Default
        };

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        let client = Client::with_config(config);

        info!(
            "Initialized OpenAI embeddings: model={}, dimension={}, max_concurrent={}",
            model, dimension, max_concurrent
        );

        Ok(Self {
            client,
            model,
            dimension,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Embed texts in batches to avoid API limits
    async fn embed_batch(
        &self,
        texts: Vec<String>,
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let _permit = self.semaphore.acquire().await.map_err(|e| {
                EmbeddingError::ApiError(format!("Failed to acquire semaphore: {}", e))
            })?;

            debug!("Embedding batch of {} texts", chunk.len());

            let request = CreateEmbeddingRequest {
                model: self.model.clone(),
                input: EmbeddingInput::StringArray(chunk.to_vec()),
                encoding_format: None,
                user: None,
                dimensions: None,
            };

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(openai_error)?;

            // the API does not promise response order; `index` does
            let mut data = response.data;
            data.sort_by_key(|d| d.index);
            all_embeddings.extend(data.into_iter().map(|d| d.embedding));
        }

        Ok(all_embeddings)
    }
}

fn openai_error(e: OpenAIError) -> EmbeddingError {
    match e {
        OpenAIError::Reqwest(_) | OpenAIError::ApiError(_) => {
            EmbeddingError::ApiError(format!("OpenAI API error: {}", e))
        }
        other => EmbeddingError::InvalidInput(other.to_string()),
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        info!("Generating embeddings for {} texts", texts.len());

        // Assuming average of 100 tokens per text, batch size of 50 stays under request limits
        let batch_size = 50;

        self.embed_batch(texts, batch_size).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Factory for creating embedding providers
pub struct EmbeddingFactory;

impl EmbeddingFactory {
    /// Create the embedding provider selected by `RAG_EMBEDDING_ENGINE`.
    ///
    /// The local engine downloads (first run) and loads its model here, so
    /// model problems surface at startup rather than on the first request.
    pub async fn from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        let engine = config.rag_embedding_engine.to_lowercase();

        info!("Creating embedding provider: {}", engine);

        match engine.as_str() {
            "local" | "" => {
                let provider =
                    super::local_embeddings::LocalEmbeddings::load(&config.rag_embedding_model)
                        .await?;
                Ok(Arc::new(provider))
            }
            "openai" => {
                let provider = OpenAIEmbeddings::new(
                    config.openai_api_key.clone(),
                    config.openai_api_base_url.clone(),
                    Some(config.rag_embedding_model.clone()),
                    config.openai_max_concurrent,
                )?;
                Ok(Arc::new(provider))
            }
            _ => Err(EmbeddingError::ConfigError(format!(
                "Unsupported embedding engine: {}. Supported: local, openai",
                engine
            ))),
        }
    }
}
