use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::utils::retry::Retryable;

pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";

/// Error types for completion operations
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Completion returned no content")]
    EmptyResponse,

    #[error("Completion request timed out after {0:?}")]
    Timeout(Duration),
}

impl Retryable for CompletionError {
    fn is_retryable(&self) -> bool {
        matches!(self, CompletionError::ApiError(_) | CompletionError::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        CompletionError::Timeout(after)
    }
}

impl From<OpenAIError> for CompletionError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::Reqwest(_) | OpenAIError::ApiError(_) => {
                CompletionError::ApiError(format!("OpenAI API error: {}", e))
            }
            other => CompletionError::InvalidRequest(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Trait for text completion providers
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate text for the given prompts
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI chat-completions provider
pub struct OpenAICompletions {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompletions {
    pub fn new(
        api_key: Option<String>,
        api_base: Option<String>,
        model: Option<String>,
    ) -> Result<Self, CompletionError> {
        let api_key = api_key.ok_or_else(|| {
            CompletionError::ConfigError(
                "OPENAI_API_KEY environment variable is not set".to_string(),
            )
        })?;
        let model = model.unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string());

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }

        info!("Initialized OpenAI completions: model={}", model);

        Ok(Self {
            client: Client::with_config(config),
            model,
        })
    }

    /// Chat request with a system and a user message. The cap goes out as
    /// `max_tokens`, which OpenAI-compatible servers honour.
    fn chat_request(
        &self,
        request: CompletionRequest,
    ) -> Result<CreateChatCompletionRequest, CompletionError> {
        Ok(CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_prompt)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.user_prompt)
                    .build()?
                    .into(),
            ])
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()?)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAICompletions {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let chat_request = self.chat_request(request)?;

        debug!("Requesting completion from {}", self.model);

        let response = self.client.chat().create(chat_request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
