use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retrieval::{
    ChunkingError, CompletionError, EmbeddingError, TableError, VectorError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("CSV parse error: {0}")]
    Parse(#[from] TableError),

    #[error("Dataset is empty or too small to chunk.")]
    EmptyDataset,

    #[error("Deep Q&A not prepared for this dataset. Call /deepqa_prepare first.")]
    NotPrepared,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Index build error: {0}")]
    IndexBuild(#[from] VectorError),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ChunkingError> for AppError {
    fn from(err: ChunkingError) -> Self {
        match err {
            ChunkingError::EmptyDataset => AppError::EmptyDataset,
            ChunkingError::InvalidChunkSize => AppError::Internal(err.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Validation(ref e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::NotFound(ref e) => (StatusCode::NOT_FOUND, e.clone()),
            AppError::Unauthorized(ref e) => (StatusCode::UNAUTHORIZED, e.clone()),
            AppError::Jwt(ref e) => {
                tracing::debug!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            AppError::Parse(_) | AppError::EmptyDataset | AppError::NotPrepared => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Embedding(ref e) => {
                tracing::error!("Embedding error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Completion(ref e) => {
                tracing::error!("Completion error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::IndexBuild(ref e) => {
                tracing::error!("Index build error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Gone(ref e) => (StatusCode::GONE, e.clone()),
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.clone())
            }
        };

        let body = ErrorResponse {
            detail: error_message,
        };

        // Errors raised in middleware never reach the CORS layer, so carry the headers here
        HttpResponse::build(status)
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .insert_header((header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"))
            .insert_header((
                header::ACCESS_CONTROL_ALLOW_METHODS,
                "GET, POST, DELETE, OPTIONS",
            ))
            .insert_header((
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Content-Type, Authorization, Accept, Cookie",
            ))
            .json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Parse(_) => StatusCode::BAD_REQUEST,
            AppError::EmptyDataset => StatusCode::BAD_REQUEST,
            AppError::NotPrepared => StatusCode::BAD_REQUEST,
            AppError::Embedding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Completion(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IndexBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
