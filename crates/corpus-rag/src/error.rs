//! Error types for the ingestion and retrieval engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Text extraction failed for a source
    #[error("Failed to extract text from '{src}': {message}")]
    Extraction { src: String, message: String },

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Provider rejected the request due to rate limiting
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Chunk/registry storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Store rejected the embedding vector specifically
    #[error("Vector storage rejected: {0}")]
    VectorRejected(String),

    /// Search error (single branch; degraded, not user-visible)
    #[error("Search error: {0}")]
    Search(String),

    /// Re-ranker error (best-effort, never surfaced)
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Invalid status transition requested
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an extraction error
    pub fn extraction(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            src: source.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-readable tag, recorded in the DLQ
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Extraction { .. } => "extraction",
            Self::Embedding(_) => "embedding",
            Self::RateLimited(_) => "rate_limited",
            Self::Storage(_) => "storage",
            Self::VectorRejected(_) => "vector_rejected",
            Self::Search(_) => "search",
            Self::Rerank(_) => "rerank",
            Self::Llm(_) => "llm",
            Self::DocumentNotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Http(_) => "http",
            Self::Database(_) => "database",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::Extraction { src, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "extraction_error",
                format!("Failed to extract '{}': {}", src, message),
            ),
            Error::Embedding(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error", msg.clone())
            }
            Error::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", msg.clone()),
            Error::Storage(msg) | Error::VectorRejected(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg.clone())
            }
            Error::Search(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "search_error", msg.clone()),
            Error::Rerank(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "rerank_error", msg.clone()),
            Error::Llm(msg) => (StatusCode::SERVICE_UNAVAILABLE, "llm_error", msg.clone()),
            Error::DocumentNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Document not found: {}", id),
            ),
            Error::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                "invalid_transition",
                format!("Invalid status transition: {} -> {}", from, to),
            ),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Database(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                err.to_string(),
            ),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
