//! Typed error taxonomy shared by the pipeline and the HTTP layer.
//!
//! Two enums cover the whole system:
//!
//! - [`ProviderError`]: returned by chat completion adapters. The model
//!   router dispatches on the variant: [`ProviderError::Quota`] falls
//!   through to the fallback chain, everything else propagates.
//! - [`ApiError`]: everything a request handler can fail with. Converts
//!   into an HTTP response with the body shape
//!   `{ "error": { "code": "...", "message": "..." } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failure modes of a chat completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Rate-limit or quota exhaustion (HTTP 429, or the provider's own
    /// quota error payload). Retryable against the fallback chain.
    #[error("quota exhausted: {0}")]
    Quota(String),

    /// The provider is not usable right now: no API key configured, or the
    /// endpoint refused the connection.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with a non-quota error status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (timeout, DNS, TLS).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered 200 but the body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Whether the router may retry this failure on another provider when
    /// the caller named a specific model.
    pub fn is_quota(&self) -> bool {
        matches!(self, ProviderError::Quota(_))
    }
}

/// Request-level error type for every handler and pipeline stage.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unreadable, encrypted, or empty PDF payload.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Embedding provider failure (after retries).
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector upsert/search/delete failure.
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Object storage read/write/delete failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The named provider and every fallback hit a quota limit.
    #[error("quota exhausted: {0}")]
    ProviderQuota(String),

    /// Non-quota LLM failure; never retried.
    #[error("provider error: {0}")]
    Provider(String),

    /// Missing folder/file/session id. Message carries the entity and id.
    #[error("{0}")]
    NotFound(String),

    /// Bad input: non-PDF upload, empty message, malformed body.
    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        ApiError::NotFound(format!("{} not found: {}", entity, id))
    }
}

/// JSON error response body.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Machine-readable code used in the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Extraction(_) => "extraction_failed",
            ApiError::Embedding(_) => "embedding_failed",
            ApiError::VectorStore(_) => "vector_store_error",
            ApiError::Storage(_) => "storage_error",
            ApiError::ProviderQuota(_) => "provider_quota",
            ApiError::Provider(_) => "provider_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "bad_request",
            ApiError::Database(_) => "database_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ProviderQuota(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::Embedding(_)
            | ApiError::VectorStore(_)
            | ApiError::Storage(_)
            | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
