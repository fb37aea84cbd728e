//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use crate::api::response::ErrorBody;
use crate::storage::StoreError;

/// Result type alias for handler operations
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Application error taxonomy
///
/// Validation and rate-limit errors are surfaced synchronously at ingestion
/// time. Backend batch errors never appear here: they are recorded as
/// failure data and the job continues. Orchestration errors terminate a job
/// and surface via status polling, not via this type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limit exceeded")]
    RateLimited {
        count: u64,
        limit: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(message) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new(message))
            }
            AppError::PayloadTooLarge(message) => {
                (StatusCode::PAYLOAD_TOO_LARGE, ErrorBody::new(message))
            }
            AppError::RateLimited { count, limit, reset_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody::with_details(
                    "Too many chunk submissions",
                    json!({
                        "count": count,
                        "limit": limit,
                        "resetAt": reset_at.to_rfc3339(),
                    }),
                ),
            ),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, ErrorBody::new(message)),
            AppError::Store(ref e) => {
                tracing::error!("Store error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("A storage error occurred"),
                )
            }
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("An internal error occurred"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
