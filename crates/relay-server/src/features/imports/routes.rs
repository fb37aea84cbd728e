//! Import routes
//!
//! HTTP wiring for the import pipeline. Handlers translate between the wire
//! and the command/query handlers; all policy lives in those handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::commands::{cleanup, retry, submit_chunk};
use super::queries::{get_status, list_failures};
use crate::error::AppError;
use crate::features::FeatureState;

/// Create import routes
pub fn imports_routes() -> Router<FeatureState> {
    Router::new()
        .route("/chunks", post(submit_chunk_handler))
        .route("/cleanup", post(cleanup_handler))
        .route("/:job_id", get(get_status_handler))
        .route("/:job_id/failures", get(list_failures_handler))
        .route("/:job_id/retry", post(retry_handler))
}

/// Submit one chunk of an import job
///
/// POST /imports/chunks
async fn submit_chunk_handler(
    State(state): State<FeatureState>,
    payload: Result<Json<submit_chunk::SubmitChunkRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload
        .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?;

    let response = submit_chunk::handle(&state, request).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Get status and progress for a job
///
/// GET /imports/:job_id
async fn get_status_handler(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let response = get_status::handle(state.store.as_ref(), &job_id).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// List recorded failures for a job
///
/// GET /imports/:job_id/failures?offset=0&limit=50
async fn list_failures_handler(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
    Query(params): Query<list_failures::ListFailuresParams>,
) -> Result<Response, AppError> {
    let response = list_failures::handle(state.store.as_ref(), &job_id, params).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Build and trigger a retry job from recorded failures
///
/// POST /imports/:job_id/retry
async fn retry_handler(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let response = retry::handle(&state, retry::RetryCommand { job_id }).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Run the retention sweep
///
/// POST /imports/cleanup
async fn cleanup_handler(State(state): State<FeatureState>) -> Result<Response, AppError> {
    let response = cleanup::handle(&state).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}
