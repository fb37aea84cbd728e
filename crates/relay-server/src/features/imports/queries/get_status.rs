//! Job status query
//!
//! Live progress polling: counters are updated per batch, so a processing
//! job shows movement without waiting for the whole run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::error::AppError;
use crate::features::imports::models::{ImportJob, JobStatus, ModelError};
use crate::storage::{keys, StateStore, StoreError};

/// Status response for one job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

/// Errors reading job status
#[derive(Debug, Error)]
pub enum GetStatusError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Corrupt job state: {0}")]
    Corrupt(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<GetStatusError> for AppError {
    fn from(err: GetStatusError) -> Self {
        match err {
            GetStatusError::NotFound(job_id) => {
                AppError::NotFound(format!("Job not found: {job_id}"))
            }
            GetStatusError::Corrupt(e) => AppError::Internal(e.to_string()),
            GetStatusError::Store(e) => AppError::Store(e),
        }
    }
}

pub async fn handle(
    store: &dyn StateStore,
    job_id: &str,
) -> Result<JobStatusResponse, GetStatusError> {
    let fields = store
        .hash_get_all(&keys::job_key(job_id))
        .await?
        .ok_or_else(|| GetStatusError::NotFound(job_id.to_string()))?;
    let job = ImportJob::from_fields(&fields)?;

    Ok(JobStatusResponse {
        job_id: job.job_id,
        status: job.status,
        total: job.total_objects,
        processed: job.processed,
        failed: job.failed,
        created_at: job.created_at,
        completed_at: job.completed_at,
        error: job.error,
        retry_of: job.retry_of,
    })
}
