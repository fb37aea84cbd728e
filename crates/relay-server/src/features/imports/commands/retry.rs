//! Retry command
//!
//! Builds a brand-new job out of a finished job's failure log and hands it
//! straight to the engine. The failed objects are already durable, so the
//! new job is born with every chunk "received" and skips the ingestion
//! protocol entirely. The source job and its failure log are left intact.
//!
//! Failures classified as `timeout` are retried like any other: the
//! original write may or may not have been applied downstream, so a retry
//! can create duplicates. That ambiguity is inherent to the classification
//! and is deliberately not second-guessed here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::features::imports::models::{FailureRecord, ImportJob, JobStatus, ModelError};
use crate::features::FeatureState;
use crate::storage::{keys, StoreError};

/// Retry request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryCommand {
    pub job_id: String,
}

/// Response for a minted retry job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub new_job_id: String,
    pub original_job_id: String,
    pub object_count: u64,
}

/// Errors creating a retry job
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("No failed objects recorded for job {0}")]
    NoFailures(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} has no resolvable owner")]
    MissingOwner(String),

    #[error("Corrupt job state: {0}")]
    Corrupt(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ModelError> for RetryError {
    fn from(err: ModelError) -> Self {
        RetryError::Corrupt(err.to_string())
    }
}

impl From<RetryError> for AppError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::NoFailures(job_id) => {
                AppError::NotFound(format!("No failed objects recorded for job {job_id}"))
            }
            RetryError::JobNotFound(job_id) => AppError::NotFound(format!("Job not found: {job_id}")),
            RetryError::MissingOwner(job_id) => {
                AppError::Internal(format!("Job {job_id} has no resolvable owner"))
            }
            RetryError::Corrupt(msg) => AppError::Internal(msg),
            RetryError::Store(e) => AppError::Store(e),
            RetryError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Mint a new job from the source job's failure log and trigger it
pub async fn handle(
    state: &FeatureState,
    command: RetryCommand,
) -> Result<RetryResponse, RetryError> {
    let failure_key = keys::failure_key(&command.job_id);
    let total = state.store.list_len(&failure_key).await?;
    if total == 0 {
        return Err(RetryError::NoFailures(command.job_id));
    }

    let lines = state.store.list_range(&failure_key, 0, total).await?;
    let objects = lines
        .iter()
        .map(|line| serde_json::from_str::<FailureRecord>(line).map(|record| record.object))
        .collect::<Result<Vec<Value>, _>>()?;

    let fields = state
        .store
        .hash_get_all(&keys::job_key(&command.job_id))
        .await?
        .ok_or_else(|| RetryError::JobNotFound(command.job_id.clone()))?;
    let source = ImportJob::from_fields(&fields)?;
    if source.owner_id.trim().is_empty() {
        return Err(RetryError::MissingOwner(command.job_id));
    }

    let ttl = Duration::from_secs(state.config.state_ttl_secs);
    let new_job_id = Uuid::new_v4().to_string();
    let chunks: Vec<&[Value]> = objects.chunks(state.config.max_objects_per_chunk).collect();
    let total_chunks = chunks.len() as u32;

    // All data is already at hand, so the job is born fully received.
    let mut job = ImportJob::new(
        new_job_id.clone(),
        source.owner_id.clone(),
        objects.len() as u64,
        total_chunks,
    );
    job.status = JobStatus::Pending;
    job.received_chunks = total_chunks;
    job.retry_of = Some(command.job_id.clone());

    let job_key = keys::job_key(&new_job_id);
    state.store.hash_set(&job_key, &job.to_fields()).await?;
    state.store.expire(&job_key, ttl).await?;

    for (index, chunk) in chunks.iter().enumerate() {
        let chunk_key = keys::chunk_key(&new_job_id, index as u32);
        state
            .store
            .put(&chunk_key, serde_json::to_string(chunk)?)
            .await?;
        state.store.expire(&chunk_key, ttl).await?;
    }

    info!(
        new_job_id = %new_job_id,
        original_job_id = %command.job_id,
        object_count = objects.len(),
        "Retry job created"
    );

    state.engine.trigger(new_job_id.clone());

    Ok(RetryResponse {
        new_job_id,
        original_job_id: command.job_id,
        object_count: objects.len() as u64,
    })
}
