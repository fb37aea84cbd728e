//! Retention sweep
//!
//! Every key already carries a TTL, so abandoned state self-expires; the
//! sweep exists for stores where TTLs were refreshed or administration
//! wants space back now. It enumerates job records, finds those older than
//! the retention age, and deletes the three related key groups.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::AppError;
use crate::features::imports::models::ImportJob;
use crate::features::FeatureState;
use crate::storage::{keys, StoreError};

/// Sweep result counts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub jobs_deleted: u64,
    pub chunks_deleted: u64,
}

/// Errors during the sweep
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CleanupError> for AppError {
    fn from(err: CleanupError) -> Self {
        match err {
            CleanupError::Store(e) => AppError::Store(e),
        }
    }
}

/// Delete job state past the retention age
pub async fn handle(state: &FeatureState) -> Result<CleanupResponse, CleanupError> {
    let retention = chrono::Duration::seconds(state.config.retention_secs as i64);
    let now = Utc::now();

    let mut jobs_deleted = 0u64;
    let mut chunks_deleted = 0u64;

    for job_key in state.store.scan_prefix(keys::JOB_KEY_PREFIX).await? {
        let Some(fields) = state.store.hash_get_all(&job_key).await? else {
            continue;
        };

        let (job_id, total_chunks, expired) = match ImportJob::from_fields(&fields) {
            Ok(job) => {
                // Age from the terminal timestamp when there is one, else
                // from creation, so long-running jobs are not cut short.
                let reference = job
                    .completed_at
                    .or(job.failed_at)
                    .unwrap_or(job.created_at);
                (job.job_id, job.total_chunks, now - reference > retention)
            }
            Err(e) => {
                warn!(key = %job_key, error = %e, "Unreadable job record, sweeping it");
                let job_id = keys::job_id_from_key(&job_key).unwrap_or_default().to_string();
                (job_id, 0, true)
            }
        };

        if !expired {
            continue;
        }

        for index in 0..total_chunks {
            if state
                .store
                .delete(&keys::chunk_key(&job_id, index))
                .await?
            {
                chunks_deleted += 1;
            }
        }
        state.store.delete(&keys::failure_key(&job_id)).await?;
        if state.store.delete(&job_key).await? {
            jobs_deleted += 1;
        }
    }

    info!(jobs_deleted, chunks_deleted, "Retention sweep finished");

    Ok(CleanupResponse {
        jobs_deleted,
        chunks_deleted,
    })
}
