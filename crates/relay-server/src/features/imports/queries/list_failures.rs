//! Failure listing query
//!
//! Pages through a job's failure log. Granularity is the batch: when a
//! batch is rejected, every object in it appears here, including objects
//! the backend might have accepted individually. The aggregate API reports
//! nothing per object, so finer attribution is not possible.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::features::imports::models::FailureRecord;
use crate::storage::{keys, StateStore, StoreError};

/// Default page size for failure listings.
pub const DEFAULT_FAILURE_PAGE_SIZE: usize = 50;

/// Maximum page size for failure listings.
pub const MAX_FAILURE_PAGE_SIZE: usize = 500;

/// Query string parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFailuresParams {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ListFailuresParams {
    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_FAILURE_PAGE_SIZE)
            .clamp(1, MAX_FAILURE_PAGE_SIZE)
    }
}

/// One page of a job's failure log
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFailuresResponse {
    pub failures: Vec<FailureRecord>,
    pub total: usize,
    pub has_more: bool,
}

/// Errors listing failures
#[derive(Debug, Error)]
pub enum ListFailuresError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corrupt failure record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ListFailuresError> for AppError {
    fn from(err: ListFailuresError) -> Self {
        match err {
            ListFailuresError::JobNotFound(job_id) => {
                AppError::NotFound(format!("Job not found: {job_id}"))
            }
            ListFailuresError::Corrupt(e) => AppError::Internal(e.to_string()),
            ListFailuresError::Store(e) => AppError::Store(e),
        }
    }
}

pub async fn handle(
    store: &dyn StateStore,
    job_id: &str,
    params: ListFailuresParams,
) -> Result<ListFailuresResponse, ListFailuresError> {
    if store.hash_get_all(&keys::job_key(job_id)).await?.is_none() {
        return Err(ListFailuresError::JobNotFound(job_id.to_string()));
    }

    let failure_key = keys::failure_key(job_id);
    let total = store.list_len(&failure_key).await?;

    let offset = params.offset();
    let limit = params.limit();
    let lines = store.list_range(&failure_key, offset, limit).await?;
    let failures = lines
        .iter()
        .map(|line| serde_json::from_str::<FailureRecord>(line))
        .collect::<Result<Vec<_>, _>>()?;

    let has_more = offset + failures.len() < total;

    Ok(ListFailuresResponse {
        failures,
        total,
        has_more,
    })
}
