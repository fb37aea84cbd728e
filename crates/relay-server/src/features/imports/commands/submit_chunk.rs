//! Chunk submission command
//!
//! One call ingests one chunk of a job. The first chunk of a submission
//! (index 0, no session id) mints the job; every call persists its chunk
//! and advances `received_chunks` with the store's atomic increment. The
//! increment's return value is the only thing consulted to decide whether
//! this call completed reception: two racing submissions cannot both
//! observe "all received", so the engine is triggered exactly once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::features::imports::models::{ImportJob, JobStatus, ModelError};
use crate::features::imports::rate_limit::RateLimitVerdict;
use crate::features::FeatureState;
use crate::storage::{keys, StoreError};

/// Chunk submission request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitChunkRequest {
    pub objects: Option<Vec<Value>>,
    pub owner_id: Option<String>,
    pub total_objects: Option<u64>,
    pub chunk_index: Option<u32>,
    pub total_chunks: Option<u32>,
    pub session_id: Option<String>,
}

/// Validated chunk submission
#[derive(Debug, Clone)]
pub struct SubmitChunkCommand {
    pub objects: Vec<Value>,
    pub owner_id: String,
    pub total_objects: u64,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub session_id: Option<String>,
}

/// Response for an accepted chunk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitChunkResponse {
    pub job_id: String,
    pub accepted: bool,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub complete: bool,
}

/// Errors surfaced synchronously to the submitting caller
#[derive(Debug, Error)]
pub enum SubmitChunkError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Chunk submission rate limit exceeded")]
    RateLimited(RateLimitVerdict),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt job record: {0}")]
    Corrupt(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SubmitChunkError> for AppError {
    fn from(err: SubmitChunkError) -> Self {
        match err {
            SubmitChunkError::Validation(msg) => AppError::Validation(msg),
            SubmitChunkError::PayloadTooLarge(msg) => AppError::PayloadTooLarge(msg),
            SubmitChunkError::RateLimited(verdict) => AppError::RateLimited {
                count: verdict.count,
                limit: verdict.limit,
                reset_at: verdict.reset_at,
            },
            SubmitChunkError::Store(e) => AppError::Store(e),
            SubmitChunkError::Corrupt(e) => AppError::Internal(e.to_string()),
            SubmitChunkError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl SubmitChunkRequest {
    /// Validate the request into a command
    pub fn validate(self, config: &ImportConfig) -> Result<SubmitChunkCommand, SubmitChunkError> {
        let owner_id = self
            .owner_id
            .filter(|owner| !owner.trim().is_empty())
            .ok_or_else(|| SubmitChunkError::Validation("ownerId is required".to_string()))?;

        let objects = self
            .objects
            .filter(|objects| !objects.is_empty())
            .ok_or_else(|| {
                SubmitChunkError::Validation("objects must be a non-empty list".to_string())
            })?;

        let total_objects = self.total_objects.ok_or_else(|| {
            SubmitChunkError::Validation("totalObjects is required".to_string())
        })?;
        let chunk_index = self.chunk_index.ok_or_else(|| {
            SubmitChunkError::Validation("chunkIndex is required".to_string())
        })?;
        let total_chunks = self.total_chunks.ok_or_else(|| {
            SubmitChunkError::Validation("totalChunks is required".to_string())
        })?;

        if total_chunks == 0 {
            return Err(SubmitChunkError::Validation(
                "totalChunks must be greater than 0".to_string(),
            ));
        }

        if chunk_index >= total_chunks {
            return Err(SubmitChunkError::Validation(format!(
                "chunkIndex {chunk_index} is out of range for {total_chunks} chunks"
            )));
        }

        if objects.len() > config.max_objects_per_chunk {
            return Err(SubmitChunkError::PayloadTooLarge(format!(
                "Chunk carries {} objects, limit is {}",
                objects.len(),
                config.max_objects_per_chunk
            )));
        }

        Ok(SubmitChunkCommand {
            objects,
            owner_id,
            total_objects,
            chunk_index,
            total_chunks,
            session_id: self.session_id,
        })
    }
}

/// Handle one chunk submission
pub async fn handle(
    state: &FeatureState,
    request: SubmitChunkRequest,
) -> Result<SubmitChunkResponse, SubmitChunkError> {
    let command = request.validate(&state.config)?;

    let verdict = state.limiter.check(&command.owner_id).await?;
    if !verdict.allowed {
        return Err(SubmitChunkError::RateLimited(verdict));
    }

    let payload = serde_json::to_string(&command.objects)?;
    if payload.len() > state.config.max_chunk_bytes {
        return Err(SubmitChunkError::PayloadTooLarge(format!(
            "Chunk payload is {} bytes, limit is {}",
            payload.len(),
            state.config.max_chunk_bytes
        )));
    }

    let ttl = Duration::from_secs(state.config.state_ttl_secs);

    let (job_id, job_total_chunks) = match &command.session_id {
        Some(session_id) => resolve_session(state, session_id, &command).await?,
        None => {
            if command.chunk_index != 0 {
                return Err(SubmitChunkError::Validation(
                    "sessionId is required for every chunk after the first".to_string(),
                ));
            }
            let job_id = Uuid::new_v4().to_string();
            let job = ImportJob::new(
                job_id.clone(),
                command.owner_id.clone(),
                command.total_objects,
                command.total_chunks,
            );
            let job_key = keys::job_key(&job_id);
            state.store.hash_set(&job_key, &job.to_fields()).await?;
            state.store.expire(&job_key, ttl).await?;

            info!(
                job_id = %job_id,
                owner_id = %command.owner_id,
                total_objects = command.total_objects,
                total_chunks = command.total_chunks,
                "Import job created"
            );

            (job_id, command.total_chunks)
        }
    };

    let chunk_key = keys::chunk_key(&job_id, command.chunk_index);
    state.store.put(&chunk_key, payload).await?;
    state.store.expire(&chunk_key, ttl).await?;

    // The atomic increment is the sole arbiter of completion.
    let received = state
        .store
        .hash_incr(&keys::job_key(&job_id), "received_chunks", 1)
        .await?;
    let complete = received == job_total_chunks as i64;

    if complete {
        state
            .store
            .hash_set(
                &keys::job_key(&job_id),
                &[("status".to_string(), JobStatus::Pending.as_str().to_string())],
            )
            .await?;

        info!(
            job_id = %job_id,
            total_chunks = job_total_chunks,
            "All chunks received, triggering processing"
        );
        state.engine.trigger(job_id.clone());
    }

    Ok(SubmitChunkResponse {
        job_id,
        accepted: true,
        received_chunks: received.clamp(0, u32::MAX as i64) as u32,
        total_chunks: job_total_chunks,
        complete,
    })
}

/// Look up the job for a continuation chunk and sanity-check it
async fn resolve_session(
    state: &FeatureState,
    session_id: &str,
    command: &SubmitChunkCommand,
) -> Result<(String, u32), SubmitChunkError> {
    let fields = state
        .store
        .hash_get_all(&keys::job_key(session_id))
        .await?
        .ok_or_else(|| {
            SubmitChunkError::Validation(format!("Unknown import session: {session_id}"))
        })?;
    let job = ImportJob::from_fields(&fields)?;

    if job.status != JobStatus::Receiving {
        return Err(SubmitChunkError::Validation(format!(
            "Job {session_id} is no longer accepting chunks (status: {})",
            job.status
        )));
    }

    if job.total_chunks != command.total_chunks {
        return Err(SubmitChunkError::Validation(format!(
            "totalChunks {} does not match the declared {} for job {session_id}",
            command.total_chunks, job.total_chunks
        )));
    }

    if job.total_objects != command.total_objects {
        return Err(SubmitChunkError::Validation(format!(
            "totalObjects {} does not match the declared {} for job {session_id}",
            command.total_objects, job.total_objects
        )));
    }

    Ok((session_id.to_string(), job.total_chunks))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(objects: usize) -> SubmitChunkRequest {
        SubmitChunkRequest {
            objects: Some(
                (0..objects)
                    .map(|i| serde_json::json!({ "id": i }))
                    .collect(),
            ),
            owner_id: Some("owner-1".to_string()),
            total_objects: Some(objects as u64),
            chunk_index: Some(0),
            total_chunks: Some(1),
            session_id: None,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        let command = request(3).validate(&ImportConfig::default()).unwrap();
        assert_eq!(command.objects.len(), 3);
        assert_eq!(command.owner_id, "owner-1");
    }

    #[test]
    fn test_validate_rejects_missing_owner() {
        let mut req = request(3);
        req.owner_id = None;
        assert!(matches!(
            req.validate(&ImportConfig::default()),
            Err(SubmitChunkError::Validation(_))
        ));

        let mut req = request(3);
        req.owner_id = Some("   ".to_string());
        assert!(matches!(
            req.validate(&ImportConfig::default()),
            Err(SubmitChunkError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_objects() {
        let mut req = request(0);
        req.objects = Some(Vec::new());
        assert!(matches!(
            req.validate(&ImportConfig::default()),
            Err(SubmitChunkError::Validation(_))
        ));

        let mut req = request(0);
        req.objects = None;
        assert!(matches!(
            req.validate(&ImportConfig::default()),
            Err(SubmitChunkError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_chunk_index() {
        let mut req = request(3);
        req.chunk_index = Some(2);
        req.total_chunks = Some(2);
        assert!(req.validate(&ImportConfig::default()).is_ok());

        let mut req = request(3);
        req.chunk_index = Some(2);
        req.total_chunks = Some(1);
        assert!(matches!(
            req.validate(&ImportConfig::default()),
            Err(SubmitChunkError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_chunk() {
        let config = ImportConfig {
            max_objects_per_chunk: 2,
            ..ImportConfig::default()
        };
        assert!(matches!(
            request(3).validate(&config),
            Err(SubmitChunkError::PayloadTooLarge(_))
        ));
    }
}
