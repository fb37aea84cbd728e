//! Import pipeline domain model
//!
//! Job records are persisted as string-field hashes, chunks as JSON blobs,
//! failure records as JSON list elements. The hash mapping lives here so
//! the rest of the pipeline only ever sees typed values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Lifecycle status of an import job
///
/// Progression is strictly forward: receiving -> pending -> processing ->
/// completed | failed. A job never reverts to an earlier status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Receiving,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Receiving => "receiving",
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receiving" => Ok(JobStatus::Receiving),
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ModelError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed batch
///
/// `Timeout` is inherently ambiguous: the request deadline elapsed on our
/// side, but the backend may still have applied the write. It is recorded
/// as-is, never reclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Timeout,
    HttpError,
    NetworkError,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::HttpError => "httpError",
            FailureKind::NetworkError => "networkError",
            FailureKind::Unknown => "unknown",
        }
    }
}

/// One object that was part of a batch the backend did not confirm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub job_id: String,
    pub batch_number: usize,
    pub index_in_batch: usize,
    pub object: Value,
    pub error_message: String,
    pub error_kind: FailureKind,
    pub timestamp: DateTime<Utc>,
}

/// Durable record of one import submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub status: JobStatus,
    pub owner_id: String,
    pub total_objects: u64,
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub processed: u64,
    pub failed: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

/// Errors mapping between store hashes and typed records
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Job record is missing field '{0}'")]
    MissingField(&'static str),

    #[error("Job record field '{field}' is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid timestamp in field '{field}': {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

impl ImportJob {
    /// Fresh job record as minted by the first chunk of a submission
    pub fn new(job_id: String, owner_id: String, total_objects: u64, total_chunks: u32) -> Self {
        Self {
            job_id,
            status: JobStatus::Receiving,
            owner_id,
            total_objects,
            total_chunks,
            received_chunks: 0,
            processed: 0,
            failed: 0,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            error: None,
            retry_of: None,
        }
    }

    /// Hash representation for the store
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("job_id".to_string(), self.job_id.clone()),
            ("status".to_string(), self.status.as_str().to_string()),
            ("owner_id".to_string(), self.owner_id.clone()),
            ("total_objects".to_string(), self.total_objects.to_string()),
            ("total_chunks".to_string(), self.total_chunks.to_string()),
            ("received_chunks".to_string(), self.received_chunks.to_string()),
            ("processed".to_string(), self.processed.to_string()),
            ("failed".to_string(), self.failed.to_string()),
            ("created_at".to_string(), self.created_at.to_rfc3339()),
        ];
        if let Some(at) = self.completed_at {
            fields.push(("completed_at".to_string(), at.to_rfc3339()));
        }
        if let Some(at) = self.failed_at {
            fields.push(("failed_at".to_string(), at.to_rfc3339()));
        }
        if let Some(error) = &self.error {
            fields.push(("error".to_string(), error.clone()));
        }
        if let Some(retry_of) = &self.retry_of {
            fields.push(("retry_of".to_string(), retry_of.clone()));
        }
        fields
    }

    /// Rebuild a job record from its store hash
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, ModelError> {
        Ok(Self {
            job_id: required(fields, "job_id")?.to_string(),
            status: required(fields, "status")?.parse()?,
            owner_id: fields.get("owner_id").cloned().unwrap_or_default(),
            total_objects: numeric(fields, "total_objects")?,
            total_chunks: numeric(fields, "total_chunks")?,
            received_chunks: numeric(fields, "received_chunks")?,
            processed: numeric(fields, "processed")?,
            failed: numeric(fields, "failed")?,
            created_at: timestamp(fields, "created_at")?
                .ok_or(ModelError::MissingField("created_at"))?,
            completed_at: timestamp(fields, "completed_at")?,
            failed_at: timestamp(fields, "failed_at")?,
            error: fields.get("error").cloned(),
            retry_of: fields.get("retry_of").cloned(),
        })
    }
}

fn required<'a>(
    fields: &'a HashMap<String, String>,
    field: &'static str,
) -> Result<&'a str, ModelError> {
    fields
        .get(field)
        .map(String::as_str)
        .ok_or(ModelError::MissingField(field))
}

fn numeric<T: std::str::FromStr>(
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<T, ModelError> {
    let value = required(fields, field)?;
    value.parse().map_err(|_| ModelError::NotNumeric {
        field,
        value: value.to_string(),
    })
}

fn timestamp(
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, ModelError> {
    match fields.get(field) {
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|_| ModelError::InvalidTimestamp {
                field,
                value: value.clone(),
            }),
        None => Ok(None),
    }
}
