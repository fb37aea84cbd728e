//! Batch execution engine
//!
//! Drives one import job end to end: reconstructs the object list from its
//! chunks, partitions it into fixed-size batches, pushes the batches through
//! the authenticated transport under a bounded-concurrency rolling window,
//! records per-object failures, and finalizes the job record.
//!
//! The engine holds no state of its own; everything is reconstructed from
//! the store per invocation, so engines for different jobs run concurrently
//! without coordination. Duplicate triggers are safe: terminal and
//! already-processing jobs return as no-ops before any durable write.

use chrono::Utc;
use futures::future;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::models::{FailureRecord, ImportJob, JobStatus};
use crate::config::ImportConfig;
use crate::storage::{keys, StateStore, StoreError};
use crate::transport::AggregateClient;

/// Errors that abort an engine run
///
/// A failed batch is not an error: it becomes failure records and the job
/// keeps going. Only orchestration-level problems end up here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} is not ready for processing (status: {status})")]
    NotReady { job_id: String, status: JobStatus },

    #[error("Job {0} has no resolvable owner")]
    MissingOwner(String),

    #[error("Corrupt job state: {0}")]
    Corrupt(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Batch task failed: {0}")]
    Join(String),
}

impl EngineError {
    /// Whether this error should mark the job record as failed
    ///
    /// A missing record cannot be marked, and a not-yet-ready job must not
    /// be killed by a stray early trigger.
    fn is_job_fatal(&self) -> bool {
        !matches!(self, EngineError::JobNotFound(_) | EngineError::NotReady { .. })
    }
}

/// Executes import jobs against the aggregate-import backend
pub struct BatchEngine {
    store: Arc<dyn StateStore>,
    backend: AggregateClient,
    config: ImportConfig,
}

impl BatchEngine {
    pub fn new(store: Arc<dyn StateStore>, backend: AggregateClient, config: ImportConfig) -> Self {
        Self { store, backend, config }
    }

    /// Fire-and-forget entry point
    ///
    /// Spawns the run as a detached task. Errors are captured into the job
    /// record by [`run`](Self::run) and logged here; nothing propagates to
    /// the caller, so a chunk submission never waits on processing.
    pub fn trigger(self: &Arc<Self>, job_id: String) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = engine.run(&job_id).await {
                error!(job_id = %job_id, error = %err, "Import job processing aborted");
            }
        });
    }

    /// Run one job to completion
    ///
    /// Idempotent: a job that is already terminal (or currently processing)
    /// returns immediately without touching the store.
    pub async fn run(&self, job_id: &str) -> Result<(), EngineError> {
        match self.execute(job_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.is_job_fatal() {
                    self.mark_failed(job_id, &err).await;
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, job_id: &str) -> Result<(), EngineError> {
        let job_key = keys::job_key(job_id);

        let fields = self
            .store
            .hash_get_all(&job_key)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        let job = ImportJob::from_fields(&fields)
            .map_err(|e| EngineError::Corrupt(e.to_string()))?;

        match job.status {
            JobStatus::Completed | JobStatus::Failed => {
                debug!(job_id = %job_id, status = %job.status, "Job already terminal, nothing to do");
                return Ok(());
            }
            JobStatus::Processing => {
                warn!(job_id = %job_id, "Job already processing, duplicate trigger ignored");
                return Ok(());
            }
            JobStatus::Receiving => {
                return Err(EngineError::NotReady {
                    job_id: job_id.to_string(),
                    status: job.status,
                });
            }
            JobStatus::Pending => {}
        }

        // First durable write: claims the job against duplicate triggers.
        self.store
            .hash_set(&job_key, &[("status".to_string(), JobStatus::Processing.as_str().to_string())])
            .await?;

        info!(
            job_id = %job_id,
            total_objects = job.total_objects,
            total_chunks = job.total_chunks,
            "Import job processing started"
        );

        let objects = self.gather_objects(job_id, job.total_chunks).await?;

        if job.owner_id.trim().is_empty() {
            return Err(EngineError::MissingOwner(job_id.to_string()));
        }

        let batches: Vec<Vec<Value>> = objects
            .chunks(self.config.batch_size)
            .map(|batch| batch.to_vec())
            .collect();
        let total_batches = batches.len();

        debug!(
            job_id = %job_id,
            batches = total_batches,
            batch_size = self.config.batch_size,
            max_in_flight = self.config.max_in_flight,
            "Dispatching batches"
        );

        self.drive_batches(job_id, &job.owner_id, batches).await?;

        // All batches attempted; the chunks have served their purpose.
        let mut chunks_deleted = 0u32;
        for index in 0..job.total_chunks {
            if self.store.delete(&keys::chunk_key(job_id, index)).await? {
                chunks_deleted += 1;
            }
        }

        self.store
            .hash_set(
                &job_key,
                &[
                    ("status".to_string(), JobStatus::Completed.as_str().to_string()),
                    ("completed_at".to_string(), Utc::now().to_rfc3339()),
                ],
            )
            .await?;

        info!(
            job_id = %job_id,
            batches = total_batches,
            chunks_deleted,
            "Import job completed"
        );

        Ok(())
    }

    /// Concatenate chunk contents in index order
    ///
    /// A missing chunk is logged and skipped; its objects are simply absent
    /// from processing.
    async fn gather_objects(
        &self,
        job_id: &str,
        total_chunks: u32,
    ) -> Result<Vec<Value>, EngineError> {
        let mut objects = Vec::new();
        for index in 0..total_chunks {
            let key = keys::chunk_key(job_id, index);
            match self.store.get(&key).await? {
                Some(raw) => {
                    let chunk: Vec<Value> = serde_json::from_str(&raw).map_err(|e| {
                        EngineError::Corrupt(format!("chunk {index} is not a JSON array: {e}"))
                    })?;
                    objects.extend(chunk);
                }
                None => {
                    warn!(
                        job_id = %job_id,
                        chunk_index = index,
                        "Chunk missing from store, its objects will not be processed"
                    );
                }
            }
        }
        Ok(objects)
    }

    /// Rolling-window batch dispatch
    ///
    /// Batches start in partition order, at most `max_in_flight` in flight,
    /// with a fixed delay between successive starts. Completion order is
    /// irrelevant: progress updates are commutative increments.
    async fn drive_batches(
        &self,
        job_id: &str,
        owner_id: &str,
        batches: Vec<Vec<Value>>,
    ) -> Result<(), EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let start_delay = Duration::from_millis(self.config.batch_start_delay_ms);
        let state_ttl = Duration::from_secs(self.config.state_ttl_secs);
        let total_batches = batches.len();

        let mut handles = Vec::with_capacity(total_batches);
        for (batch_number, batch) in batches.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Join(e.to_string()))?;

            let store = Arc::clone(&self.store);
            let backend = self.backend.clone();
            let job_id = job_id.to_string();
            let owner_id = owner_id.to_string();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                run_batch(&store, &backend, &job_id, &owner_id, batch_number, batch, state_ttl)
                    .await
            }));

            if batch_number + 1 < total_batches {
                tokio::time::sleep(start_delay).await;
            }
        }

        let mut first_error = None;
        for outcome in future::join_all(handles).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(EngineError::Join(err.to_string()));
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Best-effort terminal write for orchestration failures
    ///
    /// Chunks are deliberately left in place so a future re-trigger can
    /// still attempt them.
    async fn mark_failed(&self, job_id: &str, error: &EngineError) {
        let fields = [
            ("status".to_string(), JobStatus::Failed.as_str().to_string()),
            ("failed_at".to_string(), Utc::now().to_rfc3339()),
            ("error".to_string(), error.to_string()),
        ];
        if let Err(store_err) = self.store.hash_set(&keys::job_key(job_id), &fields).await {
            error!(
                job_id = %job_id,
                error = %store_err,
                "Failed to record job failure"
            );
        }
    }
}

/// Attempt one batch and record its outcome
///
/// One request per batch: 2xx confirms every object, anything else fails
/// every object as a unit, with one failure record each. A failed batch is
/// data, not an error; only store trouble propagates.
async fn run_batch(
    store: &Arc<dyn StateStore>,
    backend: &AggregateClient,
    job_id: &str,
    owner_id: &str,
    batch_number: usize,
    batch: Vec<Value>,
    state_ttl: Duration,
) -> Result<(), EngineError> {
    let job_key = keys::job_key(job_id);
    let size = batch.len() as i64;

    match backend.send_batch(owner_id, &batch).await {
        Ok(()) => {
            store.hash_incr(&job_key, "processed", size).await?;
            debug!(job_id = %job_id, batch = batch_number, size, "Batch processed");
        }
        Err(batch_err) => {
            warn!(
                job_id = %job_id,
                batch = batch_number,
                size,
                kind = batch_err.kind.as_str(),
                error = %batch_err.message,
                "Batch failed"
            );

            let failure_key = keys::failure_key(job_id);
            let timestamp = Utc::now();
            for (index_in_batch, object) in batch.iter().enumerate() {
                let record = FailureRecord {
                    job_id: job_id.to_string(),
                    batch_number,
                    index_in_batch,
                    object: object.clone(),
                    error_message: batch_err.message.clone(),
                    error_kind: batch_err.kind,
                    timestamp,
                };
                let line = serde_json::to_string(&record)
                    .map_err(|e| EngineError::Corrupt(e.to_string()))?;
                store.list_push(&failure_key, line).await?;
            }
            store.expire(&failure_key, state_ttl).await?;
            store.hash_incr(&job_key, "failed", size).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::storage::MemoryStore;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn engine_with_backend(server: &MockServer) -> (Arc<BatchEngine>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let backend = AggregateClient::new(&BackendConfig {
            import_url: format!("{}/aggregate/import", server.uri()),
            timeout_secs: 5,
            client_cert_path: None,
            client_key_path: None,
        })
        .unwrap();
        let config = ImportConfig {
            batch_start_delay_ms: 0,
            ..ImportConfig::default()
        };
        let engine = Arc::new(BatchEngine::new(store.clone() as Arc<dyn StateStore>, backend, config));
        (engine, store)
    }

    async fn seed_job(store: &MemoryStore, job: &ImportJob) {
        store
            .hash_set(&keys::job_key(&job.job_id), &job.to_fields())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_terminal_job_is_a_no_op() {
        let server = MockServer::start().await;
        // Any request would violate the entry guard.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (engine, store) = engine_with_backend(&server).await;
        let mut job = ImportJob::new("job-1".to_string(), "owner-1".to_string(), 10, 1);
        job.status = JobStatus::Completed;
        seed_job(&store, &job).await;

        engine.run("job-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_job_is_an_error() {
        let server = MockServer::start().await;
        let (engine, _store) = engine_with_backend(&server).await;

        assert!(matches!(
            engine.run("missing").await,
            Err(EngineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_receiving_job_is_not_processed() {
        let server = MockServer::start().await;
        let (engine, store) = engine_with_backend(&server).await;

        let job = ImportJob::new("job-1".to_string(), "owner-1".to_string(), 10, 2);
        seed_job(&store, &job).await;

        assert!(matches!(
            engine.run("job-1").await,
            Err(EngineError::NotReady { .. })
        ));

        // An early trigger must not kill the job.
        let fields = store.hash_get_all(&keys::job_key("job-1")).await.unwrap().unwrap();
        let job = ImportJob::from_fields(&fields).unwrap();
        assert_eq!(job.status, JobStatus::Receiving);
    }

    #[tokio::test]
    async fn test_missing_owner_marks_job_failed() {
        let server = MockServer::start().await;
        let (engine, store) = engine_with_backend(&server).await;

        let mut job = ImportJob::new("job-1".to_string(), String::new(), 1, 1);
        job.status = JobStatus::Pending;
        job.received_chunks = 1;
        seed_job(&store, &job).await;
        store
            .put(&keys::chunk_key("job-1", 0), "[{\"id\":1}]".to_string())
            .await
            .unwrap();

        assert!(matches!(
            engine.run("job-1").await,
            Err(EngineError::MissingOwner(_))
        ));

        let fields = store.hash_get_all(&keys::job_key("job-1")).await.unwrap().unwrap();
        let job = ImportJob::from_fields(&fields).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
        // Chunks survive an orchestration failure for a later re-trigger.
        assert!(store
            .get(&keys::chunk_key("job-1", 0))
            .await
            .unwrap()
            .is_some());
    }
}
