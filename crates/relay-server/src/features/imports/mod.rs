//! Import pipeline feature slice
//!
//! Chunked ingestion, batch execution against the aggregate-import backend,
//! failure bookkeeping, retry, and retention. Organized like every feature:
//! `commands/` for writes, `queries/` for reads, `routes.rs` for HTTP
//! wiring, with the domain model and the engine alongside.

pub mod commands;
pub mod engine;
pub mod models;
pub mod queries;
pub mod rate_limit;
pub mod routes;

pub use engine::BatchEngine;
pub use models::{FailureKind, FailureRecord, ImportJob, JobStatus};
pub use rate_limit::RateLimiter;
pub use routes::imports_routes;
