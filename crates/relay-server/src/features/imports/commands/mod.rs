//! Write operations for the import pipeline

pub mod cleanup;
pub mod retry;
pub mod submit_chunk;

pub use cleanup::CleanupResponse;
pub use retry::{RetryCommand, RetryResponse};
pub use submit_chunk::{SubmitChunkRequest, SubmitChunkResponse};
