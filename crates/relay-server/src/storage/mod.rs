//! Durable state store for the import pipeline
//!
//! The pipeline keeps no state across invocations: job records, chunk blobs
//! and failure logs all live behind the [`StateStore`] trait. Every mutation
//! the pipeline needs is expressible as an atomic operation on a single key
//! (hash-field increment, list append, key delete), which is what makes the
//! lock-free trigger arbitration in the ingestion protocol sound.
//!
//! [`MemoryStore`] is the in-process implementation the server runs with and
//! the tests exercise; a networked key/value store with the same primitives
//! plugs in at this seam.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod keys;
pub mod memory;

pub use memory::MemoryStore;

/// Errors surfaced by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Wrong value type stored at key {0}")]
    WrongType(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store with hashes, lists and per-key TTL
///
/// All operations are atomic with respect to one another; `hash_incr` in
/// particular must return the post-increment value, since that return value
/// is the sole arbiter of "which chunk submission completed reception".
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Set string fields on a hash, creating the hash if absent
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    /// Read all fields of a hash; `None` if the key does not exist
    async fn hash_get_all(
        &self,
        key: &str,
    ) -> Result<Option<HashMap<String, String>>, StoreError>;

    /// Atomically add `by` to a numeric hash field and return the new value
    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError>;

    /// Store a blob value
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Read a blob value; `None` if the key does not exist
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Append one element to a list, creating the list if absent
    async fn list_push(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Read `limit` elements starting at `offset` (empty for a missing key)
    async fn list_range(
        &self,
        key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Length of a list (0 for a missing key)
    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// Delete a key of any type; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Set or refresh the TTL of an existing key
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Enumerate live keys with the given prefix
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
