//! Feature modules implementing the relay API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes. There is currently one slice:
//!
//! - **imports**: chunked ingestion, batch execution, retry, retention

pub mod imports;

use axum::Router;
use std::sync::Arc;

use crate::config::ImportConfig;
use crate::features::imports::{BatchEngine, RateLimiter};
use crate::storage::StateStore;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Durable job/chunk/failure store
    pub store: Arc<dyn StateStore>,
    /// Batch execution engine, triggered fire-and-forget
    pub engine: Arc<BatchEngine>,
    /// Per-owner chunk submission limiter
    pub limiter: RateLimiter,
    /// Pipeline tuning (ceilings, batch size, TTLs)
    pub config: ImportConfig,
}

/// Creates the main API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest("/imports", imports::imports_routes().with_state(state))
}
