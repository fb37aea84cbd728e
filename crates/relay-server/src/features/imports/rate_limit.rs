//! Per-owner chunk submission rate limiting
//!
//! Windowed counter over the state store: one hash per owner per window,
//! advanced with the store's atomic increment and expired automatically.
//! The verdict carries count, limit, and reset time so the 429 response can
//! tell the caller exactly when to come back.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::storage::{keys, StateStore, StoreError};

/// Outcome of a rate-limit check
#[derive(Debug, Clone)]
pub struct RateLimitVerdict {
    pub allowed: bool,
    pub count: u64,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

/// Sliding-window rate limiter keyed by owner
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Count this submission against `owner_id` and return the verdict
    pub async fn check(&self, owner_id: &str) -> Result<RateLimitVerdict, StoreError> {
        let window_secs = self.config.window_secs as i64;
        let now = Utc::now().timestamp();
        let window_start = now - now.rem_euclid(window_secs);

        let key = keys::rate_limit_key(owner_id, window_start);
        let count = self.store.hash_incr(&key, "count", 1).await?.max(0) as u64;
        // Two windows so a verdict issued at the boundary stays readable.
        self.store
            .expire(&key, Duration::from_secs(self.config.window_secs * 2))
            .await?;

        let reset_at = Utc
            .timestamp_opt(window_start + window_secs, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(RateLimitVerdict {
            allowed: count <= self.config.max_chunks as u64,
            count,
            limit: self.config.max_chunks,
            reset_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn limiter(max_chunks: u32) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryStore::new()),
            RateLimitConfig { max_chunks, window_secs: 60 },
        )
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = limiter(3);

        for expected in 1..=3 {
            let verdict = limiter.check("owner-1").await.unwrap();
            assert!(verdict.allowed);
            assert_eq!(verdict.count, expected);
        }

        let verdict = limiter.check("owner-1").await.unwrap();
        assert!(!verdict.allowed);
        assert_eq!(verdict.count, 4);
        assert_eq!(verdict.limit, 3);
        assert!(verdict.reset_at > Utc::now() - chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_owners_are_independent() {
        let limiter = limiter(1);

        assert!(limiter.check("owner-1").await.unwrap().allowed);
        assert!(!limiter.check("owner-1").await.unwrap().allowed);
        assert!(limiter.check("owner-2").await.unwrap().allowed);
    }
}
