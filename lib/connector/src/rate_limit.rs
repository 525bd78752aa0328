//! Per-connector token-bucket rate limiting.
//!
//! Each connector gets a bucket with capacity equal to its configured burst,
//! refilled continuously at the configured rate from elapsed wall-clock time.
//! Acquisition is an atomic check-and-decrement under the bucket's own lock,
//! so concurrent callers observe linearizable updates without serializing
//! across connectors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tollgate_core::ConnectorId;

/// Rate limit configuration for one connector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained refill rate in requests per second.
    pub rate_per_sec: f64,
    /// Bucket capacity: the maximum burst of back-to-back requests.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Creates a new rate limit configuration.
    #[must_use]
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate_per_sec,
            burst,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a reason string if the rate is not positive and finite or the
    /// burst is zero.
    pub fn validate(&self) -> Result<(), String> {
        if !self.rate_per_sec.is_finite() || self.rate_per_sec <= 0.0 {
            return Err(format!(
                "rate_per_sec must be positive, got {}",
                self.rate_per_sec
            ));
        }
        if self.burst == 0 {
            return Err("burst must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Result of a rate limit acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitResult {
    /// A token was consumed; the request may proceed.
    Allowed {
        /// Whole tokens remaining after this acquisition.
        remaining: u32,
    },
    /// The bucket is exhausted.
    Limited {
        /// Estimated wait until one token is available.
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Returns true if a token was consumed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// One connector's bucket. Mutated only under its own mutex.
#[derive(Debug)]
struct TokenBucket {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            tokens: f64::from(config.burst),
            last_refill: Instant::now(),
        }
    }

    /// Refills from elapsed time, capped at capacity.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.config.rate_per_sec)
            .min(f64::from(self.config.burst));
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> RateLimitResult {
        self.refill(Instant::now());

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateLimitResult::Allowed {
                remaining: self.tokens as u32,
            }
        } else {
            let deficit = 1.0 - self.tokens;
            RateLimitResult::Limited {
                retry_after: Duration::from_secs_f64(deficit / self.config.rate_per_sec),
            }
        }
    }
}

/// Per-connector token-bucket admission control.
///
/// Buckets are registered alongside connector creation and removed at purge;
/// the outer map lock is held only to locate a bucket, never across an
/// acquisition.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<ConnectorId, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    /// Creates an empty rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a connector's bucket, starting full.
    pub fn register(&self, id: ConnectorId, config: RateLimitConfig) {
        let mut buckets = self.buckets.write().unwrap();
        buckets.insert(id, Arc::new(Mutex::new(TokenBucket::new(config))));
    }

    /// Updates a connector's configuration, preserving accumulated tokens up
    /// to the new capacity.
    pub fn update(&self, id: ConnectorId, config: RateLimitConfig) {
        let buckets = self.buckets.read().unwrap();
        if let Some(bucket) = buckets.get(&id) {
            let mut bucket = bucket.lock().unwrap();
            bucket.refill(Instant::now());
            bucket.config = config;
            bucket.tokens = bucket.tokens.min(f64::from(config.burst));
        } else {
            drop(buckets);
            self.register(id, config);
        }
    }

    /// Removes a connector's bucket.
    pub fn remove(&self, id: ConnectorId) {
        let mut buckets = self.buckets.write().unwrap();
        buckets.remove(&id);
    }

    /// Attempts to consume one token for the connector.
    ///
    /// Returns `None` when no bucket is registered for the ID (the connector
    /// has been purged). Consumed tokens are never refunded, even if the
    /// downstream call later fails.
    #[must_use]
    pub fn try_acquire(&self, id: ConnectorId) -> Option<RateLimitResult> {
        let bucket = {
            let buckets = self.buckets.read().unwrap();
            buckets.get(&id).cloned()
        };
        bucket.map(|bucket| bucket.lock().unwrap().try_acquire())
    }
}
