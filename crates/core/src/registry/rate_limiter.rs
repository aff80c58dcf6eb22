//! Per-source token bucket rate limiter.
//!
//! Each source gets a bucket sized from its requests-per-minute budget.
//! Buckets for unconfigured sources use the defaults below.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::provider::RateLimit;

const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;
const DEFAULT_BURST: f64 = 5.0;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
    per_second: f64,
    capacity: f64,
}

impl Bucket {
    fn new(limit: &RateLimit) -> Self {
        let capacity = limit.burst_capacity.max(1.0);
        Self {
            tokens: capacity,
            refilled_at: Instant::now(),
            per_second: limit.requests_per_minute.max(1) as f64 / 60.0,
            capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        self.refilled_at = now;
    }

    /// Takes a token, or returns how long until one is available.
    fn take(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / self.per_second))
        }
    }
}

/// Token buckets keyed by source id.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    limits: Mutex<HashMap<String, RateLimit>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
        }
    }

    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_limits(&self) -> MutexGuard<'_, HashMap<String, RateLimit>> {
        self.limits.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter limits mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Sets the budget for a source. An existing bucket is replaced on change.
    pub fn configure(&self, source_id: &str, limit: RateLimit) {
        let changed = {
            let mut limits = self.lock_limits();
            let changed = limits
                .get(source_id)
                .map(|old| {
                    old.requests_per_minute != limit.requests_per_minute
                        || old.burst_capacity != limit.burst_capacity
                })
                .unwrap_or(true);
            limits.insert(source_id.to_string(), limit);
            changed
        };
        if changed {
            self.lock_buckets().remove(source_id);
        }
    }

    fn bucket_for(&self, source_id: &str) -> Bucket {
        let limit = self
            .lock_limits()
            .get(source_id)
            .cloned()
            .unwrap_or(RateLimit {
                requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
                burst_capacity: DEFAULT_BURST,
            });
        Bucket::new(&limit)
    }

    /// Waits until the source has a token.
    pub async fn acquire(&self, source_id: &str) {
        loop {
            let wait = {
                let mut buckets = self.lock_buckets();
                let bucket = buckets
                    .entry(source_id.to_string())
                    .or_insert_with(|| self.bucket_for(source_id));
                match bucket.take() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            debug!("Rate limiter: waiting {:?} for source '{}'", wait, source_id);
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes a token without waiting.
    pub fn try_acquire(&self, source_id: &str) -> bool {
        let mut buckets = self.lock_buckets();
        buckets
            .entry(source_id.to_string())
            .or_insert_with(|| self.bucket_for(source_id))
            .take()
            .is_ok()
    }

    pub fn reset(&self, source_id: &str) {
        self.lock_buckets().remove(source_id);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(requests_per_minute: u32, burst_capacity: f64) -> RateLimit {
        RateLimit {
            requests_per_minute,
            burst_capacity,
        }
    }

    #[test]
    fn test_burst_then_empty() {
        let limiter = RateLimiter::new();
        limiter.configure("evds", limit(30, 3.0));
        for _ in 0..3 {
            assert!(limiter.try_acquire("evds"));
        }
        assert!(!limiter.try_acquire("evds"));
    }

    #[test]
    fn test_refill_over_time() {
        let mut bucket = Bucket::new(&limit(60, 1.0));
        assert!(bucket.take().is_ok());
        assert!(bucket.take().is_err());
        bucket.refilled_at = Instant::now() - Duration::from_secs(2);
        assert!(bucket.take().is_ok());
    }

    #[test]
    fn test_sources_are_isolated() {
        let limiter = RateLimiter::new();
        limiter.configure("a", limit(60, 1.0));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
        assert!(limiter.try_acquire("b"));
    }

    #[test]
    fn test_reconfigure_with_same_limit_keeps_bucket() {
        let limiter = RateLimiter::new();
        limiter.configure("a", limit(60, 1.0));
        assert!(limiter.try_acquire("a"));
        limiter.configure("a", limit(60, 1.0));
        assert!(!limiter.try_acquire("a"));
        limiter.reset("a");
        assert!(limiter.try_acquire("a"));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new();
        limiter.configure("fast", limit(6000, 1.0));
        limiter.acquire("fast").await;
        let start = Instant::now();
        limiter.acquire("fast").await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
