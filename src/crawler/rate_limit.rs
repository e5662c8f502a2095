//! Per-key token bucket admission control
//!
//! Each key (a host, normally) owns a continuously refilling bucket. Every admission check
//! refills by `elapsed * rate / per`, caps at capacity, then debits if enough tokens exist.
//! The read-refill-debit sequence runs under one lock, so concurrent fetches for the same
//! host never over-admit.

use crate::config::CrawlerConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

/// Poll interval for [`RateLimiter::acquire`]
const ACQUIRE_POLL: Duration = Duration::from_millis(10);

/// Longest refill window accepted from configuration
pub const MAX_REFILL_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSpec {
    /// Maximum tokens held
    pub capacity: f64,
    /// Tokens added per `per`
    pub rate: f64,
    /// Refill window
    pub per: Duration,
}

impl BucketSpec {
    pub fn new(capacity: f64, rate: f64, per: Duration) -> Self {
        Self {
            capacity,
            rate,
            per,
        }
    }

    /// Per-host bucket described by the `[crawler]` section
    ///
    /// A refill window that does not fit a [`Duration`] (or exceeds a day) is clamped to
    /// [`MAX_REFILL_WINDOW`].
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let per = Duration::try_from_secs_f64(config.rate_per_secs)
            .unwrap_or(MAX_REFILL_WINDOW)
            .min(MAX_REFILL_WINDOW);
        Self::new(config.rate_capacity, config.rate_tokens, per)
    }

    /// Tokens refilled per second
    pub fn tokens_per_sec(&self) -> f64 {
        let per = self.per.as_secs_f64();
        if per <= 0.0 {
            f64::INFINITY
        } else {
            self.rate / per
        }
    }
}

/// Token bucket state for one key
#[derive(Debug, Clone)]
pub struct TokenBucket {
    spec: BucketSpec,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket
    pub fn new(spec: BucketSpec, now: Instant) -> Self {
        Self {
            spec,
            tokens: spec.capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.spec.tokens_per_sec()).min(self.spec.capacity);
        self.last_refill = now;
    }

    /// Refills as of `now` and debits `cost` if available
    pub fn try_take(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn spec(&self) -> BucketSpec {
        self.spec
    }

    /// Changes parameters, keeping current tokens (capped to the new capacity)
    fn respec(&mut self, spec: BucketSpec, now: Instant) {
        self.refill(now);
        self.spec = spec;
        self.tokens = self.tokens.min(spec.capacity);
    }
}

/// Keyed token buckets sharing a default spec
#[derive(Debug)]
pub struct RateLimiter {
    default_spec: BucketSpec,
    buckets: Mutex<HashMap<String, TokenBucket>>,
    /// Per-key queue for [`RateLimiter::acquire`]; tokio's mutex hands out the lock in
    /// arrival order
    queues: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RateLimiter {
    pub fn new(default_spec: BucketSpec) -> Self {
        Self {
            default_spec,
            buckets: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until `cost` tokens are available for `key`, then debits them
    ///
    /// Waiters on the same key are served first come, first served; the head of the queue
    /// retries on a fixed short interval. Never fails.
    ///
    /// # Arguments
    ///
    /// * `key` - Bucket key, normally [`crate::url::host_key`]
    /// * `cost` - Tokens to debit
    pub async fn acquire(&self, key: &str, cost: f64) {
        let queue = Arc::clone(
            self.queues
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key.to_string())
                .or_default(),
        );
        let _turn = queue.lock().await;

        let mut waited = false;
        while !self.try_acquire(key, cost) {
            if !waited {
                tracing::debug!(key, cost, "rate limited, waiting for tokens");
                waited = true;
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    /// Debits `cost` tokens for `key` if available right now
    pub fn try_acquire(&self, key: &str, cost: f64) -> bool {
        self.try_acquire_at(key, cost, Instant::now())
    }

    /// [`RateLimiter::try_acquire`] as of an explicit instant
    pub fn try_acquire_at(&self, key: &str, cost: f64, now: Instant) -> bool {
        let mut buckets = self.lock();
        buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.default_spec, now))
            .try_take(cost, now)
    }

    /// Overrides the bucket parameters for `key`
    pub fn set_spec(&self, key: &str, spec: BucketSpec) {
        let now = Instant::now();
        let mut buckets = self.lock();
        match buckets.get_mut(key) {
            Some(bucket) => bucket.respec(spec, now),
            None => {
                buckets.insert(key.to_string(), TokenBucket::new(spec, now));
            }
        }
    }

    /// Slows `key` down to one request per `delay` when that is stricter than its current spec
    ///
    /// Used for robots.txt `Crawl-delay`.
    pub fn apply_crawl_delay(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let delayed = BucketSpec::new(1.0, 1.0, delay);
        let current = self.spec_for(key);
        let tightened = if delayed.tokens_per_sec() < current.tokens_per_sec() {
            delayed
        } else {
            // Keep the stricter configured rate, but no bursts
            BucketSpec {
                capacity: 1.0,
                ..current
            }
        };
        if tightened != current {
            tracing::debug!(key, delay_ms = delay.as_millis() as u64, "applying crawl-delay");
            self.set_spec(key, tightened);
        }
    }

    /// Effective parameters for `key`
    pub fn spec_for(&self, key: &str) -> BucketSpec {
        self.lock()
            .get(key)
            .map(TokenBucket::spec)
            .unwrap_or(self.default_spec)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TokenBucket>> {
        // A panic while holding the lock cannot leave a bucket half-updated
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
