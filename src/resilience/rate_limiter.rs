//! Token-bucket rate limiter.
//!
//! One limiter per broker connection, never shared across adapters. Tokens
//! accrue fractionally at `rate` per second up to `burst`, refilled lazily
//! from elapsed monotonic time on each admission check.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ClassifyError;

/// Token-bucket configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Sustained admission rate, tokens per second.
    pub rate: f64,
    /// Bucket capacity (maximum burst).
    pub burst: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rate: 5.0,
            burst: 10.0,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter for one broker connection.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        // Guard against a zero/negative rate from config; 1/rate is the
        // polling interval.
        let rate = config.rate.max(0.001);
        let burst = config.burst.max(1.0);
        Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Consume one token if at least one is available.
    #[must_use]
    pub fn allow(&self) -> bool {
        let mut bucket = self.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, polling every `1/rate` seconds.
    ///
    /// # Errors
    ///
    /// Returns the cancellation error kind if `cancel` fires before a token
    /// becomes available.
    pub async fn wait<E: ClassifyError>(&self, cancel: &CancellationToken) -> Result<(), E> {
        let interval = Duration::from_secs_f64(1.0 / self.rate);
        loop {
            if cancel.is_cancelled() {
                return Err(E::cancelled());
            }
            if self.allow() {
                return Ok(());
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(E::cancelled()),
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Tokens currently in the bucket (after a lazy refill).
    #[must_use]
    pub fn available(&self) -> f64 {
        let mut bucket = self.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        bucket.last_refill = now;
        bucket.tokens
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        self.bucket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Backdate the last refill, simulating elapsed wall time.
    #[cfg(test)]
    fn rewind(&self, by: Duration) {
        let mut bucket = self.lock();
        bucket.last_refill -= by;
    }

    /// Drain the bucket to exactly `tokens`.
    #[cfg(test)]
    fn set_tokens(&self, tokens: f64) {
        let mut bucket = self.lock();
        bucket.tokens = tokens;
        bucket.last_refill = Instant::now();
    }
}
