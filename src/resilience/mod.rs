//! Resilience patterns for outbound broker calls.
//!
//! Three broker-agnostic building blocks (retry with exponential backoff, a
//! circuit breaker, and a token-bucket rate limiter) plus the
//! [`ResilienceStack`] that composes them in a fixed order.

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};

use std::fmt::Display;
use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Error classification consumed by the resilience primitives.
///
/// Keeps the primitives independent of any particular broker error type:
/// the retry loop needs to know what is worth retrying, the circuit breaker
/// needs to know what counts toward its failure threshold, and both need to
/// manufacture their own error kinds (cancellation, circuit open).
pub trait ClassifyError: Display + Sized {
    /// Whether the operation may be retried (transient transport failure).
    fn is_retryable(&self) -> bool;

    /// Whether the error reflects broker-imposed rate limiting.
    ///
    /// Rate-limited errors are neither retried with backoff nor counted as
    /// circuit-breaker failures: they reflect caller misbehavior, not broker
    /// unavailability.
    fn is_rate_limited(&self) -> bool;

    /// Whether the error is a caller-initiated cancellation.
    fn is_cancelled(&self) -> bool;

    /// Construct the cancellation error kind.
    fn cancelled() -> Self;

    /// Construct the circuit-open error kind for `service`.
    fn unavailable(service: &str) -> Self;
}

/// Per-connection composition of the resilience primitives.
///
/// Every outbound adapter call runs through `execute`:
/// rate-limiter admission, then the circuit breaker, then the retry loop
/// around the transport call. The retry loop exhausts inside one breaker
/// execution, so repeated transient failures of a single logical call count
/// once toward the breaker threshold.
#[derive(Debug)]
pub struct ResilienceStack {
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl ResilienceStack {
    /// Create a stack for one broker connection.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        retry: RetryConfig,
        breaker: CircuitBreakerConfig,
        limiter: RateLimiterConfig,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(limiter),
            circuit_breaker: CircuitBreaker::new(name, breaker),
            retry: RetryPolicy::new(retry),
        }
    }

    /// Run `op` under the full rate-limit / breaker / retry pipeline.
    ///
    /// # Errors
    ///
    /// Returns the final classified error: `unavailable` while the circuit
    /// is open, `cancelled` if the token fires during any wait, otherwise
    /// whatever the last attempt of `op` produced.
    pub async fn execute<T, E, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T, E>
    where
        E: ClassifyError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.rate_limiter.wait(cancel).await?;
        self.circuit_breaker
            .execute(|| self.retry.run(cancel, op))
            .await
    }

    /// The circuit breaker owned by this stack.
    #[must_use]
    pub const fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// The rate limiter owned by this stack.
    #[must_use]
    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
