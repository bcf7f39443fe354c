//! Retry policy with exponential backoff.
//!
//! # Retryable errors
//!
//! Only errors classified retryable by [`ClassifyError::is_retryable`]
//! (transient transport failures) are retried. Validation errors, broker
//! rejections, auth failures, and rate limiting all surface immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ClassifyError;

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the inter-attempt delay.
    pub max_delay: Duration,
    /// Multiplicative backoff factor.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Retry executor for a fixed configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from a configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration this policy runs with.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    ///
    /// `op` is invoked at most `max_retries + 1` times; exactly once if the
    /// first attempt succeeds or fails non-retryably. The inter-attempt
    /// sleep is preempted by `cancel`, which short-circuits with the
    /// cancellation error kind instead of the attempt's error.
    ///
    /// # Errors
    ///
    /// The final attempt's error is returned verbatim when retries are
    /// exhausted.
    pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
    where
        E: ClassifyError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut delay = self.config.initial_delay;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(E::cancelled());
            }
            attempt += 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= max_attempts || !error.is_retryable() {
                        return Err(error);
                    }
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(E::cancelled()),
                        () = tokio::time::sleep(delay) => {}
                    }
                    delay = next_delay(delay, self.config.multiplier, self.config.max_delay);
                }
            }
        }
    }
}

/// Compute `min(delay * multiplier, max_delay)`.
fn next_delay(delay: Duration, multiplier: f64, max_delay: Duration) -> Duration {
    Duration::from_secs_f64((delay.as_secs_f64() * multiplier).min(max_delay.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::super::tests::TestError;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_invokes_once() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = policy(3)
            .run(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_invokes_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = policy(3)
            .run(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Rejected) }
            })
            .await;

        assert_eq!(result, Err(TestError::Rejected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = policy(3)
            .run(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::RateLimited) }
            })
            .await;

        assert_eq!(result, Err(TestError::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = policy(3)
            .run(&CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TestError::Transport("connection reset".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error_verbatim() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = policy(3)
            .run(&CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(TestError::Transport(format!("attempt {n}"))) }
            })
            .await;

        // max_retries + 1 invocations, final error surfaced as-is.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result, Err(TestError::Transport("attempt 4".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            multiplier: 2.0,
        });
        let start = Instant::now();
        let result: Result<(), TestError> = policy
            .run(&CancellationToken::new(), || async {
                Err(TestError::Transport("down".to_string()))
            })
            .await;
        assert!(result.is_err());

        // 500ms + 1000ms + 1500ms (capped) of virtual sleep.
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_preempts_the_sleep() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            child.cancel();
        });

        let result: Result<(), TestError> = policy(5)
            .run(&cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transport("down".to_string())) }
            })
            .await;

        // Cancelled during the first 500ms backoff sleep.
        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_token_skips_the_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), TestError> = policy(3)
            .run(&cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn next_delay_caps_at_max() {
        let d = next_delay(Duration::from_secs(20), 2.0, Duration::from_secs(30));
        assert_eq!(d, Duration::from_secs(30));

        let d = next_delay(Duration::from_millis(500), 2.0, Duration::from_secs(30));
        assert_eq!(d, Duration::from_secs(1));
    }
}
