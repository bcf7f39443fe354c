//! Circuit breaker for broker connections.
//!
//! # State machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures reach threshold)
//! OPEN → HALF_OPEN (reset timeout elapsed since last failure)
//! HALF_OPEN → CLOSED (next call succeeds; failure count resets)
//! HALF_OPEN → OPEN (next call fails)
//! ```
//!
//! Rate-limited and cancelled outcomes count as neither success nor failure.
//! Every breaker instance owns its state behind a single mutex; the
//! OPEN→HALF_OPEN transition happens under the same exclusive lock as the
//! admission check, so there is no unlock/relock window between observing
//! the elapsed timeout and transitioning.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::ClassifyError;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Requests pass through.
    Closed,
    /// Requests are rejected immediately.
    Open,
    /// Trial requests allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before permitting a trial call.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for one broker connection.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Connection name for logging.
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new breaker in the `Closed` state.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Connection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying the time-based OPEN→HALF_OPEN transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.transition_if_due(&mut inner);
        inner.state
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Whether a request is currently permitted.
    ///
    /// Performs the OPEN→HALF_OPEN check-and-transition under one exclusive
    /// lock.
    #[must_use]
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        self.transition_if_due(&mut inner);
        inner.state != CircuitState::Open
    }

    /// Run `op` through the breaker.
    ///
    /// This is the sole entry point combining the admission check, the
    /// invocation, and outcome recording. The outcome of one `execute` call
    /// is recorded exactly once, regardless of how many retries happened
    /// inside `op`.
    ///
    /// # Errors
    ///
    /// Returns `unavailable` without invoking `op` while the circuit is
    /// open; otherwise returns `op`'s result.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: ClassifyError,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(E::unavailable(&self.name));
        }

        let result = op().await;
        match &result {
            Ok(_) => self.record_success(),
            // Rate limiting reflects caller misbehavior and cancellation
            // reflects caller intent; neither says anything about broker
            // health.
            Err(e) if e.is_rate_limited() || e.is_cancelled() => {}
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_failure = None;
                tracing::info!(
                    name = %self.name,
                    from = "HALF_OPEN",
                    to = "CLOSED",
                    "Circuit breaker closed"
                );
            }
            CircuitState::Open => {
                tracing::warn!(name = %self.name, "Success recorded while circuit is OPEN");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        name = %self.name,
                        failures = inner.failure_count,
                        from = "CLOSED",
                        to = "OPEN",
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    name = %self.name,
                    from = "HALF_OPEN",
                    to = "OPEN",
                    "Circuit breaker reopened after failed trial"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// OPEN→HALF_OPEN once the reset timeout has elapsed. Caller holds the
    /// lock.
    fn transition_if_due(&self, inner: &mut BreakerState) {
        if inner.state == CircuitState::Open
            && let Some(last) = inner.last_failure
            && last.elapsed() >= self.config.reset_timeout
        {
            inner.state = CircuitState::HalfOpen;
            tracing::info!(
                name = %self.name,
                from = "OPEN",
                to = "HALF_OPEN",
                "Circuit breaker permitting trial call"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::TestError;
    use super::*;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: reset,
            },
        )
    }

    #[test]
    fn initial_state_is_closed() {
        let b = breaker(3, Duration::from_secs(30));
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.allow_request());
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker(3, Duration::from_secs(30));

        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow_request());
    }

    #[test]
    fn success_resets_consecutive_count() {
        let b = breaker(3, Duration::from_secs(30));

        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();

        // Never reached three in a row.
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn open_transitions_to_half_open_after_reset_timeout() {
        let b = breaker(1, Duration::from_millis(10));
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(b.allow_request());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let b = breaker(1, Duration::from_millis(1));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(b.state(), CircuitState::HalfOpen);

        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let b = breaker(1, Duration::from_millis(1));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(b.state(), CircuitState::HalfOpen);

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow_request());
    }

    #[tokio::test]
    async fn execute_rejects_while_open() {
        let b = breaker(1, Duration::from_secs(60));
        b.record_failure();

        let result: Result<(), TestError> = b.execute(|| async { Ok(()) }).await;
        assert_eq!(result, Err(TestError::Unavailable("test".to_string())));
    }

    #[tokio::test]
    async fn execute_records_one_outcome_per_call() {
        let b = breaker(2, Duration::from_secs(60));

        let _: Result<(), TestError> = b
            .execute(|| async { Err(TestError::Transport("down".to_string())) })
            .await;
        assert_eq!(b.failure_count(), 1);

        let _: Result<(), TestError> = b.execute(|| async { Ok(()) }).await;
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test]
    async fn rate_limited_outcome_is_neither_success_nor_failure() {
        let b = breaker(1, Duration::from_secs(60));

        let _: Result<(), TestError> = b.execute(|| async { Err(TestError::RateLimited) }).await;

        // Not counted as a failure: circuit stays closed.
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_outcome_is_not_counted() {
        let b = breaker(1, Duration::from_secs(60));

        let _: Result<(), TestError> = b.execute(|| async { Err(TestError::Cancelled) }).await;

        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[test]
    fn display_forms() {
        assert_eq!(format!("{}", CircuitState::Closed), "CLOSED");
        assert_eq!(format!("{}", CircuitState::Open), "OPEN");
        assert_eq!(format!("{}", CircuitState::HalfOpen), "HALF_OPEN");
    }

    #[test]
    fn default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_secs(30));
    }
}
