//! Resilience settings as they appear in the configuration file.
//!
//! Durations are carried as integer milliseconds/seconds in YAML and
//! converted into the resilience module's config types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on the inter-attempt delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplicative backoff factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySettings {
    /// Convert to the resilience module's `RetryConfig`.
    #[must_use]
    pub const fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}
const fn default_initial_delay_ms() -> u64 {
    500
}
const fn default_max_delay_ms() -> u64 {
    30_000
}
const fn default_multiplier() -> f64 {
    2.0
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before permitting a trial call.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to the resilience module's `CircuitBreakerConfig`.
    #[must_use]
    pub const fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    5
}
const fn default_reset_timeout_secs() -> u64 {
    30
}

/// Rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterSettings {
    /// Sustained admission rate, requests per second.
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,
    /// Bucket capacity (maximum burst).
    #[serde(default = "default_burst")]
    pub burst: f64,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
        }
    }
}

impl RateLimiterSettings {
    /// Convert to the resilience module's `RateLimiterConfig`.
    #[must_use]
    pub const fn to_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            rate: self.rate_per_sec,
            burst: self.burst,
        }
    }
}

const fn default_rate_per_sec() -> f64 {
    5.0
}
const fn default_burst() -> f64 {
    10.0
}

/// Resilience settings for one broker connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Retry settings.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Circuit breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Rate limiter settings.
    #[serde(default)]
    pub rate_limiter: RateLimiterSettings,
}
