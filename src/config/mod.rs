//! Configuration loading and validation.
//!
//! YAML with `${VAR}` / `${VAR:-default}` environment interpolation, loaded
//! once at process start.
//!
//! # Usage
//!
//! ```rust,ignore
//! use broker_gateway::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! let broker = broker_gateway::build_broker(&config)?;
//! ```

mod brokers;
mod resilience;

pub use brokers::BrokerConfig;
pub use resilience::{
    CircuitBreakerSettings, RateLimiterSettings, ResilienceSettings, RetrySettings,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse the YAML.
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("config validation failed: {0}")]
    Validation(String),

    /// Unknown broker discriminator.
    #[error("unknown broker kind '{kind}'")]
    UnknownBroker {
        /// The unrecognized discriminator.
        kind: String,
    },

    /// Adapter construction failed.
    #[error("broker construction failed: {0}")]
    Broker(#[from] crate::broker::BrokerError),
}

/// Coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Page size when the caller does not supply one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    /// Ceiling on caller-supplied page sizes.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

const fn default_page_size() -> u64 {
    50
}
const fn default_max_page_size() -> u64 {
    100
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Broker connection configuration.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Resilience settings for the broker connection.
    #[serde(default)]
    pub resilience: ResilienceSettings,
    /// Coordinator settings.
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}

/// Load configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.broker.kind.trim().is_empty() {
        return Err(ConfigError::Validation(
            "broker.kind must be set".to_string(),
        ));
    }

    if config.broker.kind != "simulator" && config.broker.base_url.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "broker.base_url is required for kind '{}'",
            config.broker.kind
        )));
    }

    if config.broker.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "broker.timeout_secs must be positive".to_string(),
        ));
    }

    if config.resilience.rate_limiter.rate_per_sec <= 0.0 {
        return Err(ConfigError::Validation(
            "resilience.rate_limiter.rate_per_sec must be positive".to_string(),
        ));
    }

    if config.resilience.rate_limiter.burst < 1.0 {
        return Err(ConfigError::Validation(
            "resilience.rate_limiter.burst must be at least 1".to_string(),
        ));
    }

    if config.resilience.circuit_breaker.failure_threshold == 0 {
        return Err(ConfigError::Validation(
            "resilience.circuit_breaker.failure_threshold must be positive".to_string(),
        ));
    }

    if config.coordinator.default_page_size == 0
        || config.coordinator.max_page_size < config.coordinator.default_page_size
    {
        return Err(ConfigError::Validation(
            "coordinator page sizes must satisfy 0 < default <= max".to_string(),
        ));
    }

    Ok(())
}
