//! Adapter construction from configuration.
//!
//! The factory inspects the configured discriminator and constructs exactly
//! one adapter, returned as `Arc<dyn BrokerClient>` so callers stay
//! broker-agnostic. Unknown discriminators fail construction.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::BrokerClient;
use super::simulator::{SimulatedBroker, SimulatorConfig};
use super::stream::StreamConfig;
use super::xts::{XtsClientAdapter, XtsConfig, XtsProAdapter};
use super::zerodha::{ZerodhaAdapter, ZerodhaConfig};
use crate::config::{Config, ConfigError};

/// Supported broker backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// XTS dealer variant.
    XtsPro,
    /// XTS retail variant.
    XtsClient,
    /// Zerodha (Kite-style) REST.
    Zerodha,
    /// In-process simulator.
    Simulator,
}

impl FromStr for BrokerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "xtspro" => Ok(Self::XtsPro),
            "xtsclient" => Ok(Self::XtsClient),
            "zerodha" | "kite" => Ok(Self::Zerodha),
            "simulator" | "sim" => Ok(Self::Simulator),
            _ => Err(ConfigError::UnknownBroker {
                kind: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::XtsPro => write!(f, "xts_pro"),
            Self::XtsClient => write!(f, "xts_client"),
            Self::Zerodha => write!(f, "zerodha"),
            Self::Simulator => write!(f, "simulator"),
        }
    }
}

/// Construct the configured broker adapter.
///
/// # Errors
///
/// `ConfigError::UnknownBroker` for an unrecognized discriminator;
/// `ConfigError::Broker` when the adapter itself cannot be constructed.
pub fn build_broker(config: &Config) -> Result<Arc<dyn BrokerClient>, ConfigError> {
    let kind: BrokerKind = config.broker.kind.parse()?;
    let stream = StreamConfig {
        poll_interval: Duration::from_millis(config.broker.quote_poll_interval_ms),
        retry: config.resilience.retry.to_retry_config(),
    };
    let timeout = Duration::from_secs(config.broker.timeout_secs);

    tracing::info!(kind = %kind, "Constructing broker adapter");

    match kind {
        BrokerKind::XtsPro | BrokerKind::XtsClient => {
            let mut xts = XtsConfig::new(config.broker.base_url.clone())
                .with_timeout(timeout)
                .with_retry(config.resilience.retry.to_retry_config())
                .with_circuit_breaker(config.resilience.circuit_breaker.to_breaker_config())
                .with_rate_limiter(config.resilience.rate_limiter.to_limiter_config())
                .with_stream(stream);
            xts.source = config.broker.source.clone();

            if kind == BrokerKind::XtsPro {
                Ok(Arc::new(XtsProAdapter::new(xts)?))
            } else {
                Ok(Arc::new(XtsClientAdapter::new(xts)?))
            }
        }
        BrokerKind::Zerodha => {
            let zerodha = ZerodhaConfig::new(config.broker.base_url.clone())
                .with_timeout(timeout)
                .with_retry(config.resilience.retry.to_retry_config())
                .with_circuit_breaker(config.resilience.circuit_breaker.to_breaker_config())
                .with_rate_limiter(config.resilience.rate_limiter.to_limiter_config())
                .with_stream(stream);
            Ok(Arc::new(ZerodhaAdapter::new(zerodha)?))
        }
        BrokerKind::Simulator => Ok(Arc::new(SimulatedBroker::new(SimulatorConfig {
            stream,
            ..Default::default()
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;

    fn config_for(kind: &str) -> Config {
        Config {
            broker: BrokerConfig {
                kind: kind.to_string(),
                base_url: "https://broker.example.com".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn discriminator_parsing_is_forgiving_about_separators() {
        assert_eq!("xts_pro".parse::<BrokerKind>().unwrap(), BrokerKind::XtsPro);
        assert_eq!("XTS-PRO".parse::<BrokerKind>().unwrap(), BrokerKind::XtsPro);
        assert_eq!(
            "xtsclient".parse::<BrokerKind>().unwrap(),
            BrokerKind::XtsClient
        );
        assert_eq!(
            "Zerodha".parse::<BrokerKind>().unwrap(),
            BrokerKind::Zerodha
        );
        assert_eq!(
            "simulator".parse::<BrokerKind>().unwrap(),
            BrokerKind::Simulator
        );
    }

    #[tokio::test]
    async fn unknown_discriminator_fails_construction() {
        let err = build_broker(&config_for("angelone")).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownBroker { .. }));
        assert!(err.to_string().contains("angelone"));
    }

    #[tokio::test]
    async fn each_known_kind_constructs() {
        for kind in ["xts_pro", "xts_client", "zerodha", "simulator"] {
            assert!(build_broker(&config_for(kind)).is_ok(), "kind {kind}");
        }
    }
}
