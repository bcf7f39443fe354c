//! Broker connection configuration.

use serde::{Deserialize, Serialize};

use crate::broker::Credentials;

/// Configuration for the broker connection.
///
/// `kind` is the adapter discriminator (`xts_pro`, `xts_client`, `zerodha`,
/// `simulator`); the factory fails construction on anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Adapter discriminator.
    pub kind: String,
    /// API base URL. Unused by the simulator.
    #[serde(default)]
    pub base_url: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret.
    #[serde(default)]
    pub api_secret: String,
    /// Broker user id.
    #[serde(default)]
    pub user_id: String,
    /// Trading account (client code) for dealer flows.
    #[serde(default)]
    pub client_id: String,
    /// Account password, where the backend requires one.
    #[serde(default)]
    pub password: Option<String>,
    /// Login source tag (XTS variants).
    #[serde(default = "default_source")]
    pub source: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Quote poll interval in milliseconds.
    #[serde(default = "default_quote_poll_interval_ms")]
    pub quote_poll_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: "simulator".to_string(),
            base_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            user_id: String::new(),
            client_id: String::new(),
            password: None,
            source: default_source(),
            timeout_secs: default_timeout_secs(),
            quote_poll_interval_ms: default_quote_poll_interval_ms(),
        }
    }
}

impl BrokerConfig {
    /// Build login credentials from the configured bundle.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        let mut credentials = Credentials::new(
            self.api_key.clone(),
            self.api_secret.clone(),
            self.user_id.clone(),
        );
        if let Some(password) = &self.password {
            credentials = credentials.with_password(password.clone());
        }
        credentials
    }
}

fn default_source() -> String {
    "WEBAPI".to_string()
}
const fn default_timeout_secs() -> u64 {
    30
}
const fn default_quote_poll_interval_ms() -> u64 {
    1000
}
