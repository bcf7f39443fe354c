//! Broker error taxonomy.

use thiserror::Error;

use crate::resilience::ClassifyError;

/// Errors from broker adapters and their resilience wrapping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// No session established; login required.
    #[error("not authenticated: login required")]
    Unauthenticated,

    /// The session expired and automatic re-login was not possible.
    #[error("session expired")]
    SessionExpired,

    /// Network or connection failure (retryable).
    #[error("transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Broker-imposed rate limiting. Not retried with backoff and not
    /// counted toward the circuit-breaker failure threshold.
    #[error("rate limited by broker")]
    RateLimited {
        /// Suggested retry delay in seconds, when the broker provides one.
        retry_after_secs: Option<u64>,
    },

    /// Circuit open: failing fast without attempting the call.
    #[error("{service} unavailable: circuit open")]
    Unavailable {
        /// The broker connection whose circuit is open.
        service: String,
    },

    /// Order rejected by the broker; the reason is passed through verbatim.
    #[error("order rejected: {reason}")]
    Rejected {
        /// Broker-reported rejection reason.
        reason: String,
    },

    /// Order not found at the broker.
    #[error("order not found: {order_id}")]
    NotFound {
        /// The missing order id.
        order_id: String,
    },

    /// The broker responded with something we could not interpret.
    #[error("invalid broker response: {message}")]
    InvalidResponse {
        /// What failed to parse.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl BrokerError {
    /// Shorthand for a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Shorthand for an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Map a `reqwest` transport failure into the taxonomy.
    ///
    /// Anything that never produced an HTTP status (timeouts, connection
    /// resets, DNS failures) is a retryable transport error; response
    /// decoding failures are not.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_decode() {
            Self::invalid_response(error.to_string())
        } else {
            Self::transport(error.to_string())
        }
    }
}

impl ClassifyError for BrokerError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn cancelled() -> Self {
        Self::Cancelled
    }

    fn unavailable(service: &str) -> Self {
        Self::Unavailable {
            service: service.to_string(),
        }
    }
}
