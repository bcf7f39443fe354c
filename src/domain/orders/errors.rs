//! Order domain errors.

use thiserror::Error;

use crate::broker::BrokerError;

/// Errors surfaced by the order lifecycle and its persistence port.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Bad input from the caller.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// Offending field.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// Unknown order id.
    #[error("order not found: {order_id}")]
    NotFound {
        /// The missing order id.
        order_id: String,
    },

    /// Illegal lifecycle transition.
    #[error("state conflict: {message}")]
    StateConflict {
        /// Why the transition is illegal.
        message: String,
    },

    /// Persistence failure.
    #[error("repository error: {message}")]
    Repository {
        /// Error details from the store.
        message: String,
    },

    /// Broker or transport failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl OrderError {
    /// Shorthand for a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a state-conflict error.
    #[must_use]
    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::StateConflict {
            message: message.into(),
        }
    }
}
