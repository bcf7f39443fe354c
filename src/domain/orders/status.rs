//! Order status in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an order as tracked by the lifecycle coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted, no fills yet.
    Pending,
    /// Some quantity filled, remainder still working.
    PartiallyFilled,
    /// Completely filled.
    Executed,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected by the broker or exchange.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    ///
    /// No field mutation is permitted once a terminal state is reached.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if the order can still be cancelled.
    #[must_use]
    pub const fn is_cancelable(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyFilled)
    }

    /// Returns true if the order can receive fills.
    #[must_use]
    pub const fn can_fill(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Executed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
    }

    #[test]
    fn cancelable_states() {
        assert!(OrderStatus::Pending.is_cancelable());
        assert!(OrderStatus::PartiallyFilled.is_cancelable());
        assert!(!OrderStatus::Executed.is_cancelable());
        assert!(!OrderStatus::Cancelled.is_cancelable());
        assert!(!OrderStatus::Rejected.is_cancelable());
    }

    #[test]
    fn fillable_states() {
        assert!(OrderStatus::Pending.can_fill());
        assert!(OrderStatus::PartiallyFilled.can_fill());
        assert!(!OrderStatus::Executed.can_fill());
    }

    #[test]
    fn display() {
        assert_eq!(
            format!("{}", OrderStatus::PartiallyFilled),
            "PARTIALLY_FILLED"
        );
        assert_eq!(format!("{}", OrderStatus::Pending), "PENDING");
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&OrderStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");

        let parsed: OrderStatus = serde_json::from_str("\"EXECUTED\"").unwrap();
        assert_eq!(parsed, OrderStatus::Executed);
    }
}
