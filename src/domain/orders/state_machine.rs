//! Order state machine.
//!
//! Validates which status transitions are legal once an order has been
//! submitted to a broker.

use super::errors::OrderError;
use super::status::OrderStatus;

/// Order state machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From Pending
            (OrderStatus::Pending, OrderStatus::PartiallyFilled)
                | (OrderStatus::Pending, OrderStatus::Executed)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                // From PartiallyFilled
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Executed)
                | (OrderStatus::PartiallyFilled, OrderStatus::Cancelled)
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::StateConflict` if the transition is illegal.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::StateConflict {
                message: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Get a human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        match from {
            OrderStatus::Executed => format!("order is executed, cannot transition to {to}"),
            OrderStatus::Cancelled => format!("order is cancelled, cannot transition to {to}"),
            OrderStatus::Rejected => format!("order was rejected, cannot transition to {to}"),
            _ => format!("invalid transition from {from} to {to}"),
        }
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Pending => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Executed,
                OrderStatus::Rejected,
                OrderStatus::Cancelled,
            ],
            OrderStatus::PartiallyFilled => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Executed,
                OrderStatus::Cancelled,
            ],
            // Terminal states
            OrderStatus::Executed | OrderStatus::Cancelled | OrderStatus::Rejected => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions_from_pending() {
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::PartiallyFilled
        ));
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Executed
        ));
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Rejected
        ));
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::Pending,
            OrderStatus::Cancelled
        ));
    }

    #[test]
    fn partial_fill_can_repeat() {
        assert!(OrderStateMachine::is_valid_transition(
            OrderStatus::PartiallyFilled,
            OrderStatus::PartiallyFilled
        ));
    }

    #[test]
    fn partial_fill_cannot_be_rejected() {
        // A broker rejects an order up front, not after it started filling.
        assert!(!OrderStateMachine::is_valid_transition(
            OrderStatus::PartiallyFilled,
            OrderStatus::Rejected
        ));
    }

    #[test]
    fn no_transitions_from_terminal_states() {
        for terminal in [
            OrderStatus::Executed,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ] {
            assert!(OrderStateMachine::valid_next_states(terminal).is_empty());
            for to in [
                OrderStatus::Pending,
                OrderStatus::PartiallyFilled,
                OrderStatus::Executed,
                OrderStatus::Cancelled,
                OrderStatus::Rejected,
            ] {
                assert!(!OrderStateMachine::is_valid_transition(terminal, to));
            }
        }
    }

    #[test]
    fn validate_transition_returns_error_for_invalid() {
        let result =
            OrderStateMachine::validate_transition(OrderStatus::Executed, OrderStatus::Cancelled);
        assert!(result.is_err());
    }

    #[test]
    fn validate_transition_returns_ok_for_valid() {
        let result =
            OrderStateMachine::validate_transition(OrderStatus::Pending, OrderStatus::Executed);
        assert!(result.is_ok());
    }

    #[test]
    fn transition_error_reason_mentions_terminal_state() {
        let reason = OrderStateMachine::transition_error_reason(
            OrderStatus::Cancelled,
            OrderStatus::Executed,
        );
        assert!(reason.contains("cancelled"));
    }

    #[test]
    fn nothing_returns_to_pending() {
        for from in [
            OrderStatus::PartiallyFilled,
            OrderStatus::Executed,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ] {
            assert!(!OrderStateMachine::is_valid_transition(
                from,
                OrderStatus::Pending
            ));
        }
    }
}
