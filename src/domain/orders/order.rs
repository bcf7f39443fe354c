//! Order aggregate.
//!
//! Quantity invariants: `filled_quantity <= quantity` always, and
//! `remaining() == quantity - filled_quantity`. All mutation goes through
//! methods that validate the lifecycle transition first.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::state_machine::OrderStateMachine;
use super::status::OrderStatus;
use super::types::{ExchangeSegment, OrderSide, OrderType, ProductType, TimeInForce};
use crate::domain::shared::{BrokerOrderId, ClientId, ExchangeOrderId, InstrumentId, OrderId};

/// Parameters for creating a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    /// Trading account the order belongs to.
    pub client_id: ClientId,
    /// Exchange segment.
    pub exchange_segment: ExchangeSegment,
    /// Instrument to trade.
    pub instrument: InstrumentId,
    /// Product type.
    pub product: ProductType,
    /// Order type.
    pub order_type: OrderType,
    /// Order side.
    pub side: OrderSide,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Quantity to trade, in lots.
    pub quantity: u64,
    /// Limit price (required for limit variants).
    pub limit_price: Option<Decimal>,
    /// Stop (trigger) price (required for stop variants).
    pub stop_price: Option<Decimal>,
    /// Client-assigned unique tag for duplicate-submission detection.
    /// Generated when absent.
    pub order_tag: Option<String>,
}

impl OrderDraft {
    /// Validate the draft parameters.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` if required parameters are missing or
    /// inconsistent.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.instrument.is_empty() {
            return Err(OrderError::validation("instrument", "must not be empty"));
        }
        if self.client_id.is_empty() {
            return Err(OrderError::validation("client_id", "must not be empty"));
        }
        if self.quantity == 0 {
            return Err(OrderError::validation("quantity", "must be positive"));
        }
        if self.order_type.requires_limit_price() && self.limit_price.is_none() {
            return Err(OrderError::validation(
                "limit_price",
                "required for limit orders",
            ));
        }
        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(OrderError::validation(
                "stop_price",
                "required for stop orders",
            ));
        }
        if let Some(price) = self.limit_price
            && price <= Decimal::ZERO
        {
            return Err(OrderError::validation("limit_price", "must be positive"));
        }
        if let Some(price) = self.stop_price
            && price <= Decimal::ZERO
        {
            return Err(OrderError::validation("stop_price", "must be positive"));
        }
        Ok(())
    }
}

/// An order tracked by the lifecycle coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    client_id: ClientId,
    exchange_segment: ExchangeSegment,
    instrument: InstrumentId,
    product: ProductType,
    order_type: OrderType,
    side: OrderSide,
    time_in_force: TimeInForce,
    quantity: u64,
    filled_quantity: u64,
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    broker_order_id: Option<BrokerOrderId>,
    exchange_order_id: Option<ExchangeOrderId>,
    order_tag: String,
    status: OrderStatus,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new `Pending` order from a validated draft.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` if the draft is invalid.
    pub fn new(draft: OrderDraft) -> Result<Self, OrderError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: OrderId::generate(),
            client_id: draft.client_id,
            exchange_segment: draft.exchange_segment,
            instrument: draft.instrument,
            product: draft.product,
            order_type: draft.order_type,
            side: draft.side,
            time_in_force: draft.time_in_force,
            quantity: draft.quantity,
            filled_quantity: 0,
            limit_price: draft.limit_price,
            stop_price: draft.stop_price,
            broker_order_id: None,
            exchange_order_id: None,
            order_tag: draft
                .order_tag
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            status: OrderStatus::Pending,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Order id.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Trading account.
    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Exchange segment.
    #[must_use]
    pub const fn exchange_segment(&self) -> ExchangeSegment {
        self.exchange_segment
    }

    /// Instrument.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    /// Product type.
    #[must_use]
    pub const fn product(&self) -> ProductType {
        self.product
    }

    /// Order type.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Order side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Time in force.
    #[must_use]
    pub const fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    /// Ordered quantity.
    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Cumulative filled quantity.
    #[must_use]
    pub const fn filled_quantity(&self) -> u64 {
        self.filled_quantity
    }

    /// Remaining quantity (`quantity - filled_quantity`).
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.quantity - self.filled_quantity
    }

    /// Limit price, if any.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Stop price, if any.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Broker-assigned order id, once known.
    #[must_use]
    pub const fn broker_order_id(&self) -> Option<&BrokerOrderId> {
        self.broker_order_id.as_ref()
    }

    /// Exchange-assigned order id, once known.
    #[must_use]
    pub const fn exchange_order_id(&self) -> Option<&ExchangeOrderId> {
        self.exchange_order_id.as_ref()
    }

    /// Client-assigned idempotency tag.
    #[must_use]
    pub fn order_tag(&self) -> &str {
        &self.order_tag
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Broker rejection reason, if rejected.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last-update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Record the broker-assigned identifiers after submission.
    pub fn assign_broker_ids(
        &mut self,
        broker_order_id: BrokerOrderId,
        exchange_order_id: Option<ExchangeOrderId>,
    ) {
        self.broker_order_id = Some(broker_order_id);
        self.exchange_order_id = exchange_order_id;
        self.touch();
    }

    /// Apply a cumulative fill report.
    ///
    /// `cumulative_filled` is the total filled so far as reported by the
    /// broker, not an increment. Moves the order to `PartiallyFilled` or
    /// `Executed` accordingly.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::StateConflict` if the order cannot receive fills,
    /// or `OrderError::Validation` if the report violates the quantity
    /// invariants.
    pub fn apply_fill(&mut self, cumulative_filled: u64) -> Result<(), OrderError> {
        if cumulative_filled > self.quantity {
            return Err(OrderError::validation(
                "filled_quantity",
                format!(
                    "filled {cumulative_filled} exceeds ordered {}",
                    self.quantity
                ),
            ));
        }
        if cumulative_filled < self.filled_quantity {
            return Err(OrderError::validation(
                "filled_quantity",
                format!(
                    "filled {cumulative_filled} below already-filled {}",
                    self.filled_quantity
                ),
            ));
        }
        let to = if cumulative_filled == self.quantity {
            OrderStatus::Executed
        } else {
            OrderStatus::PartiallyFilled
        };
        OrderStateMachine::validate_transition(self.status, to)?;
        self.filled_quantity = cumulative_filled;
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Cancel the order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::StateConflict` if the order is not in a
    /// cancelable state.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.is_cancelable() {
            return Err(OrderError::state_conflict(format!(
                "order {} is {} and cannot be cancelled",
                self.id, self.status
            )));
        }
        OrderStateMachine::validate_transition(self.status, OrderStatus::Cancelled)?;
        self.status = OrderStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Reject the order with the broker's reason, passed through verbatim.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::StateConflict` unless the order is `Pending`.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, OrderStatus::Rejected)?;
        self.status = OrderStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.touch();
        Ok(())
    }

    /// Modify the mutable fields of a live order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::StateConflict` if the order is terminal, or
    /// `OrderError::Validation` if the new quantity is below what has
    /// already been filled.
    pub fn modify(
        &mut self,
        quantity: Option<u64>,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::state_conflict(format!(
                "order {} is {} and cannot be updated",
                self.id, self.status
            )));
        }
        if let Some(quantity) = quantity {
            if quantity == 0 {
                return Err(OrderError::validation("quantity", "must be positive"));
            }
            if quantity < self.filled_quantity {
                return Err(OrderError::validation(
                    "quantity",
                    format!(
                        "cannot reduce below filled quantity {}",
                        self.filled_quantity
                    ),
                ));
            }
            self.quantity = quantity;
        }
        if let Some(price) = limit_price {
            if price <= Decimal::ZERO {
                return Err(OrderError::validation("limit_price", "must be positive"));
            }
            self.limit_price = Some(price);
        }
        if let Some(price) = stop_price {
            if price <= Decimal::ZERO {
                return Err(OrderError::validation("stop_price", "must be positive"));
            }
            self.stop_price = Some(price);
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft() -> OrderDraft {
        OrderDraft {
            client_id: ClientId::new("CLIENT01"),
            exchange_segment: ExchangeSegment::NseCm,
            instrument: InstrumentId::new("RELIANCE"),
            product: ProductType::Mis,
            order_type: OrderType::Limit,
            side: OrderSide::Buy,
            time_in_force: TimeInForce::Day,
            quantity: 100,
            limit_price: Some(dec!(2500.0)),
            stop_price: None,
            order_tag: None,
        }
    }

    #[test]
    fn new_order_is_pending_with_zero_fill() {
        let order = Order::new(draft()).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.filled_quantity(), 0);
        assert_eq!(order.remaining(), 100);
        assert!(!order.order_tag().is_empty());
    }

    #[test]
    fn draft_without_limit_price_is_invalid() {
        let mut d = draft();
        d.limit_price = None;
        let err = Order::new(d).unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));
    }

    #[test]
    fn draft_with_zero_quantity_is_invalid() {
        let mut d = draft();
        d.quantity = 0;
        assert!(Order::new(d).is_err());
    }

    #[test]
    fn stop_order_requires_trigger_price() {
        let mut d = draft();
        d.order_type = OrderType::StopLimit;
        d.stop_price = None;
        let err = Order::new(d).unwrap_err();
        assert!(err.to_string().contains("stop_price"));
    }

    #[test]
    fn partial_fill_then_execute() {
        let mut order = Order::new(draft()).unwrap();
        order.apply_fill(40).unwrap();
        assert_eq!(order.status(), OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining(), 60);

        order.apply_fill(100).unwrap();
        assert_eq!(order.status(), OrderStatus::Executed);
        assert_eq!(order.remaining(), 0);
    }

    #[test]
    fn fill_cannot_exceed_ordered_quantity() {
        let mut order = Order::new(draft()).unwrap();
        let err = order.apply_fill(101).unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));
        assert_eq!(order.filled_quantity(), 0);
    }

    #[test]
    fn fill_cannot_regress() {
        let mut order = Order::new(draft()).unwrap();
        order.apply_fill(50).unwrap();
        assert!(order.apply_fill(40).is_err());
    }

    #[test]
    fn cancel_pending_order() {
        let mut order = Order::new(draft()).unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn cancel_executed_order_is_conflict() {
        let mut order = Order::new(draft()).unwrap();
        order.apply_fill(100).unwrap();
        let err = order.cancel().unwrap_err();
        assert!(err.to_string().contains("cannot be cancelled"));
    }

    #[test]
    fn modify_cancelled_order_is_conflict() {
        let mut order = Order::new(draft()).unwrap();
        order.cancel().unwrap();
        let err = order.modify(Some(50), None, None).unwrap_err();
        assert!(err.to_string().contains("cannot be updated"));
    }

    #[test]
    fn modify_cannot_reduce_below_filled() {
        let mut order = Order::new(draft()).unwrap();
        order.apply_fill(60).unwrap();
        assert!(order.modify(Some(50), None, None).is_err());
        order.modify(Some(80), None, None).unwrap();
        assert_eq!(order.quantity(), 80);
        assert_eq!(order.remaining(), 20);
    }

    #[test]
    fn reject_only_from_pending() {
        let mut order = Order::new(draft()).unwrap();
        order.apply_fill(10).unwrap();
        assert!(order.reject("margin shortfall").is_err());

        let mut fresh = Order::new(draft()).unwrap();
        fresh.reject("margin shortfall").unwrap();
        assert_eq!(fresh.status(), OrderStatus::Rejected);
        assert_eq!(fresh.rejection_reason(), Some("margin shortfall"));
    }

    #[test]
    fn explicit_order_tag_is_kept() {
        let mut d = draft();
        d.order_tag = Some("tag-42".to_string());
        let order = Order::new(d).unwrap();
        assert_eq!(order.order_tag(), "tag-42");
    }

    #[test]
    fn broker_ids_are_recorded() {
        let mut order = Order::new(draft()).unwrap();
        order.assign_broker_ids(
            BrokerOrderId::new("123456"),
            Some(ExchangeOrderId::new("NSE-9")),
        );
        assert_eq!(order.broker_order_id().unwrap().as_str(), "123456");
        assert_eq!(order.exchange_order_id().unwrap().as_str(), "NSE-9");
    }
}
