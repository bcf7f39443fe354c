//! Shared domain value objects.

mod identifiers;

pub use identifiers::{BrokerOrderId, ClientId, ExchangeOrderId, InstrumentId, OrderId};
