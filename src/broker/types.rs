//! Common request/response model shared by all broker adapters.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::BrokerError;
use crate::domain::orders::{
    ExchangeSegment, Order, OrderSide, OrderStatus, OrderType, ProductType, TimeInForce,
};
use crate::domain::shared::{BrokerOrderId, ClientId, ExchangeOrderId, InstrumentId};

/// Login credentials. Transient: owned by the caller, kept in adapter memory
/// only for automatic re-login, never persisted.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Broker user id.
    pub user_id: String,
    /// Account password, where the backend requires one.
    pub password: Option<String>,
    /// Second factor (TOTP), where the backend requires one.
    pub totp: Option<String>,
}

impl Credentials {
    /// Create key/secret credentials.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            user_id: user_id.into(),
            password: None,
            totp: None,
        }
    }

    /// Attach a password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Attach a second factor.
    #[must_use]
    pub fn with_totp(mut self, totp: impl Into<String>) -> Self {
        self.totp = Some(totp.into());
        self
    }
}

/// An authenticated broker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for subsequent calls.
    pub token: String,
    /// Authenticated user id.
    pub user_id: String,
    /// Expiry as a Unix epoch in seconds.
    pub expires_at: i64,
    /// Refresh token, where the backend issues one.
    pub refresh_token: Option<String>,
}

impl Session {
    /// Whether the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at
    }
}

/// Session slot owned by one adapter instance.
///
/// One session per authenticated adapter at a time; invalidated on logout or
/// found expired on next use.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<Option<Session>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current session.
    pub fn set(&self, session: Session) {
        *self.write() = Some(session);
    }

    /// Drop the current session.
    pub fn clear(&self) {
        *self.write() = None;
    }

    /// The current session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.read().clone()
    }

    /// The current token.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` when no session exists, `SessionExpired` when the
    /// session has lapsed (the caller decides whether to re-login).
    pub fn token(&self) -> Result<String, BrokerError> {
        match self.read().as_ref() {
            None => Err(BrokerError::Unauthenticated),
            Some(session) if session.is_expired() => Err(BrokerError::SessionExpired),
            Some(session) => Ok(session.token.clone()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Request to submit an order to a broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading account.
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
    /// Quantity in lots.
    pub quantity: u64,
    /// Limit price (limit variants).
    pub limit_price: Option<Decimal>,
    /// Stop price (stop variants).
    pub stop_price: Option<Decimal>,
    /// Client-assigned unique tag for duplicate-submission detection after
    /// retries.
    pub order_tag: String,
}

impl OrderRequest {
    /// Build the broker request for a domain order.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            client_id: order.client_id().clone(),
            exchange_segment: order.exchange_segment(),
            instrument: order.instrument().clone(),
            product: order.product(),
            order_type: order.order_type(),
            side: order.side(),
            time_in_force: order.time_in_force(),
            quantity: order.quantity(),
            limit_price: order.limit_price(),
            stop_price: order.stop_price(),
            order_tag: order.order_tag().to_string(),
        }
    }
}

/// Request to modify a working order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyOrderRequest {
    /// Broker-assigned id of the order to modify.
    pub order_id: BrokerOrderId,
    /// Trading account.
    pub client_id: ClientId,
    /// New quantity, if changing.
    pub quantity: Option<u64>,
    /// New limit price, if changing.
    pub limit_price: Option<Decimal>,
    /// New stop price, if changing.
    pub stop_price: Option<Decimal>,
}

/// Broker acknowledgement of an order operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Broker-assigned order id.
    pub order_id: BrokerOrderId,
    /// Exchange-assigned order id, once the order reaches the exchange.
    pub exchange_order_id: Option<ExchangeOrderId>,
    /// Status after the operation.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: u64,
    /// Rejection reason, present when `status` is `Rejected`.
    pub rejection_reason: Option<String>,
}

/// Snapshot of an account's orders at the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Trading account.
    pub client_id: ClientId,
    /// Orders as the broker reports them.
    pub entries: Vec<OrderResponse>,
    /// When the snapshot was taken.
    pub fetched_at: DateTime<Utc>,
}

/// Open position snapshot. Read-only; refreshed wholesale on each fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Exchange segment.
    pub exchange_segment: ExchangeSegment,
    /// Instrument.
    pub instrument: InstrumentId,
    /// Product type.
    pub product: ProductType,
    /// Net quantity (negative when short).
    pub net_quantity: i64,
    /// Total bought quantity.
    pub buy_quantity: u64,
    /// Total sold quantity.
    pub sell_quantity: u64,
    /// Average buy price.
    pub buy_avg_price: Decimal,
    /// Average sell price.
    pub sell_avg_price: Decimal,
    /// Last traded price.
    pub last_price: Decimal,
}

/// Demat holding snapshot. Read-only; refreshed wholesale on each fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    /// Instrument.
    pub instrument: InstrumentId,
    /// Exchange segment.
    pub exchange_segment: ExchangeSegment,
    /// Held quantity.
    pub quantity: u64,
    /// Average acquisition price.
    pub average_price: Decimal,
    /// Last traded price.
    pub last_price: Decimal,
    /// ISIN, where the backend reports it.
    pub isin: Option<String>,
}

/// Market quote snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol the quote is for.
    pub symbol: String,
    /// Last traded price.
    pub last_price: Decimal,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Day volume.
    pub volume: u64,
    /// Quote timestamp.
    pub timestamp: DateTime<Utc>,
}
