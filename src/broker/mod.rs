//! Broker capability contract and adapters.
//!
//! [`BrokerClient`] is the single polymorphic interface every backend
//! implements. Calling code holds an `Arc<dyn BrokerClient>` built by the
//! [`factory`] and never learns which backend it is talking to.

pub mod error;
pub mod factory;
pub mod simulator;
pub mod stream;
pub mod types;
pub mod xts;
pub mod zerodha;

pub use error::BrokerError;
pub use simulator::{SimulatedBroker, SimulatorConfig};
pub use stream::{QuoteSource, QuoteStream, QuoteStreamer, StreamConfig};
pub use types::{
    Credentials, Holding, ModifyOrderRequest, OrderBook, OrderRequest, OrderResponse, Position,
    Quote, Session, SessionStore,
};

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::shared::{BrokerOrderId, ClientId};

/// Capability contract implemented by every broker adapter.
///
/// Methods are safe to call concurrently on the same adapter instance once
/// `login` has completed. Calling any order or portfolio method before a
/// valid session exists fails with [`BrokerError::Unauthenticated`] without
/// attempting the network call; a session found expired on use triggers one
/// automatic re-login with the remembered credentials.
///
/// Every outbound call is wrapped by the adapter's own resilience stack
/// (rate limiter, circuit breaker, retry loop) and honors `cancel` at each
/// suspension point.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Authenticate and establish a session.
    async fn login(
        &self,
        cancel: &CancellationToken,
        credentials: &Credentials,
    ) -> Result<Session, BrokerError>;

    /// Invalidate the current session.
    async fn logout(&self, cancel: &CancellationToken) -> Result<(), BrokerError>;

    /// Submit a new order.
    async fn place_order(
        &self,
        cancel: &CancellationToken,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BrokerError>;

    /// Modify a working order.
    async fn modify_order(
        &self,
        cancel: &CancellationToken,
        request: &ModifyOrderRequest,
    ) -> Result<OrderResponse, BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(
        &self,
        cancel: &CancellationToken,
        order_id: &BrokerOrderId,
        client_id: &ClientId,
    ) -> Result<OrderResponse, BrokerError>;

    /// Fetch the day's order book for an account.
    async fn order_book(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<OrderBook, BrokerError>;

    /// Fetch open positions for an account.
    async fn positions(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<Vec<Position>, BrokerError>;

    /// Fetch holdings for an account.
    async fn holdings(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<Vec<Holding>, BrokerError>;

    /// Fetch quote snapshots for a set of symbols.
    async fn quotes(
        &self,
        cancel: &CancellationToken,
        symbols: &[String],
    ) -> Result<HashMap<String, Quote>, BrokerError>;

    /// Subscribe to a live quote stream for the given symbols.
    ///
    /// The stream is unbounded and restartable: if the underlying feed
    /// drops, the adapter resubscribes with backoff until
    /// `unsubscribe_quotes` removes the symbols or the adapter shuts down.
    fn subscribe_quotes(&self, symbols: &[String]) -> Result<QuoteStream, BrokerError>;

    /// Stop streaming the given symbols.
    fn unsubscribe_quotes(&self, symbols: &[String]) -> Result<(), BrokerError>;
}
