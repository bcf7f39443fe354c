//! XTS dealer ("Pro") adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{XtsConfig, XtsCore};
use crate::broker::error::BrokerError;
use crate::broker::stream::QuoteStream;
use crate::broker::types::{
    Credentials, Holding, ModifyOrderRequest, OrderBook, OrderRequest, OrderResponse, Position,
    Quote, Session,
};
use crate::broker::BrokerClient;
use crate::domain::shared::{BrokerOrderId, ClientId};

/// XTS dealer adapter.
///
/// Dealer flows trade on behalf of mapped accounts, so every order and
/// portfolio call addresses an explicit `clientID`.
#[derive(Debug)]
pub struct XtsProAdapter {
    core: XtsCore,
}

impl XtsProAdapter {
    /// Create an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Transport` if the HTTP client cannot be built.
    pub fn new(config: XtsConfig) -> Result<Self, BrokerError> {
        Ok(Self {
            core: XtsCore::new("xts-pro", config, true)?,
        })
    }
}

#[async_trait]
impl BrokerClient for XtsProAdapter {
    async fn login(
        &self,
        cancel: &CancellationToken,
        credentials: &Credentials,
    ) -> Result<Session, BrokerError> {
        self.core.login(cancel, credentials).await
    }

    async fn logout(&self, cancel: &CancellationToken) -> Result<(), BrokerError> {
        self.core.logout(cancel).await
    }

    async fn place_order(
        &self,
        cancel: &CancellationToken,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        self.core.place_order(cancel, request).await
    }

    async fn modify_order(
        &self,
        cancel: &CancellationToken,
        request: &ModifyOrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        self.core.modify_order(cancel, request).await
    }

    async fn cancel_order(
        &self,
        cancel: &CancellationToken,
        order_id: &BrokerOrderId,
        client_id: &ClientId,
    ) -> Result<OrderResponse, BrokerError> {
        self.core.cancel_order(cancel, order_id, client_id).await
    }

    async fn order_book(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<OrderBook, BrokerError> {
        self.core.order_book(cancel, client_id).await
    }

    async fn positions(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<Vec<Position>, BrokerError> {
        self.core.positions(cancel, client_id).await
    }

    async fn holdings(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<Vec<Holding>, BrokerError> {
        self.core.holdings(cancel, client_id).await
    }

    async fn quotes(
        &self,
        cancel: &CancellationToken,
        symbols: &[String],
    ) -> Result<HashMap<String, Quote>, BrokerError> {
        self.core.quotes(cancel, symbols).await
    }

    fn subscribe_quotes(&self, symbols: &[String]) -> Result<QuoteStream, BrokerError> {
        Ok(self.core.subscribe_quotes(symbols))
    }

    fn unsubscribe_quotes(&self, symbols: &[String]) -> Result<(), BrokerError> {
        self.core.unsubscribe_quotes(symbols);
        Ok(())
    }
}
