//! Order repository trait.
//!
//! Persistence is an external collaborator; this trait is the contract the
//! lifecycle coordinator consumes. Implemented by adapters (document store,
//! in-memory).

use async_trait::async_trait;

use super::errors::OrderError;
use super::order::Order;
use super::status::OrderStatus;
use crate::domain::shared::{ClientId, InstrumentId, OrderId};

/// Filter for listing orders.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Restrict to one trading account.
    pub client_id: Option<ClientId>,
    /// Restrict to one instrument.
    pub instrument: Option<InstrumentId>,
    /// Restrict to one status.
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// Whether an order matches this filter.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(client_id) = &self.client_id
            && order.client_id() != client_id
        {
            return false;
        }
        if let Some(instrument) = &self.instrument
            && order.instrument() != instrument
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status() != status
        {
            return false;
        }
        true
    }
}

/// Repository contract for order persistence.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns error if persistence fails.
    async fn create(&self, order: &Order) -> Result<(), OrderError>;

    /// Find an order by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn get_by_id(&self, id: &OrderId) -> Result<Option<Order>, OrderError>;

    /// List orders matching `filter`, with `offset`/`limit` paging.
    ///
    /// Returns the page of orders plus the total matching count.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn get_all(
        &self,
        filter: &OrderFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Order>, u64), OrderError>;

    /// Update an existing order.
    ///
    /// # Errors
    ///
    /// Returns error if the order does not exist or persistence fails.
    async fn update(&self, order: &Order) -> Result<(), OrderError>;

    /// Delete an order by id (administrative; bypasses lifecycle rules).
    ///
    /// # Errors
    ///
    /// Returns error if persistence fails.
    async fn delete(&self, id: &OrderId) -> Result<(), OrderError>;
}
