//! In-memory order repository.
//!
//! Suitable for testing and development. Not for production use.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::orders::{Order, OrderError, OrderFilter, OrderRepository};
use crate::domain::shared::OrderId;

/// In-memory implementation of `OrderRepository`.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove all orders.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Order>> {
        self.orders
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Order>> {
        self.orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), OrderError> {
        let mut orders = self.write();
        orders.insert(order.id().to_string(), order.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<Option<Order>, OrderError> {
        Ok(self.read().get(id.as_str()).cloned())
    }

    async fn get_all(
        &self,
        filter: &OrderFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Order>, u64), OrderError> {
        let orders = self.read();
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        // Newest first, stable across pages.
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok((items, total))
    }

    async fn update(&self, order: &Order) -> Result<(), OrderError> {
        let mut orders = self.write();
        if !orders.contains_key(order.id().as_str()) {
            return Err(OrderError::NotFound {
                order_id: order.id().to_string(),
            });
        }
        orders.insert(order.id().to_string(), order.clone());
        Ok(())
    }

    async fn delete(&self, id: &OrderId) -> Result<(), OrderError> {
        self.write().remove(id.as_str());
        Ok(())
    }
}
