//! Order lifecycle coordinator.
//!
//! Validates and applies state transitions on top of repository reads and
//! writes, independent of which broker executed the order. Mutations for one
//! order id are serialized through a per-id async lock, so there is at most
//! one in-flight update/cancel per order; no global ordering across ids is
//! promised.

mod pagination;

pub use pagination::{Pagination, sanitize};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerClient, BrokerError, ModifyOrderRequest, OrderRequest};
use crate::config::CoordinatorSettings;
use crate::domain::orders::{Order, OrderDraft, OrderError, OrderFilter, OrderRepository, OrderStatus};
use crate::domain::shared::{BrokerOrderId, ExchangeOrderId, OrderId};

/// Fields of a live order the caller may change.
#[derive(Debug, Clone, Default)]
pub struct UpdateOrderRequest {
    /// New quantity, if changing.
    pub quantity: Option<u64>,
    /// New limit price, if changing.
    pub limit_price: Option<Decimal>,
    /// New stop price, if changing.
    pub stop_price: Option<Decimal>,
}

/// Broker-reported progress applied to a tracked order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Broker-assigned order id, when newly learned.
    pub broker_order_id: Option<BrokerOrderId>,
    /// Exchange-assigned order id, when newly learned.
    pub exchange_order_id: Option<ExchangeOrderId>,
    /// Cumulative filled quantity.
    pub cumulative_filled: Option<u64>,
    /// Broker rejection reason, passed through verbatim.
    pub rejection_reason: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct OrderPage {
    /// Orders on this page.
    pub items: Vec<Order>,
    /// Total matching count across all pages.
    pub total: u64,
    /// Sanitized 1-based page number.
    pub page: u64,
    /// Sanitized page size.
    pub page_size: u64,
}

/// Coordinates the order lifecycle between callers, the broker, and the
/// repository.
pub struct OrderCoordinator {
    broker: Arc<dyn BrokerClient>,
    repository: Arc<dyn OrderRepository>,
    settings: CoordinatorSettings,
    mutation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl OrderCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        repository: Arc<dyn OrderRepository>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            broker,
            repository,
            settings,
            mutation_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create an order and submit it to the broker.
    ///
    /// The order is persisted as `Pending` before submission; the broker-side
    /// effect and the stored record are reconciled afterwards (at-least-once,
    /// with the order tag as the duplicate-submission hint).
    ///
    /// # Errors
    ///
    /// Validation errors surface before anything is persisted. A broker
    /// rejection marks the stored order `Rejected` and surfaces the verbatim
    /// reason; transport failures leave the order `Pending` for later
    /// reconciliation.
    pub async fn create_order(
        &self,
        cancel: &CancellationToken,
        draft: OrderDraft,
    ) -> Result<Order, OrderError> {
        let mut order = Order::new(draft)?;
        self.repository.create(&order).await?;

        let request = OrderRequest::from_order(&order);
        match self.broker.place_order(cancel, &request).await {
            Ok(response) => {
                order.assign_broker_ids(response.order_id, response.exchange_order_id);
                match response.status {
                    OrderStatus::Rejected => {
                        order.reject(
                            response
                                .rejection_reason
                                .unwrap_or_else(|| "rejected by broker".to_string()),
                        )?;
                    }
                    _ if response.filled_quantity > 0 => {
                        order.apply_fill(response.filled_quantity)?;
                    }
                    _ => {}
                }
                self.repository.update(&order).await?;
                Ok(order)
            }
            Err(BrokerError::Rejected { reason }) => {
                order.reject(reason.clone())?;
                self.repository.update(&order).await?;
                Err(OrderError::Broker(BrokerError::Rejected { reason }))
            }
            Err(error) => {
                tracing::warn!(
                    order_id = %order.id(),
                    order_tag = %order.order_tag(),
                    error = %error,
                    "Order submission did not complete; record left pending"
                );
                Err(OrderError::Broker(error))
            }
        }
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty id, `NotFound` for an unknown one.
    pub async fn get_order(&self, id: &str) -> Result<Order, OrderError> {
        let id = non_empty_id(id)?;
        self.repository
            .get_by_id(&id)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                order_id: id.into_inner(),
            })
    }

    /// List orders with sanitized pagination.
    ///
    /// # Errors
    ///
    /// Returns repository errors unchanged.
    pub async fn get_orders(
        &self,
        filter: &OrderFilter,
        page: i64,
        page_size: i64,
    ) -> Result<OrderPage, OrderError> {
        let paging = sanitize(page, page_size, &self.settings);
        let (items, total) = self
            .repository
            .get_all(filter, paging.offset, paging.page_size)
            .await?;
        Ok(OrderPage {
            items,
            total,
            page: paging.page,
            page_size: paging.page_size,
        })
    }

    /// Modify a live order, propagating the change to the broker.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty id, `NotFound` for an unknown one,
    /// `StateConflict` ("cannot be updated") for terminal orders, broker
    /// errors when the broker refuses the modification.
    pub async fn update_order(
        &self,
        cancel: &CancellationToken,
        id: &str,
        changes: UpdateOrderRequest,
    ) -> Result<Order, OrderError> {
        let id = non_empty_id(id)?;
        let lock = self.lock_for(id.as_str());
        let _guard = lock.lock().await;

        let mut order = self
            .repository
            .get_by_id(&id)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                order_id: id.to_string(),
            })?;

        // Validates the transition and the new values before any broker call.
        order.modify(changes.quantity, changes.limit_price, changes.stop_price)?;

        if let Some(broker_order_id) = order.broker_order_id() {
            let request = ModifyOrderRequest {
                order_id: broker_order_id.clone(),
                client_id: order.client_id().clone(),
                quantity: changes.quantity,
                limit_price: changes.limit_price,
                stop_price: changes.stop_price,
            };
            self.broker.modify_order(cancel, &request).await?;
        }

        self.repository.update(&order).await?;
        Ok(order)
    }

    /// Cancel a live order, propagating the cancel to the broker.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty id (before any lookup), `NotFound` for an
    /// unknown one, `StateConflict` ("cannot be cancelled") for orders that
    /// are no longer cancelable.
    pub async fn cancel_order(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Order, OrderError> {
        let id = non_empty_id(id)?;
        let lock = self.lock_for(id.as_str());
        let _guard = lock.lock().await;

        let mut order = self
            .repository
            .get_by_id(&id)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                order_id: id.to_string(),
            })?;

        if !order.status().is_cancelable() {
            return Err(OrderError::state_conflict(format!(
                "order {} is {} and cannot be cancelled",
                order.id(),
                order.status()
            )));
        }

        if let Some(broker_order_id) = order.broker_order_id() {
            self.broker
                .cancel_order(cancel, broker_order_id, order.client_id())
                .await?;
        }

        order.cancel()?;
        self.repository.update(&order).await?;
        tracing::info!(order_id = %order.id(), "Order cancelled");
        Ok(order)
    }

    /// Apply broker-reported execution progress to the tracked order.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; `StateConflict`/`Validation` when the
    /// report violates the lifecycle rules.
    pub async fn record_execution(
        &self,
        id: &str,
        report: ExecutionReport,
    ) -> Result<Order, OrderError> {
        let id = non_empty_id(id)?;
        let lock = self.lock_for(id.as_str());
        let _guard = lock.lock().await;

        let mut order = self
            .repository
            .get_by_id(&id)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                order_id: id.to_string(),
            })?;

        if let Some(broker_order_id) = report.broker_order_id {
            order.assign_broker_ids(broker_order_id, report.exchange_order_id);
        }
        if let Some(reason) = report.rejection_reason {
            order.reject(reason)?;
        } else if let Some(filled) = report.cumulative_filled {
            order.apply_fill(filled)?;
        }

        self.repository.update(&order).await?;
        Ok(order)
    }

    /// Administrative delete. Bypasses lifecycle rules.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty id; repository errors unchanged.
    pub async fn delete_order(&self, id: &str) -> Result<(), OrderError> {
        let id = non_empty_id(id)?;
        self.repository.delete(&id).await
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .mutation_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

fn non_empty_id(id: &str) -> Result<OrderId, OrderError> {
    if id.trim().is_empty() {
        return Err(OrderError::validation("order_id", "must not be empty"));
    }
    Ok(OrderId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{SimulatedBroker, SimulatorConfig};
    use crate::domain::orders::{ExchangeSegment, OrderSide, OrderType, ProductType, TimeInForce};
    use crate::domain::shared::{ClientId, InstrumentId};
    use crate::persistence::InMemoryOrderRepository;
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

    async fn coordinator() -> (OrderCoordinator, Arc<SimulatedBroker>) {
        let broker = Arc::new(SimulatedBroker::new(SimulatorConfig::default()));
        broker
            .login(
                &CancellationToken::new(),
                &crate::broker::Credentials::new("key", "secret", "user"),
            )
            .await
            .unwrap();
        let repository = Arc::new(InMemoryOrderRepository::new());
        (
            OrderCoordinator::new(
                Arc::clone(&broker) as Arc<dyn BrokerClient>,
                repository,
                CoordinatorSettings::default(),
            ),
            broker,
        )
    }

    #[tokio::test]
    async fn create_order_submits_and_tracks_broker_id() {
        let (coordinator, _broker) = coordinator().await;
        let cancel = CancellationToken::new();

        let order = coordinator.create_order(&cancel, draft()).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.filled_quantity(), 0);
        assert!(order.broker_order_id().unwrap().as_str().starts_with("SIM-"));

        let stored = coordinator.get_order(order.id().as_str()).await.unwrap();
        assert!(stored.broker_order_id().is_some());
    }

    #[tokio::test]
    async fn create_order_validation_fails_fast() {
        let (coordinator, _broker) = coordinator().await;
        let mut bad = draft();
        bad.quantity = 0;

        let err = coordinator
            .create_order(&CancellationToken::new(), bad)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));
    }

    #[tokio::test]
    async fn get_order_empty_id_is_validation_error() {
        let (coordinator, _broker) = coordinator().await;
        let err = coordinator.get_order("").await.unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));
    }

    #[tokio::test]
    async fn get_order_unknown_is_not_found() {
        let (coordinator, _broker) = coordinator().await;
        let err = coordinator.get_order("missing").await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_empty_id_fails_before_lookup() {
        let (coordinator, _broker) = coordinator().await;
        let err = coordinator
            .cancel_order(&CancellationToken::new(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));
    }

    #[tokio::test]
    async fn cancel_pending_order() {
        let (coordinator, _broker) = coordinator().await;
        let cancel = CancellationToken::new();
        let order = coordinator.create_order(&cancel, draft()).await.unwrap();

        let cancelled = coordinator
            .cancel_order(&cancel, order.id().as_str())
            .await
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_executed_order_is_state_conflict() {
        let (coordinator, broker) = coordinator().await;
        let cancel = CancellationToken::new();
        let order = coordinator.create_order(&cancel, draft()).await.unwrap();

        // Broker executes the full quantity; the report lands on the record.
        let broker_id = order.broker_order_id().unwrap().as_str().to_string();
        broker.fill(&broker_id, 100).unwrap();
        coordinator
            .record_execution(
                order.id().as_str(),
                ExecutionReport {
                    cumulative_filled: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = coordinator
            .cancel_order(&cancel, order.id().as_str())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be cancelled"));
    }

    #[tokio::test]
    async fn update_cancelled_order_is_state_conflict() {
        let (coordinator, _broker) = coordinator().await;
        let cancel = CancellationToken::new();
        let order = coordinator.create_order(&cancel, draft()).await.unwrap();
        coordinator
            .cancel_order(&cancel, order.id().as_str())
            .await
            .unwrap();

        let err = coordinator
            .update_order(
                &cancel,
                order.id().as_str(),
                UpdateOrderRequest {
                    quantity: Some(50),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be updated"));
    }

    #[tokio::test]
    async fn update_live_order_changes_fields() {
        let (coordinator, _broker) = coordinator().await;
        let cancel = CancellationToken::new();
        let order = coordinator.create_order(&cancel, draft()).await.unwrap();

        let updated = coordinator
            .update_order(
                &cancel,
                order.id().as_str(),
                UpdateOrderRequest {
                    quantity: Some(80),
                    limit_price: Some(dec!(2490.0)),
                    stop_price: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.quantity(), 80);
        assert_eq!(updated.limit_price(), Some(dec!(2490.0)));
        assert_eq!(updated.remaining(), 80);
    }

    #[tokio::test]
    async fn partial_fill_keeps_order_cancelable() {
        let (coordinator, broker) = coordinator().await;
        let cancel = CancellationToken::new();
        let order = coordinator.create_order(&cancel, draft()).await.unwrap();

        let broker_id = order.broker_order_id().unwrap().as_str().to_string();
        broker.fill(&broker_id, 40).unwrap();
        let after_fill = coordinator
            .record_execution(
                order.id().as_str(),
                ExecutionReport {
                    cumulative_filled: Some(40),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(after_fill.status(), OrderStatus::PartiallyFilled);
        assert_eq!(after_fill.remaining(), 60);

        let cancelled = coordinator
            .cancel_order(&cancel, order.id().as_str())
            .await
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.filled_quantity(), 40);
    }

    #[tokio::test]
    async fn rejection_report_keeps_reason_verbatim() {
        let (coordinator, _broker) = coordinator().await;
        let cancel = CancellationToken::new();
        let order = coordinator.create_order(&cancel, draft()).await.unwrap();

        let rejected = coordinator
            .record_execution(
                order.id().as_str(),
                ExecutionReport {
                    rejection_reason: Some("RMS:margin shortfall".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.status(), OrderStatus::Rejected);
        assert_eq!(rejected.rejection_reason(), Some("RMS:margin shortfall"));
    }

    #[tokio::test]
    async fn pagination_defaults_match_explicit_values() {
        let (coordinator, _broker) = coordinator().await;
        let cancel = CancellationToken::new();
        for _ in 0..3 {
            coordinator.create_order(&cancel, draft()).await.unwrap();
        }

        let defaulted = coordinator
            .get_orders(&OrderFilter::default(), 0, 0)
            .await
            .unwrap();
        let explicit = coordinator
            .get_orders(&OrderFilter::default(), 1, 50)
            .await
            .unwrap();

        assert_eq!(defaulted.page, explicit.page);
        assert_eq!(defaulted.page_size, explicit.page_size);
        assert_eq!(defaulted.total, explicit.total);
        assert_eq!(defaulted.items.len(), explicit.items.len());
    }

    #[tokio::test]
    async fn pagination_clamps_oversized_page_size() {
        let (coordinator, _broker) = coordinator().await;
        let page = coordinator
            .get_orders(&OrderFilter::default(), 1, 200)
            .await
            .unwrap();
        assert_eq!(page.page_size, 100);
    }

    #[tokio::test]
    async fn pagination_pages_through_results() {
        let (coordinator, _broker) = coordinator().await;
        let cancel = CancellationToken::new();
        for _ in 0..5 {
            coordinator.create_order(&cancel, draft()).await.unwrap();
        }

        let page = coordinator
            .get_orders(&OrderFilter::default(), 2, 2)
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);

        let last = coordinator
            .get_orders(&OrderFilter::default(), 3, 2)
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
    }

    #[tokio::test]
    async fn delete_order_bypasses_lifecycle() {
        let (coordinator, broker) = coordinator().await;
        let cancel = CancellationToken::new();
        let order = coordinator.create_order(&cancel, draft()).await.unwrap();

        let broker_id = order.broker_order_id().unwrap().as_str().to_string();
        broker.fill(&broker_id, 100).unwrap();
        coordinator
            .record_execution(
                order.id().as_str(),
                ExecutionReport {
                    cumulative_filled: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Terminal orders cannot be cancelled, but the administrative
        // delete removes them regardless.
        coordinator.delete_order(order.id().as_str()).await.unwrap();
        let err = coordinator.get_order(order.id().as_str()).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { .. }));
    }
}
