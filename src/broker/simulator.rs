//! In-process simulated broker.
//!
//! A first-class adapter used for development and tests: instant sessions,
//! deterministic order acceptance, random-walk quotes. Fills are driven
//! explicitly through [`SimulatedBroker::fill`] so tests control the
//! lifecycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use super::BrokerClient;
use super::error::BrokerError;
use super::stream::{QuoteSource, QuoteStream, QuoteStreamer, StreamConfig};
use super::types::{
    Credentials, Holding, ModifyOrderRequest, OrderBook, OrderRequest, OrderResponse, Position,
    Quote, Session, SessionStore,
};
use crate::domain::orders::{OrderSide, OrderStatus};
use crate::domain::shared::{BrokerOrderId, ClientId, InstrumentId};

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Quote stream settings.
    pub stream: StreamConfig,
    /// Price new symbols start their walk from.
    pub starting_price: Decimal,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            starting_price: Decimal::new(100, 0),
        }
    }
}

#[derive(Debug)]
struct SimOrder {
    request: OrderRequest,
    response: OrderResponse,
}

#[derive(Debug, Default)]
struct SimState {
    next_order_id: u64,
    orders: HashMap<String, SimOrder>,
    prices: HashMap<String, Decimal>,
}

/// Simulated broker backend.
#[derive(Debug)]
pub struct SimulatedBroker {
    state: Arc<Mutex<SimState>>,
    session: Arc<SessionStore>,
    streamer: QuoteStreamer,
    starting_price: Decimal,
}

impl SimulatedBroker {
    /// Create a simulator.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let state = Arc::new(Mutex::new(SimState::default()));
        let session = Arc::new(SessionStore::new());
        let streamer = QuoteStreamer::new(
            Arc::new(SimQuoteSource {
                state: Arc::clone(&state),
                starting_price: config.starting_price,
            }),
            config.stream,
        );
        Self {
            state,
            session,
            streamer,
            starting_price: config.starting_price,
        }
    }

    /// Apply a cumulative fill to a working order (test/development hook).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order and `Rejected` when the order
    /// can no longer fill.
    pub fn fill(&self, order_id: &str, cumulative_filled: u64) -> Result<(), BrokerError> {
        let mut state = self.lock();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::NotFound {
                order_id: order_id.to_string(),
            })?;

        if !order.response.status.can_fill() {
            return Err(BrokerError::Rejected {
                reason: format!("order {order_id} is {} and cannot fill", order.response.status),
            });
        }
        let quantity = order.request.quantity;
        let filled = cumulative_filled.min(quantity);
        order.response.filled_quantity = filled;
        order.response.status = if filled == quantity {
            OrderStatus::Executed
        } else {
            OrderStatus::PartiallyFilled
        };
        Ok(())
    }

    fn require_session(&self, cancel: &CancellationToken) -> Result<(), BrokerError> {
        if cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }
        self.session.token().map(|_| ())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl BrokerClient for SimulatedBroker {
    async fn login(
        &self,
        cancel: &CancellationToken,
        credentials: &Credentials,
    ) -> Result<Session, BrokerError> {
        if cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            user_id: credentials.user_id.clone(),
            expires_at: Utc::now().timestamp() + 86_400,
            refresh_token: None,
        };
        self.session.set(session.clone());
        tracing::info!(name = "simulator", user_id = %session.user_id, "Broker session established");
        Ok(session)
    }

    async fn logout(&self, cancel: &CancellationToken) -> Result<(), BrokerError> {
        self.require_session(cancel)?;
        self.session.clear();
        Ok(())
    }

    async fn place_order(
        &self,
        cancel: &CancellationToken,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        self.require_session(cancel)?;
        if request.quantity == 0 {
            return Err(BrokerError::Rejected {
                reason: "quantity must be positive".to_string(),
            });
        }

        let mut state = self.lock();
        state.next_order_id += 1;
        let order_id = format!("SIM-{}", state.next_order_id);
        let response = OrderResponse {
            order_id: BrokerOrderId::new(order_id.clone()),
            exchange_order_id: None,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            rejection_reason: None,
        };
        state.orders.insert(
            order_id,
            SimOrder {
                request: request.clone(),
                response: response.clone(),
            },
        );
        Ok(response)
    }

    async fn modify_order(
        &self,
        cancel: &CancellationToken,
        request: &ModifyOrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        self.require_session(cancel)?;
        let mut state = self.lock();
        let order = state
            .orders
            .get_mut(request.order_id.as_str())
            .ok_or_else(|| BrokerError::NotFound {
                order_id: request.order_id.as_str().to_string(),
            })?;

        if order.response.status.is_terminal() {
            return Err(BrokerError::Rejected {
                reason: format!(
                    "order {} is {} and cannot be modified",
                    request.order_id, order.response.status
                ),
            });
        }
        if let Some(quantity) = request.quantity {
            order.request.quantity = quantity;
        }
        if let Some(price) = request.limit_price {
            order.request.limit_price = Some(price);
        }
        if let Some(trigger) = request.stop_price {
            order.request.stop_price = Some(trigger);
        }
        Ok(order.response.clone())
    }

    async fn cancel_order(
        &self,
        cancel: &CancellationToken,
        order_id: &BrokerOrderId,
        _client_id: &ClientId,
    ) -> Result<OrderResponse, BrokerError> {
        self.require_session(cancel)?;
        let mut state = self.lock();
        let order = state
            .orders
            .get_mut(order_id.as_str())
            .ok_or_else(|| BrokerError::NotFound {
                order_id: order_id.as_str().to_string(),
            })?;

        if !order.response.status.is_cancelable() {
            return Err(BrokerError::Rejected {
                reason: format!(
                    "order {order_id} is {} and cannot be cancelled",
                    order.response.status
                ),
            });
        }
        order.response.status = OrderStatus::Cancelled;
        Ok(order.response.clone())
    }

    async fn order_book(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<OrderBook, BrokerError> {
        self.require_session(cancel)?;
        let state = self.lock();
        let entries = state
            .orders
            .values()
            .filter(|order| order.request.client_id == *client_id)
            .map(|order| order.response.clone())
            .collect();
        Ok(OrderBook {
            client_id: client_id.clone(),
            entries,
            fetched_at: Utc::now(),
        })
    }

    async fn positions(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<Vec<Position>, BrokerError> {
        self.require_session(cancel)?;
        let state = self.lock();

        // Net filled quantity per instrument.
        let mut by_instrument: HashMap<String, Position> = HashMap::new();
        for order in state
            .orders
            .values()
            .filter(|o| o.request.client_id == *client_id && o.response.filled_quantity > 0)
        {
            let filled = order.response.filled_quantity;
            let price = order.request.limit_price.unwrap_or(self.starting_price);
            let entry = by_instrument
                .entry(order.request.instrument.as_str().to_string())
                .or_insert_with(|| Position {
                    exchange_segment: order.request.exchange_segment,
                    instrument: InstrumentId::new(order.request.instrument.as_str()),
                    product: order.request.product,
                    net_quantity: 0,
                    buy_quantity: 0,
                    sell_quantity: 0,
                    buy_avg_price: Decimal::ZERO,
                    sell_avg_price: Decimal::ZERO,
                    last_price: price,
                });
            match order.request.side {
                OrderSide::Buy => {
                    entry.buy_quantity += filled;
                    entry.net_quantity += i64::try_from(filled).unwrap_or(i64::MAX);
                    entry.buy_avg_price = price;
                }
                OrderSide::Sell => {
                    entry.sell_quantity += filled;
                    entry.net_quantity -= i64::try_from(filled).unwrap_or(i64::MAX);
                    entry.sell_avg_price = price;
                }
            }
        }
        Ok(by_instrument.into_values().collect())
    }

    async fn holdings(
        &self,
        cancel: &CancellationToken,
        _client_id: &ClientId,
    ) -> Result<Vec<Holding>, BrokerError> {
        self.require_session(cancel)?;
        Ok(Vec::new())
    }

    async fn quotes(
        &self,
        cancel: &CancellationToken,
        symbols: &[String],
    ) -> Result<HashMap<String, Quote>, BrokerError> {
        self.require_session(cancel)?;
        let mut state = self.lock();
        let starting = self.starting_price;
        Ok(symbols
            .iter()
            .map(|symbol| {
                let price = *state.prices.entry(symbol.clone()).or_insert(starting);
                (symbol.clone(), synthetic_quote(symbol, price))
            })
            .collect())
    }

    fn subscribe_quotes(&self, symbols: &[String]) -> Result<QuoteStream, BrokerError> {
        Ok(self.streamer.subscribe(symbols))
    }

    fn unsubscribe_quotes(&self, symbols: &[String]) -> Result<(), BrokerError> {
        self.streamer.unsubscribe(symbols);
        Ok(())
    }
}

/// Random-walk quote poller.
struct SimQuoteSource {
    state: Arc<Mutex<SimState>>,
    starting_price: Decimal,
}

#[async_trait]
impl QuoteSource for SimQuoteSource {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, BrokerError> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut rng = rand::rng();

        Ok(symbols
            .iter()
            .map(|symbol| {
                let price = state
                    .prices
                    .entry(symbol.clone())
                    .or_insert(self.starting_price);
                // Walk up to ±10 basis points per tick.
                let bps: i64 = rng.random_range(-10..=10);
                *price += *price * Decimal::new(bps, 4);
                synthetic_quote(symbol, *price)
            })
            .collect())
    }
}

fn synthetic_quote(symbol: &str, price: Decimal) -> Quote {
    let tick = price * Decimal::new(5, 4); // 5 bps spread each side
    Quote {
        symbol: symbol.to_string(),
        last_price: price,
        bid: price - tick,
        ask: price + tick,
        volume: 0,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orders::{ExchangeSegment, OrderType, ProductType, TimeInForce};
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
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
            order_tag: "tag-1".to_string(),
        }
    }

    async fn logged_in() -> SimulatedBroker {
        let broker = SimulatedBroker::new(SimulatorConfig::default());
        broker
            .login(
                &CancellationToken::new(),
                &Credentials::new("key", "secret", "user"),
            )
            .await
            .unwrap();
        broker
    }

    #[tokio::test]
    async fn order_methods_require_login() {
        let broker = SimulatedBroker::new(SimulatorConfig::default());
        let result = broker
            .place_order(&CancellationToken::new(), &request())
            .await;
        assert_eq!(result.unwrap_err(), BrokerError::Unauthenticated);
    }

    #[tokio::test]
    async fn place_order_is_pending() {
        let broker = logged_in().await;
        let response = broker
            .place_order(&CancellationToken::new(), &request())
            .await
            .unwrap();
        assert_eq!(response.status, OrderStatus::Pending);
        assert_eq!(response.filled_quantity, 0);
        assert!(response.order_id.as_str().starts_with("SIM-"));
    }

    #[tokio::test]
    async fn fill_then_cancel_is_rejected() {
        let broker = logged_in().await;
        let cancel = CancellationToken::new();
        let response = broker.place_order(&cancel, &request()).await.unwrap();

        broker.fill(response.order_id.as_str(), 100).unwrap();

        let err = broker
            .cancel_order(&cancel, &response.order_id, &ClientId::new("CLIENT01"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be cancelled"));
    }

    #[tokio::test]
    async fn partial_fill_then_cancel() {
        let broker = logged_in().await;
        let cancel = CancellationToken::new();
        let response = broker.place_order(&cancel, &request()).await.unwrap();

        broker.fill(response.order_id.as_str(), 40).unwrap();

        let cancelled = broker
            .cancel_order(&cancel, &response.order_id, &ClientId::new("CLIENT01"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.filled_quantity, 40);
    }

    #[tokio::test]
    async fn order_book_lists_client_orders() {
        let broker = logged_in().await;
        let cancel = CancellationToken::new();
        broker.place_order(&cancel, &request()).await.unwrap();
        broker.place_order(&cancel, &request()).await.unwrap();

        let book = broker
            .order_book(&cancel, &ClientId::new("CLIENT01"))
            .await
            .unwrap();
        assert_eq!(book.entries.len(), 2);

        let other = broker
            .order_book(&cancel, &ClientId::new("OTHER"))
            .await
            .unwrap();
        assert!(other.entries.is_empty());
    }

    #[tokio::test]
    async fn positions_reflect_fills() {
        let broker = logged_in().await;
        let cancel = CancellationToken::new();
        let response = broker.place_order(&cancel, &request()).await.unwrap();
        broker.fill(response.order_id.as_str(), 100).unwrap();

        let positions = broker
            .positions(&cancel, &ClientId::new("CLIENT01"))
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].net_quantity, 100);
        assert_eq!(positions[0].buy_quantity, 100);
    }

    #[tokio::test]
    async fn quotes_walk_from_starting_price() {
        let broker = logged_in().await;
        let quotes = broker
            .quotes(&CancellationToken::new(), &["INFY".to_string()])
            .await
            .unwrap();
        let quote = &quotes["INFY"];
        assert_eq!(quote.last_price, dec!(100));
        assert!(quote.bid < quote.last_price);
        assert!(quote.ask > quote.last_price);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let broker = logged_in().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = broker.place_order(&cancel, &request()).await.unwrap_err();
        assert_eq!(err, BrokerError::Cancelled);
    }

    #[tokio::test]
    async fn modify_updates_working_order() {
        let broker = logged_in().await;
        let cancel = CancellationToken::new();
        let response = broker.place_order(&cancel, &request()).await.unwrap();

        let modify = ModifyOrderRequest {
            order_id: response.order_id.clone(),
            client_id: ClientId::new("CLIENT01"),
            quantity: Some(50),
            limit_price: Some(dec!(2490.0)),
            stop_price: None,
        };
        broker.modify_order(&cancel, &modify).await.unwrap();

        broker.fill(response.order_id.as_str(), 50).unwrap();
        let book = broker
            .order_book(&cancel, &ClientId::new("CLIENT01"))
            .await
            .unwrap();
        assert_eq!(book.entries[0].status, OrderStatus::Executed);
    }

    #[tokio::test]
    async fn logout_invalidates_session() {
        let broker = logged_in().await;
        let cancel = CancellationToken::new();
        broker.logout(&cancel).await.unwrap();

        let err = broker.place_order(&cancel, &request()).await.unwrap_err();
        assert_eq!(err, BrokerError::Unauthenticated);
    }
}
