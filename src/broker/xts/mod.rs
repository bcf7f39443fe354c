//! XTS REST adapters.
//!
//! Two variants over one wire protocol: [`XtsProAdapter`] is the dealer
//! flavor and addresses a target account (`clientID`) on every order call;
//! [`XtsClientAdapter`] is the retail flavor where the account is implied by
//! the logged-in user.

pub mod api_types;
mod client;
mod http;
mod pro;

pub use client::XtsClientAdapter;
pub use http::XtsHttpClient;
pub use pro::XtsProAdapter;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use self::api_types::{
    XtsLoginRequest, XtsLoginResult, XtsModifyRequest, XtsOrderRequest, XtsOrderResult, XtsQuote,
    XtsQuoteRequest, XtsQuotesResult, parse_exchange_segment, parse_product,
};
use super::error::BrokerError;
use super::stream::{QuoteSource, QuoteStream, QuoteStreamer, StreamConfig};
use super::types::{
    Credentials, Holding, ModifyOrderRequest, OrderBook, OrderRequest, OrderResponse, Position,
    Quote, Session, SessionStore,
};
use crate::domain::shared::{BrokerOrderId, ClientId, InstrumentId};
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, ResilienceStack, RetryConfig};

/// Default value for the XTS login `source` field.
const DEFAULT_SOURCE: &str = "WEBAPI";

/// Session lifetime assumed when the backend does not report an expiry.
const DEFAULT_SESSION_SECS: i64 = 86_400;

/// Configuration for an XTS adapter.
#[derive(Debug, Clone)]
pub struct XtsConfig {
    /// API base URL.
    pub base_url: String,
    /// Login `source` tag.
    pub source: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Retry policy settings.
    pub retry: RetryConfig,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate limiter settings.
    pub rate_limiter: RateLimiterConfig,
    /// Quote stream settings.
    pub stream: StreamConfig,
}

impl XtsConfig {
    /// Create a configuration with defaults for everything but the URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            source: DEFAULT_SOURCE.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            stream: StreamConfig::default(),
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the circuit breaker configuration.
    #[must_use]
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Set the rate limiter configuration.
    #[must_use]
    pub const fn with_rate_limiter(mut self, rate_limiter: RateLimiterConfig) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Set the quote stream configuration.
    #[must_use]
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }
}

/// Shared implementation behind both XTS variants.
pub(crate) struct XtsCore {
    name: &'static str,
    http: XtsHttpClient,
    resilience: ResilienceStack,
    session: Arc<SessionStore>,
    credentials: RwLock<Option<Credentials>>,
    streamer: QuoteStreamer,
    source: String,
    dealer: bool,
}

impl XtsCore {
    pub(crate) fn new(
        name: &'static str,
        config: XtsConfig,
        dealer: bool,
    ) -> Result<Self, BrokerError> {
        let http = XtsHttpClient::new(config.base_url, config.timeout)?;
        let session = Arc::new(SessionStore::new());
        let streamer = QuoteStreamer::new(
            Arc::new(XtsQuoteSource {
                http: http.clone(),
                session: Arc::clone(&session),
            }),
            config.stream,
        );
        Ok(Self {
            name,
            http,
            resilience: ResilienceStack::new(
                name,
                config.retry,
                config.circuit_breaker,
                config.rate_limiter,
            ),
            session,
            credentials: RwLock::new(None),
            streamer,
            source: config.source,
            dealer,
        })
    }

    pub(crate) async fn login(
        &self,
        cancel: &CancellationToken,
        credentials: &Credentials,
    ) -> Result<Session, BrokerError> {
        let body = XtsLoginRequest {
            app_key: credentials.api_key.clone(),
            secret_key: credentials.api_secret.clone(),
            source: self.source.clone(),
        };
        let result: XtsLoginResult = self
            .resilience
            .execute(cancel, || {
                self.http.post("/interactive/user/session", &body, None)
            })
            .await?;

        let session = Session {
            token: result.token,
            user_id: result.user_id,
            expires_at: result
                .token_expiry
                .unwrap_or_else(|| Utc::now().timestamp() + DEFAULT_SESSION_SECS),
            refresh_token: None,
        };
        self.session.set(session.clone());
        *self.write_credentials() = Some(credentials.clone());

        tracing::info!(name = self.name, user_id = %session.user_id, "Broker session established");
        Ok(session)
    }

    pub(crate) async fn logout(&self, cancel: &CancellationToken) -> Result<(), BrokerError> {
        let token = self.session.token()?;
        self.resilience
            .execute(cancel, || {
                self.http
                    .delete_ack("/interactive/user/session", Some(token.as_str()))
            })
            .await?;
        self.session.clear();
        *self.write_credentials() = None;
        tracing::info!(name = self.name, "Broker session closed");
        Ok(())
    }

    pub(crate) async fn place_order(
        &self,
        cancel: &CancellationToken,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let wire = XtsOrderRequest::from_request(request, self.dealer);

        tracing::info!(
            name = self.name,
            symbol = %request.instrument,
            side = %request.side,
            quantity = request.quantity,
            order_tag = %request.order_tag,
            "Submitting order"
        );

        let result: XtsOrderResult = self
            .resilience
            .execute(cancel, || {
                self.http
                    .post("/interactive/orders", &wire, Some(token.as_str()))
            })
            .await?;
        let response = result.into_response()?;

        tracing::info!(
            name = self.name,
            broker_order_id = %response.order_id,
            status = %response.status,
            "Order acknowledged"
        );
        Ok(response)
    }

    pub(crate) async fn modify_order(
        &self,
        cancel: &CancellationToken,
        request: &ModifyOrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let wire = XtsModifyRequest {
            app_order_id: request.order_id.as_str().to_string(),
            order_quantity: request.quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            client_id: self
                .dealer
                .then(|| request.client_id.as_str().to_string()),
        };

        let result: XtsOrderResult = self
            .resilience
            .execute(cancel, || {
                self.http
                    .put("/interactive/orders", &wire, Some(token.as_str()))
            })
            .await?;
        result.into_response()
    }

    pub(crate) async fn cancel_order(
        &self,
        cancel: &CancellationToken,
        order_id: &BrokerOrderId,
        client_id: &ClientId,
    ) -> Result<OrderResponse, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let path = if self.dealer {
            format!(
                "/interactive/orders?appOrderID={}&clientID={}",
                order_id.as_str(),
                client_id.as_str()
            )
        } else {
            format!("/interactive/orders?appOrderID={}", order_id.as_str())
        };

        tracing::info!(name = self.name, broker_order_id = %order_id, "Cancelling order");

        let result: XtsOrderResult = self
            .resilience
            .execute(cancel, || self.http.delete(&path, Some(token.as_str())))
            .await?;
        result.into_response()
    }

    pub(crate) async fn order_book(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<OrderBook, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let path = self.account_path("/interactive/orders", client_id);

        let results: Vec<XtsOrderResult> = self
            .resilience
            .execute(cancel, || self.http.get(&path, Some(token.as_str())))
            .await?;

        let entries = results
            .into_iter()
            .map(XtsOrderResult::into_response)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OrderBook {
            client_id: client_id.clone(),
            entries,
            fetched_at: Utc::now(),
        })
    }

    pub(crate) async fn positions(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<Vec<Position>, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let path = self.account_path("/interactive/portfolio/positions", client_id);

        let results: Vec<api_types::XtsPosition> = self
            .resilience
            .execute(cancel, || self.http.get(&path, Some(token.as_str())))
            .await?;

        results
            .into_iter()
            .map(|p| {
                Ok(Position {
                    exchange_segment: parse_exchange_segment(&p.exchange_segment)?,
                    instrument: InstrumentId::new(p.trading_symbol),
                    product: parse_product(&p.product_type)?,
                    net_quantity: p.net_quantity,
                    buy_quantity: p.buy_quantity,
                    sell_quantity: p.sell_quantity,
                    buy_avg_price: p.buy_average_price,
                    sell_avg_price: p.sell_average_price,
                    last_price: p.last_traded_price,
                })
            })
            .collect()
    }

    pub(crate) async fn holdings(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<Vec<Holding>, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let path = self.account_path("/interactive/portfolio/holdings", client_id);

        let results: Vec<api_types::XtsHolding> = self
            .resilience
            .execute(cancel, || self.http.get(&path, Some(token.as_str())))
            .await?;

        results
            .into_iter()
            .map(|h| {
                Ok(Holding {
                    instrument: InstrumentId::new(h.trading_symbol),
                    exchange_segment: parse_exchange_segment(&h.exchange_segment)?,
                    quantity: h.holding_quantity,
                    average_price: h.buy_avg_price,
                    last_price: h.last_traded_price,
                    isin: h.isin,
                })
            })
            .collect()
    }

    pub(crate) async fn quotes(
        &self,
        cancel: &CancellationToken,
        symbols: &[String],
    ) -> Result<HashMap<String, Quote>, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let body = XtsQuoteRequest {
            symbols: symbols.to_vec(),
        };

        let result: XtsQuotesResult = self
            .resilience
            .execute(cancel, || {
                self.http
                    .post("/apimarketdata/instruments/quotes", &body, Some(token.as_str()))
            })
            .await?;

        Ok(result
            .list_quotes
            .into_iter()
            .map(XtsQuote::into_quote)
            .map(|quote| (quote.symbol.clone(), quote))
            .collect())
    }

    pub(crate) fn subscribe_quotes(&self, symbols: &[String]) -> QuoteStream {
        self.streamer.subscribe(symbols)
    }

    pub(crate) fn unsubscribe_quotes(&self, symbols: &[String]) {
        self.streamer.unsubscribe(symbols);
    }

    /// Current token, re-authenticating once if the session lapsed.
    async fn authorized_token(&self, cancel: &CancellationToken) -> Result<String, BrokerError> {
        match self.session.token() {
            Ok(token) => Ok(token),
            Err(BrokerError::SessionExpired) => {
                let credentials = self.write_credentials().clone();
                match credentials {
                    Some(credentials) => {
                        tracing::info!(name = self.name, "Session expired, re-authenticating");
                        self.login(cancel, &credentials)
                            .await
                            .map(|session| session.token)
                    }
                    None => Err(BrokerError::Unauthenticated),
                }
            }
            Err(error) => Err(error),
        }
    }

    fn account_path(&self, path: &str, client_id: &ClientId) -> String {
        if self.dealer {
            format!("{path}?clientID={}", client_id.as_str())
        } else {
            path.to_string()
        }
    }

    fn write_credentials(&self) -> std::sync::RwLockWriteGuard<'_, Option<Credentials>> {
        self.credentials
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for XtsCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XtsCore")
            .field("name", &self.name)
            .field("dealer", &self.dealer)
            .finish_non_exhaustive()
    }
}

/// Quote poller over the market-data endpoint.
struct XtsQuoteSource {
    http: XtsHttpClient,
    session: Arc<SessionStore>,
}

#[async_trait]
impl QuoteSource for XtsQuoteSource {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, BrokerError> {
        let token = self.session.token()?;
        let body = XtsQuoteRequest {
            symbols: symbols.to_vec(),
        };
        let result: XtsQuotesResult = self
            .http
            .post("/apimarketdata/instruments/quotes", &body, Some(&token))
            .await?;
        Ok(result
            .list_quotes
            .into_iter()
            .map(XtsQuote::into_quote)
            .collect())
    }
}
