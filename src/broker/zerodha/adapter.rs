//! Zerodha adapter and its HTTP transport.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::api_types::{
    KiteEnvelope, KiteHolding, KiteLoginData, KiteOrder, KiteOrderData, KitePositionsData,
    KiteQuote,
};
use crate::broker::BrokerClient;
use crate::broker::error::BrokerError;
use crate::broker::stream::{QuoteSource, QuoteStream, QuoteStreamer, StreamConfig};
use crate::broker::types::{
    Credentials, Holding, ModifyOrderRequest, OrderBook, OrderRequest, OrderResponse, Position,
    Quote, Session, SessionStore,
};
use crate::domain::orders::{OrderStatus, OrderType, TimeInForce};
use crate::domain::shared::{BrokerOrderId, ClientId, InstrumentId};
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, ResilienceStack, RetryConfig};

/// Session lifetime: Kite tokens are valid until the next trading morning.
const SESSION_SECS: i64 = 86_400;

/// Configuration for the Zerodha adapter.
#[derive(Debug, Clone)]
pub struct ZerodhaConfig {
    /// API base URL.
    pub base_url: String,
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

impl ZerodhaConfig {
    /// Create a configuration with defaults for everything but the URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
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

/// Zerodha broker adapter.
///
/// The session token stored here is the full `api_key:access_token` pair the
/// Kite protocol expects in its authorization header.
#[derive(Debug)]
pub struct ZerodhaAdapter {
    http: KiteHttpClient,
    resilience: ResilienceStack,
    session: Arc<SessionStore>,
    credentials: RwLock<Option<Credentials>>,
    streamer: QuoteStreamer,
}

impl ZerodhaAdapter {
    /// Create an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ZerodhaConfig) -> Result<Self, BrokerError> {
        let http = KiteHttpClient::new(config.base_url, config.timeout)?;
        let session = Arc::new(SessionStore::new());
        let streamer = QuoteStreamer::new(
            Arc::new(KiteQuoteSource {
                http: http.clone(),
                session: Arc::clone(&session),
            }),
            config.stream,
        );
        Ok(Self {
            http,
            resilience: ResilienceStack::new(
                "zerodha",
                config.retry,
                config.circuit_breaker,
                config.rate_limiter,
            ),
            session,
            credentials: RwLock::new(None),
            streamer,
        })
    }

    /// Current auth token, re-authenticating once if the session lapsed.
    async fn authorized_token(&self, cancel: &CancellationToken) -> Result<String, BrokerError> {
        match self.session.token() {
            Ok(token) => Ok(token),
            Err(BrokerError::SessionExpired) => {
                let credentials = self
                    .credentials
                    .read()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clone();
                match credentials {
                    Some(credentials) => {
                        tracing::info!(name = "zerodha", "Session expired, re-authenticating");
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

    fn order_form(request: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("tradingsymbol", request.instrument.as_str().to_string()),
            ("exchange", kite_exchange(request).to_string()),
            ("transaction_type", request.side.to_string()),
            ("order_type", kite_order_type(request.order_type).to_string()),
            ("quantity", request.quantity.to_string()),
            ("product", request.product.to_string()),
            ("validity", kite_validity(request.time_in_force).to_string()),
            ("tag", request.order_tag.clone()),
        ];
        if let Some(price) = request.limit_price {
            form.push(("price", price.to_string()));
        }
        if let Some(trigger) = request.stop_price {
            form.push(("trigger_price", trigger.to_string()));
        }
        form
    }
}

#[async_trait]
impl BrokerClient for ZerodhaAdapter {
    async fn login(
        &self,
        cancel: &CancellationToken,
        credentials: &Credentials,
    ) -> Result<Session, BrokerError> {
        let form = vec![
            ("api_key", credentials.api_key.clone()),
            ("user_id", credentials.user_id.clone()),
            (
                "password",
                credentials.password.clone().unwrap_or_default(),
            ),
            ("twofa_value", credentials.totp.clone().unwrap_or_default()),
        ];

        let data: KiteLoginData = self
            .resilience
            .execute(cancel, || {
                self.http.post_form("/session/token", &form, None)
            })
            .await?;

        let session = Session {
            token: format!("{}:{}", credentials.api_key, data.access_token),
            user_id: data.user_id,
            expires_at: Utc::now().timestamp() + SESSION_SECS,
            refresh_token: None,
        };
        self.session.set(session.clone());
        *self
            .credentials
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(credentials.clone());

        tracing::info!(name = "zerodha", user_id = %session.user_id, "Broker session established");
        Ok(session)
    }

    async fn logout(&self, cancel: &CancellationToken) -> Result<(), BrokerError> {
        let token = self.session.token()?;
        let _: serde_json::Value = self
            .resilience
            .execute(cancel, || {
                self.http
                    .request::<serde_json::Value>(Method::DELETE, "/session/token", &[], Some(&token))
            })
            .await?;
        self.session.clear();
        *self
            .credentials
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        tracing::info!(name = "zerodha", "Broker session closed");
        Ok(())
    }

    async fn place_order(
        &self,
        cancel: &CancellationToken,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let form = Self::order_form(request);

        tracing::info!(
            name = "zerodha",
            symbol = %request.instrument,
            side = %request.side,
            quantity = request.quantity,
            order_tag = %request.order_tag,
            "Submitting order"
        );

        let data: KiteOrderData = self
            .resilience
            .execute(cancel, || {
                self.http.post_form("/orders/regular", &form, Some(&token))
            })
            .await?;

        // Kite acknowledges placement with just the order id; the order is
        // pending until the order book reports otherwise.
        Ok(OrderResponse {
            order_id: BrokerOrderId::new(data.order_id),
            exchange_order_id: None,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            rejection_reason: None,
        })
    }

    async fn modify_order(
        &self,
        cancel: &CancellationToken,
        request: &ModifyOrderRequest,
    ) -> Result<OrderResponse, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let mut form: Vec<(&'static str, String)> = Vec::new();
        if let Some(quantity) = request.quantity {
            form.push(("quantity", quantity.to_string()));
        }
        if let Some(price) = request.limit_price {
            form.push(("price", price.to_string()));
        }
        if let Some(trigger) = request.stop_price {
            form.push(("trigger_price", trigger.to_string()));
        }
        let path = format!("/orders/regular/{}", request.order_id.as_str());

        let data: KiteOrderData = self
            .resilience
            .execute(cancel, || self.http.put_form(&path, &form, Some(&token)))
            .await?;

        Ok(OrderResponse {
            order_id: BrokerOrderId::new(data.order_id),
            exchange_order_id: None,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            rejection_reason: None,
        })
    }

    async fn cancel_order(
        &self,
        cancel: &CancellationToken,
        order_id: &BrokerOrderId,
        _client_id: &ClientId,
    ) -> Result<OrderResponse, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let path = format!("/orders/regular/{}", order_id.as_str());

        tracing::info!(name = "zerodha", broker_order_id = %order_id, "Cancelling order");

        let data: KiteOrderData = self
            .resilience
            .execute(cancel, || self.http.delete(&path, Some(&token)))
            .await?;

        Ok(OrderResponse {
            order_id: BrokerOrderId::new(data.order_id),
            exchange_order_id: None,
            status: OrderStatus::Cancelled,
            filled_quantity: 0,
            rejection_reason: None,
        })
    }

    async fn order_book(
        &self,
        cancel: &CancellationToken,
        client_id: &ClientId,
    ) -> Result<OrderBook, BrokerError> {
        let token = self.authorized_token(cancel).await?;

        let rows: Vec<KiteOrder> = self
            .resilience
            .execute(cancel, || self.http.get("/orders", Some(&token)))
            .await?;

        let entries = rows
            .into_iter()
            .map(KiteOrder::into_response)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OrderBook {
            client_id: client_id.clone(),
            entries,
            fetched_at: Utc::now(),
        })
    }

    async fn positions(
        &self,
        cancel: &CancellationToken,
        _client_id: &ClientId,
    ) -> Result<Vec<Position>, BrokerError> {
        let token = self.authorized_token(cancel).await?;

        let data: KitePositionsData = self
            .resilience
            .execute(cancel, || self.http.get("/portfolio/positions", Some(&token)))
            .await?;

        data.net
            .into_iter()
            .map(|p| {
                Ok(Position {
                    exchange_segment: p
                        .exchange
                        .parse()
                        .map_err(BrokerError::invalid_response)?,
                    instrument: InstrumentId::new(p.tradingsymbol),
                    product: p.product.parse().map_err(BrokerError::invalid_response)?,
                    net_quantity: p.quantity,
                    buy_quantity: p.buy_quantity,
                    sell_quantity: p.sell_quantity,
                    buy_avg_price: p.buy_price,
                    sell_avg_price: p.sell_price,
                    last_price: p.last_price,
                })
            })
            .collect()
    }

    async fn holdings(
        &self,
        cancel: &CancellationToken,
        _client_id: &ClientId,
    ) -> Result<Vec<Holding>, BrokerError> {
        let token = self.authorized_token(cancel).await?;

        let rows: Vec<KiteHolding> = self
            .resilience
            .execute(cancel, || self.http.get("/portfolio/holdings", Some(&token)))
            .await?;

        rows.into_iter()
            .map(|h| {
                Ok(Holding {
                    instrument: InstrumentId::new(h.tradingsymbol),
                    exchange_segment: h
                        .exchange
                        .parse()
                        .map_err(BrokerError::invalid_response)?,
                    quantity: h.quantity,
                    average_price: h.average_price,
                    last_price: h.last_price,
                    isin: h.isin,
                })
            })
            .collect()
    }

    async fn quotes(
        &self,
        cancel: &CancellationToken,
        symbols: &[String],
    ) -> Result<HashMap<String, Quote>, BrokerError> {
        let token = self.authorized_token(cancel).await?;
        let path = quote_path(symbols);

        let data: HashMap<String, KiteQuote> = self
            .resilience
            .execute(cancel, || self.http.get(&path, Some(&token)))
            .await?;

        Ok(data
            .into_iter()
            .map(|(symbol, quote)| (symbol.clone(), quote.into_quote(symbol)))
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

/// Quote poller over the quote endpoint.
struct KiteQuoteSource {
    http: KiteHttpClient,
    session: Arc<SessionStore>,
}

#[async_trait]
impl QuoteSource for KiteQuoteSource {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, BrokerError> {
        let token = self.session.token()?;
        let path = quote_path(symbols);
        let data: HashMap<String, KiteQuote> = self.http.get(&path, Some(&token)).await?;
        Ok(data
            .into_iter()
            .map(|(symbol, quote)| quote.into_quote(symbol))
            .collect())
    }
}

fn quote_path(symbols: &[String]) -> String {
    let query: Vec<String> = symbols.iter().map(|s| format!("i={s}")).collect();
    format!("/quote?{}", query.join("&"))
}

const fn kite_order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopLimit => "SL",
        OrderType::StopMarket => "SL-M",
    }
}

const fn kite_validity(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::Day => "DAY",
        TimeInForce::Ioc => "IOC",
    }
}

fn kite_exchange(request: &OrderRequest) -> &'static str {
    use crate::domain::orders::ExchangeSegment;
    match request.exchange_segment {
        ExchangeSegment::NseCm => "NSE",
        ExchangeSegment::NseFo => "NFO",
        ExchangeSegment::BseCm => "BSE",
        ExchangeSegment::BseFo => "BFO",
        ExchangeSegment::McxFo => "MCX",
    }
}

/// Thin `reqwest` wrapper speaking the Kite envelope protocol.
#[derive(Debug, Clone)]
struct KiteHttpClient {
    client: Client,
    base_url: String,
}

impl KiteHttpClient {
    fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::GET, path, &[], token).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&'static str, String)],
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::POST, path, form, token).await
    }

    async fn put_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&'static str, String)],
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::PUT, path, form, token).await
    }

    async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::DELETE, path, &[], token).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(&'static str, String)],
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .header("X-Kite-Version", "3");
        if let Some(token) = token {
            request = request.header("Authorization", format!("token {token}"));
        }
        if !form.is_empty() {
            request = request.form(form);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BrokerError::from_reqwest(&e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(error_for_status(status, path, &text));
        }

        let envelope: KiteEnvelope<T> = serde_json::from_str(&text)
            .map_err(|e| BrokerError::invalid_response(format!("{e}: {text}")))?;

        if envelope.status != "success" {
            return Err(error_for_envelope(
                envelope.error_type.as_deref(),
                envelope.message.as_deref(),
            ));
        }

        envelope
            .data
            .ok_or_else(|| BrokerError::invalid_response("success envelope without data"))
    }
}

fn error_for_status(status: StatusCode, path: &str, body: &str) -> BrokerError {
    // Error bodies still carry the envelope; prefer its message.
    let envelope: Option<KiteEnvelope<serde_json::Value>> = serde_json::from_str(body).ok();
    let message = envelope.as_ref().and_then(|e| e.message.clone());
    let error_type = envelope.as_ref().and_then(|e| e.error_type.clone());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BrokerError::Unauthenticated,
        StatusCode::NOT_FOUND => BrokerError::NotFound {
            order_id: path.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => BrokerError::RateLimited {
            retry_after_secs: None,
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BrokerError::Rejected {
            reason: message.unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            BrokerError::transport(format!("HTTP {}", s.as_u16()))
        }
        s => match error_for_envelope(error_type.as_deref(), message.as_deref()) {
            BrokerError::InvalidResponse { .. } => {
                BrokerError::invalid_response(format!("unexpected HTTP {}", s.as_u16()))
            }
            classified => classified,
        },
    }
}

fn error_for_envelope(error_type: Option<&str>, message: Option<&str>) -> BrokerError {
    let message = message.unwrap_or("unspecified broker error").to_string();
    match error_type {
        Some("TokenException") => BrokerError::Unauthenticated,
        Some("NetworkException") => BrokerError::transport(message),
        Some("InputException" | "OrderException") => BrokerError::Rejected { reason: message },
        _ => BrokerError::invalid_response(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orders::{ExchangeSegment, OrderSide, ProductType};
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
            client_id: ClientId::new("AB1234"),
            exchange_segment: ExchangeSegment::NseCm,
            instrument: InstrumentId::new("INFY"),
            product: ProductType::Cnc,
            order_type: OrderType::StopLimit,
            side: OrderSide::Sell,
            time_in_force: TimeInForce::Day,
            quantity: 10,
            limit_price: Some(dec!(1500.0)),
            stop_price: Some(dec!(1495.0)),
            order_tag: "tag-9".to_string(),
        }
    }

    #[test]
    fn order_form_mapping() {
        let form = ZerodhaAdapter::order_form(&request());
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("tradingsymbol"), "INFY");
        assert_eq!(get("exchange"), "NSE");
        assert_eq!(get("transaction_type"), "SELL");
        assert_eq!(get("order_type"), "SL");
        assert_eq!(get("product"), "CNC");
        assert_eq!(get("validity"), "DAY");
        assert_eq!(get("price"), "1500.0");
        assert_eq!(get("trigger_price"), "1495.0");
        assert_eq!(get("tag"), "tag-9");
    }

    #[test]
    fn quote_path_joins_symbols() {
        let path = quote_path(&["NSE:INFY".to_string(), "NSE:TCS".to_string()]);
        assert_eq!(path, "/quote?i=NSE:INFY&i=NSE:TCS");
    }

    #[test]
    fn token_exception_maps_to_unauthenticated() {
        let err = error_for_envelope(Some("TokenException"), Some("token is invalid"));
        assert_eq!(err, BrokerError::Unauthenticated);
    }

    #[test]
    fn order_exception_passes_message_through() {
        let err = error_for_envelope(Some("OrderException"), Some("Price not in tick range"));
        assert_eq!(
            err,
            BrokerError::Rejected {
                reason: "Price not in tick range".to_string()
            }
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, "/orders", ""),
            BrokerError::RateLimited {
                retry_after_secs: None
            }
        );
        assert!(matches!(
            error_for_status(StatusCode::SERVICE_UNAVAILABLE, "/orders", ""),
            BrokerError::Transport { .. }
        ));
        assert_eq!(
            error_for_status(StatusCode::UNAUTHORIZED, "/orders", ""),
            BrokerError::Unauthenticated
        );
    }
}
