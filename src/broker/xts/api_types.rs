//! XTS wire format.
//!
//! Every XTS response is wrapped in a `{ type, code, description, result }`
//! envelope; `type` is `"success"` or `"error"`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::broker::error::BrokerError;
use crate::broker::types::{OrderRequest, OrderResponse, Quote};
use crate::domain::orders::{ExchangeSegment, OrderStatus, ProductType};
use crate::domain::shared::{BrokerOrderId, ExchangeOrderId};

/// Response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct XtsEnvelope<T> {
    /// `"success"` or `"error"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Backend error/status code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Payload, present on success.
    #[serde(default)]
    pub result: Option<T>,
}

/// Login request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsLoginRequest {
    /// Application key.
    pub app_key: String,
    /// Application secret.
    pub secret_key: String,
    /// Client source tag.
    pub source: String,
}

/// Login result payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsLoginResult {
    /// Session token.
    pub token: String,
    /// Authenticated user id.
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Token expiry as Unix epoch seconds, when reported.
    #[serde(default)]
    pub token_expiry: Option<i64>,
}

/// Order placement/modification request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsOrderRequest {
    /// Exchange segment.
    pub exchange_segment: String,
    /// Trading symbol.
    pub trading_symbol: String,
    /// Product type.
    pub product_type: String,
    /// Order type.
    pub order_type: String,
    /// Order side.
    pub order_side: String,
    /// Time in force.
    pub time_in_force: String,
    /// Quantity in lots.
    pub order_quantity: u64,
    /// Limit price; zero for market orders.
    pub limit_price: Decimal,
    /// Stop price; zero when not a stop order.
    pub stop_price: Decimal,
    /// Client-assigned unique tag.
    pub order_unique_identifier: String,
    /// Target account; dealer flows only.
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl XtsOrderRequest {
    /// Build the wire request. `client_id` is set only for dealer flows.
    #[must_use]
    pub fn from_request(request: &OrderRequest, dealer: bool) -> Self {
        Self {
            exchange_segment: request.exchange_segment.to_string(),
            trading_symbol: request.instrument.as_str().to_string(),
            product_type: request.product.to_string(),
            order_type: request.order_type.to_string(),
            order_side: request.side.to_string(),
            time_in_force: request.time_in_force.to_string(),
            order_quantity: request.quantity,
            limit_price: request.limit_price.unwrap_or_default(),
            stop_price: request.stop_price.unwrap_or_default(),
            order_unique_identifier: request.order_tag.clone(),
            client_id: dealer.then(|| request.client_id.as_str().to_string()),
        }
    }
}

/// Order modification request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsModifyRequest {
    /// Broker-assigned id of the order being modified.
    #[serde(rename = "appOrderID")]
    pub app_order_id: String,
    /// New quantity, when changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_quantity: Option<u64>,
    /// New limit price, when changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// New stop price, when changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// Target account; dealer flows only.
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Order acknowledgement payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsOrderResult {
    /// Broker-assigned order id.
    #[serde(rename = "orderID")]
    pub order_id: String,
    /// Status after the operation.
    pub status: String,
    /// Exchange-assigned order id, once known.
    #[serde(rename = "exchangeOrderID", default)]
    pub exchange_order_id: Option<String>,
    /// Cumulative filled quantity.
    #[serde(default)]
    pub filled_quantity: u64,
    /// Rejection reason, when rejected.
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl XtsOrderResult {
    /// Map into the common acknowledgement model.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidResponse` for an unknown status string.
    pub fn into_response(self) -> Result<OrderResponse, BrokerError> {
        Ok(OrderResponse {
            order_id: BrokerOrderId::new(self.order_id),
            exchange_order_id: self.exchange_order_id.map(ExchangeOrderId::new),
            status: parse_order_status(&self.status)?,
            filled_quantity: self.filled_quantity,
            rejection_reason: self.rejection_reason,
        })
    }
}

/// Position payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsPosition {
    /// Exchange segment.
    pub exchange_segment: String,
    /// Trading symbol.
    pub trading_symbol: String,
    /// Product type.
    pub product_type: String,
    /// Net quantity (negative when short).
    pub net_quantity: i64,
    /// Total bought.
    #[serde(default)]
    pub buy_quantity: u64,
    /// Total sold.
    #[serde(default)]
    pub sell_quantity: u64,
    /// Average buy price.
    #[serde(default)]
    pub buy_average_price: Decimal,
    /// Average sell price.
    #[serde(default)]
    pub sell_average_price: Decimal,
    /// Last traded price.
    #[serde(default)]
    pub last_traded_price: Decimal,
}

/// Holding payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsHolding {
    /// Trading symbol.
    pub trading_symbol: String,
    /// Exchange segment.
    pub exchange_segment: String,
    /// Held quantity.
    pub holding_quantity: u64,
    /// Average acquisition price.
    #[serde(default)]
    pub buy_avg_price: Decimal,
    /// Last traded price.
    #[serde(default)]
    pub last_traded_price: Decimal,
    /// ISIN.
    #[serde(default)]
    pub isin: Option<String>,
}

/// Quote request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsQuoteRequest {
    /// Symbols to quote.
    pub symbols: Vec<String>,
}

/// Quote list payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsQuotesResult {
    /// One entry per requested symbol.
    pub list_quotes: Vec<XtsQuote>,
}

/// Quote payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtsQuote {
    /// Trading symbol.
    pub trading_symbol: String,
    /// Last traded price.
    pub last_traded_price: Decimal,
    /// Best bid.
    #[serde(default)]
    pub bid_price: Decimal,
    /// Best ask.
    #[serde(default)]
    pub ask_price: Decimal,
    /// Day volume.
    #[serde(default)]
    pub total_traded_quantity: u64,
}

impl XtsQuote {
    /// Map into the common quote model.
    #[must_use]
    pub fn into_quote(self) -> Quote {
        Quote {
            symbol: self.trading_symbol,
            last_price: self.last_traded_price,
            bid: self.bid_price,
            ask: self.ask_price,
            volume: self.total_traded_quantity,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Parse an exchange segment string.
///
/// # Errors
///
/// Returns `BrokerError::InvalidResponse` for an unknown segment.
pub fn parse_exchange_segment(segment: &str) -> Result<ExchangeSegment, BrokerError> {
    segment.parse().map_err(BrokerError::invalid_response)
}

/// Parse a product type string.
///
/// # Errors
///
/// Returns `BrokerError::InvalidResponse` for an unknown product.
pub fn parse_product(product: &str) -> Result<ProductType, BrokerError> {
    product.parse().map_err(BrokerError::invalid_response)
}

/// Parse an XTS order status string.
///
/// # Errors
///
/// Returns `BrokerError::InvalidResponse` for an unknown status.
pub fn parse_order_status(status: &str) -> Result<OrderStatus, BrokerError> {
    match status.to_ascii_uppercase().as_str() {
        "NEW" | "OPEN" | "PENDING" | "PENDINGNEW" | "TRIGGER PENDING" => Ok(OrderStatus::Pending),
        "PARTIALLYFILLED" | "PARTIALLY_FILLED" | "PARTIALLY FILLED" => {
            Ok(OrderStatus::PartiallyFilled)
        }
        "FILLED" | "EXECUTED" | "COMPLETE" => Ok(OrderStatus::Executed),
        "CANCELLED" | "CANCELED" => Ok(OrderStatus::Cancelled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        other => Err(BrokerError::invalid_response(format!(
            "unknown order status '{other}'"
        ))),
    }
}
