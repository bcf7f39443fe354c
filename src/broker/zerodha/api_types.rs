//! Kite wire format.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::broker::error::BrokerError;
use crate::broker::types::{OrderResponse, Quote};
use crate::domain::orders::OrderStatus;
use crate::domain::shared::{BrokerOrderId, ExchangeOrderId};

/// Response envelope. `status` is `"success"` or `"error"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct KiteEnvelope<T> {
    /// `"success"` or `"error"`.
    pub status: String,
    /// Payload, present on success.
    #[serde(default)]
    pub data: Option<T>,
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Error class, e.g. `TokenException`.
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Login payload.
#[derive(Debug, Clone, Deserialize)]
pub struct KiteLoginData {
    /// Access token for subsequent calls.
    pub access_token: String,
    /// Authenticated user id.
    pub user_id: String,
}

/// Order id payload returned by mutation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct KiteOrderData {
    /// Broker order id.
    pub order_id: String,
}

/// Order row in the order book.
#[derive(Debug, Clone, Deserialize)]
pub struct KiteOrder {
    /// Broker order id.
    pub order_id: String,
    /// Exchange order id, once known.
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Kite status string.
    pub status: String,
    /// Cumulative filled quantity.
    #[serde(default)]
    pub filled_quantity: u64,
    /// Status message for rejections.
    #[serde(default)]
    pub status_message: Option<String>,
}

impl KiteOrder {
    /// Map into the common acknowledgement model.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidResponse` for an unknown status string.
    pub fn into_response(self) -> Result<OrderResponse, BrokerError> {
        let status = parse_kite_status(&self.status, self.filled_quantity)?;
        Ok(OrderResponse {
            order_id: BrokerOrderId::new(self.order_id),
            exchange_order_id: self.exchange_order_id.map(ExchangeOrderId::new),
            status,
            filled_quantity: self.filled_quantity,
            rejection_reason: self.status_message,
        })
    }
}

/// Positions payload: Kite splits day and net books.
#[derive(Debug, Clone, Deserialize)]
pub struct KitePositionsData {
    /// Net positions.
    pub net: Vec<KitePosition>,
}

/// Position row.
#[derive(Debug, Clone, Deserialize)]
pub struct KitePosition {
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Exchange name (`NSE`, `NFO`, ...).
    pub exchange: String,
    /// Product (`MIS`, `CNC`, `NRML`).
    pub product: String,
    /// Net quantity (negative when short).
    pub quantity: i64,
    /// Total bought.
    #[serde(default)]
    pub buy_quantity: u64,
    /// Total sold.
    #[serde(default)]
    pub sell_quantity: u64,
    /// Average buy price.
    #[serde(default)]
    pub buy_price: Decimal,
    /// Average sell price.
    #[serde(default)]
    pub sell_price: Decimal,
    /// Last traded price.
    #[serde(default)]
    pub last_price: Decimal,
}

/// Holding row.
#[derive(Debug, Clone, Deserialize)]
pub struct KiteHolding {
    /// Trading symbol.
    pub tradingsymbol: String,
    /// Exchange name.
    pub exchange: String,
    /// Held quantity.
    pub quantity: u64,
    /// Average acquisition price.
    #[serde(default)]
    pub average_price: Decimal,
    /// Last traded price.
    #[serde(default)]
    pub last_price: Decimal,
    /// ISIN.
    #[serde(default)]
    pub isin: Option<String>,
}

/// Market depth level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KiteDepthLevel {
    /// Price at this level.
    #[serde(default)]
    pub price: Decimal,
    /// Quantity at this level.
    #[serde(default)]
    pub quantity: u64,
}

/// Two-sided market depth.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KiteDepth {
    /// Bid side, best first.
    #[serde(default)]
    pub buy: Vec<KiteDepthLevel>,
    /// Ask side, best first.
    #[serde(default)]
    pub sell: Vec<KiteDepthLevel>,
}

/// Quote row, keyed by `EXCHANGE:SYMBOL` in the response map.
#[derive(Debug, Clone, Deserialize)]
pub struct KiteQuote {
    /// Last traded price.
    pub last_price: Decimal,
    /// Day volume.
    #[serde(default)]
    pub volume: u64,
    /// Market depth.
    #[serde(default)]
    pub depth: KiteDepth,
}

impl KiteQuote {
    /// Map into the common quote model under the given symbol key.
    #[must_use]
    pub fn into_quote(self, symbol: String) -> Quote {
        Quote {
            symbol,
            last_price: self.last_price,
            bid: self.depth.buy.first().map(|l| l.price).unwrap_or_default(),
            ask: self.depth.sell.first().map(|l| l.price).unwrap_or_default(),
            volume: self.volume,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Parse a Kite order status string.
///
/// Kite reports partially-filled orders as `OPEN` with a non-zero
/// `filled_quantity`.
///
/// # Errors
///
/// Returns `BrokerError::InvalidResponse` for an unknown status.
pub fn parse_kite_status(status: &str, filled_quantity: u64) -> Result<OrderStatus, BrokerError> {
    match status.to_ascii_uppercase().as_str() {
        "OPEN" | "TRIGGER PENDING" | "AMO REQ RECEIVED" | "PUT ORDER REQ RECEIVED"
        | "VALIDATION PENDING" | "OPEN PENDING" => {
            if filled_quantity > 0 {
                Ok(OrderStatus::PartiallyFilled)
            } else {
                Ok(OrderStatus::Pending)
            }
        }
        "COMPLETE" => Ok(OrderStatus::Executed),
        "CANCELLED" => Ok(OrderStatus::Cancelled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        other => Err(BrokerError::invalid_response(format!(
            "unknown order status '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_success_parses() {
        let json = r#"{"status": "success", "data": {"order_id": "151220000000000"}}"#;
        let envelope: KiteEnvelope<KiteOrderData> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.status, "success");
        assert_eq!(envelope.data.unwrap().order_id, "151220000000000");
    }

    #[test]
    fn envelope_error_parses() {
        let json = r#"{
            "status": "error",
            "message": "Incorrect api_key or access_token.",
            "error_type": "TokenException"
        }"#;
        let envelope: KiteEnvelope<KiteOrderData> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.status, "error");
        assert_eq!(envelope.error_type.as_deref(), Some("TokenException"));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn open_with_fills_is_partially_filled() {
        assert_eq!(
            parse_kite_status("OPEN", 40).unwrap(),
            OrderStatus::PartiallyFilled
        );
        assert_eq!(parse_kite_status("OPEN", 0).unwrap(), OrderStatus::Pending);
    }

    #[test]
    fn terminal_statuses() {
        assert_eq!(
            parse_kite_status("COMPLETE", 100).unwrap(),
            OrderStatus::Executed
        );
        assert_eq!(
            parse_kite_status("CANCELLED", 0).unwrap(),
            OrderStatus::Cancelled
        );
        assert_eq!(
            parse_kite_status("REJECTED", 0).unwrap(),
            OrderStatus::Rejected
        );
        assert!(parse_kite_status("WHATEVER", 0).is_err());
    }

    #[test]
    fn order_row_maps_with_rejection_message() {
        let order = KiteOrder {
            order_id: "1".to_string(),
            exchange_order_id: None,
            tradingsymbol: "INFY".to_string(),
            status: "REJECTED".to_string(),
            filled_quantity: 0,
            status_message: Some("RMS:Blocked for today".to_string()),
        };
        let response = order.into_response().unwrap();
        assert_eq!(response.status, OrderStatus::Rejected);
        assert_eq!(
            response.rejection_reason.as_deref(),
            Some("RMS:Blocked for today")
        );
    }

    #[test]
    fn quote_uses_best_depth_levels() {
        let quote = KiteQuote {
            last_price: dec!(1520.5),
            volume: 12000,
            depth: KiteDepth {
                buy: vec![KiteDepthLevel {
                    price: dec!(1520.0),
                    quantity: 50,
                }],
                sell: vec![KiteDepthLevel {
                    price: dec!(1521.0),
                    quantity: 75,
                }],
            },
        };
        let mapped = quote.into_quote("NSE:INFY".to_string());
        assert_eq!(mapped.bid, dec!(1520.0));
        assert_eq!(mapped.ask, dec!(1521.0));
        assert_eq!(mapped.symbol, "NSE:INFY");
    }
}
