//! Order attribute enums shared across brokers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange segment an instrument trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeSegment {
    /// NSE cash market.
    NseCm,
    /// NSE futures and options.
    NseFo,
    /// BSE cash market.
    BseCm,
    /// BSE futures and options.
    BseFo,
    /// MCX commodity futures.
    McxFo,
}

impl fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NseCm => write!(f, "NSECM"),
            Self::NseFo => write!(f, "NSEFO"),
            Self::BseCm => write!(f, "BSECM"),
            Self::BseFo => write!(f, "BSEFO"),
            Self::McxFo => write!(f, "MCXFO"),
        }
    }
}

impl std::str::FromStr for ExchangeSegment {
    type Err = String;

    /// Accepts both segment names (`NSECM`) and bare exchange names (`NSE`)
    /// as brokers report them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NSECM" | "NSE" => Ok(Self::NseCm),
            "NSEFO" | "NFO" => Ok(Self::NseFo),
            "BSECM" | "BSE" => Ok(Self::BseCm),
            "BSEFO" | "BFO" => Ok(Self::BseFo),
            "MCXFO" | "MCX" => Ok(Self::McxFo),
            other => Err(format!("unknown exchange segment '{other}'")),
        }
    }
}

/// Product type governing margining and carry-forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    /// Intraday (margin intraday square-off).
    Mis,
    /// Cash and carry (delivery).
    Cnc,
    /// Normal margin (overnight derivatives).
    Nrml,
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mis => write!(f, "MIS"),
            Self::Cnc => write!(f, "CNC"),
            Self::Nrml => write!(f, "NRML"),
        }
    }
}

impl std::str::FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MIS" => Ok(Self::Mis),
            "CNC" => Ok(Self::Cnc),
            "NRML" => Ok(Self::Nrml),
            other => Err(format!("unknown product type '{other}'")),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute at best available price.
    Market,
    /// Execute at the limit price or better.
    Limit,
    /// Stop-loss limit: becomes a limit order once the stop triggers.
    StopLimit,
    /// Stop-loss market: becomes a market order once the stop triggers.
    StopMarket,
}

impl OrderType {
    /// Whether this order type requires a limit price.
    #[must_use]
    pub const fn requires_limit_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    /// Whether this order type requires a stop (trigger) price.
    #[must_use]
    pub const fn requires_stop_price(&self) -> bool {
        matches!(self, Self::StopLimit | Self::StopMarket)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
            Self::StopMarket => write!(f, "STOP_MARKET"),
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Time-in-force policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for the trading day.
    Day,
    /// Immediate or cancel.
    Ioc,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "DAY"),
            Self::Ioc => write!(f, "IOC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_price_requirements() {
        assert!(OrderType::Limit.requires_limit_price());
        assert!(OrderType::StopLimit.requires_limit_price());
        assert!(!OrderType::Market.requires_limit_price());
        assert!(!OrderType::StopMarket.requires_limit_price());

        assert!(OrderType::StopLimit.requires_stop_price());
        assert!(OrderType::StopMarket.requires_stop_price());
        assert!(!OrderType::Limit.requires_stop_price());
    }

    #[test]
    fn display_forms() {
        assert_eq!(format!("{}", ExchangeSegment::NseCm), "NSECM");
        assert_eq!(format!("{}", ProductType::Mis), "MIS");
        assert_eq!(format!("{}", OrderType::StopMarket), "STOP_MARKET");
        assert_eq!(format!("{}", OrderSide::Sell), "SELL");
        assert_eq!(format!("{}", TimeInForce::Ioc), "IOC");
    }

    #[test]
    fn serde_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderType::StopLimit).unwrap(),
            "\"STOP_LIMIT\""
        );
        let side: OrderSide = serde_json::from_str("\"BUY\"").unwrap();
        assert_eq!(side, OrderSide::Buy);
    }
}
