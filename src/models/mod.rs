use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV bucket from the exchange
///
/// `timestamp` is whatever the exchange stamps the bucket with; two polls
/// returning structurally equal candles mean no new minute closed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    OneMinute,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
        }
    }
}

/// Best bid/ask snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
}

/// Account margin snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    /// Satoshi (XBt)
    pub margin_balance: i64,
}

impl Margin {
    /// Balance in the units position sizing is keyed to (mXBT).
    pub fn balance(&self) -> f64 {
        self.margin_balance as f64 / 100_000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "Limit"),
            OrderType::Market => write!(f, "Market"),
        }
    }
}

/// An order to be placed on the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub order_type: OrderType,
    pub side: OrderSide,
    /// `None` for market orders.
    pub price: Option<f64>,
    pub quantity: f64,
}

impl OrderRequest {
    pub fn limit(side: OrderSide, price: f64, quantity: f64) -> Self {
        Self {
            order_type: OrderType::Limit,
            side,
            price: Some(price),
            quantity,
        }
    }
}

/// Locally tracked position side
///
/// Bookkeeping only: the exchange account is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionDirection {
    #[default]
    Unknown,
    Long,
    Short,
}

impl fmt::Display for PositionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionDirection::Unknown => write!(f, "UNKNOWN"),
            PositionDirection::Long => write!(f, "LONG"),
            PositionDirection::Short => write!(f, "SHORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(minute: u32, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2020, 3, 1, 12, minute, 0).unwrap(),
            symbol: "XBTUSD".to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_candle_equality_detects_new_minute() {
        assert_eq!(candle(1, 8650.5), candle(1, 8650.5));
        assert_ne!(candle(1, 8650.5), candle(2, 8650.5));
        // Same minute re-polled after a late trade still counts as new data
        assert_ne!(candle(1, 8650.5), candle(1, 8651.0));
    }

    #[test]
    fn test_margin_balance_in_mxbt() {
        let margin = Margin {
            margin_balance: 400_000_000,
        };
        assert_eq!(margin.balance(), 4000.0);
    }

    #[test]
    fn test_position_direction_defaults_to_unknown() {
        assert_eq!(PositionDirection::default(), PositionDirection::Unknown);
        assert_eq!(PositionDirection::Long.to_string(), "LONG");
    }
}
