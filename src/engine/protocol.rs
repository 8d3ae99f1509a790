use chrono::{DateTime, TimeZone};
use std::fmt;

use crate::error::BridgeError;
use crate::models::Candle;
use crate::Result;

/// Convert an exchange quote to the engine's price scale.
///
/// `floor(raw * 10) / 100000`, truncating toward negative infinity.
pub fn convert_price(raw: f64) -> f64 {
    (raw * 10.0).floor() / 100_000.0
}

/// One line sent to the decision engine
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Subscribe {
        symbol: String,
    },
    HistoricalTick {
        symbol: String,
        price: f64,
    },
    Tick {
        symbol: String,
        /// `YYYY-mm-dd HH:MM:SS.000`
        timestamp: String,
        price: f64,
    },
    HciSetup {
        symbol: String,
        enabled: bool,
    },
}

impl Request {
    pub fn historical_tick(symbol: &str, candle: &Candle) -> Self {
        Request::HistoricalTick {
            symbol: symbol.to_string(),
            price: convert_price(candle.close),
        }
    }

    /// Live tick stamped with the bridge's wall clock at send time.
    pub fn tick<Tz>(symbol: &str, candle: &Candle, now: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Request::Tick {
            symbol: symbol.to_string(),
            timestamp: now.format("%Y-%m-%d %H:%M:%S.000").to_string(),
            price: convert_price(candle.close),
        }
    }

    /// Wire form without the trailing newline.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Subscribe { symbol } => write!(f, "SUBSCRIBE;{}", symbol),
            Request::HistoricalTick { symbol, price } => {
                write!(f, "HISTORICAL_TICK;{};{}", symbol, price)
            }
            Request::Tick {
                symbol,
                timestamp,
                price,
            } => write!(f, "TICK;{};{};{};1;dummy", symbol, timestamp, price),
            Request::HciSetup { symbol, enabled } => {
                let state = if *enabled { "hci_on" } else { "hci_off" };
                write!(f, "HCI_SETUP;{};{}", symbol, state)
            }
        }
    }
}

/// What the engine wants done after a live tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Ok,
    Long,
    Short,
    Close,
}

impl Directive {
    pub fn parse(response: &str) -> Result<Self> {
        match response {
            "OK" => Ok(Directive::Ok),
            "LONG" => Ok(Directive::Long),
            "SHORT" => Ok(Directive::Short),
            "CLOSE" => Ok(Directive::Close),
            other => Err(BridgeError::Protocol(other.to_string())),
        }
    }
}

/// Fail with a protocol error unless the engine answered exactly `OK`.
pub fn expect_ok(response: &str) -> Result<()> {
    match response {
        "OK" => Ok(()),
        other => Err(BridgeError::Protocol(other.to_string())),
    }
}
