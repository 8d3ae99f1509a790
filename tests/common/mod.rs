#![allow(dead_code)]

use async_trait::async_trait;
use bitmex_bridge::{
    BridgeError, Candle, ExchangeGateway, Granularity, Margin, OrderRequest, OrderSide, Result,
    Ticker,
};
use chrono::{DateTime, Duration, DurationRound, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Every call the bridge made on the gateway, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Margin,
    Ticker,
    Candles {
        count: u32,
        end_time: Option<DateTime<Utc>>,
    },
    SetLeverage(u8),
    CreateOrder(OrderRequest),
    ClosePosition(Option<OrderSide>),
}

struct State {
    calls: Vec<Call>,
    ticker: Ticker,
    margin: Margin,
    margin_failures: u32,
    ticker_failures: u32,
    leverage_ok: bool,
    orders_ok: bool,
    closes_ok: bool,
    /// Scripted answers to live (end_time = None) polls; `None` is a failure
    live: VecDeque<Option<Candle>>,
    last_live: Option<Candle>,
}

/// In-memory exchange with scripted answers
pub struct MockGateway {
    state: Mutex<State>,
}

pub fn candle_at(timestamp: DateTime<Utc>, close: f64) -> Candle {
    Candle {
        timestamp,
        symbol: "XBTUSD".to_string(),
        open: close,
        high: close,
        low: close,
        close,
        volume: 100.0,
    }
}

pub fn minute(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(n)
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                calls: Vec::new(),
                ticker: Ticker {
                    bid: 8650.0,
                    ask: 8651.0,
                },
                margin: Margin {
                    margin_balance: 400_000_000,
                },
                margin_failures: 0,
                ticker_failures: 0,
                leverage_ok: true,
                orders_ok: true,
                closes_ok: true,
                live: VecDeque::new(),
                last_live: None,
            }),
        }
    }

    pub fn with_ticker(self, bid: f64, ask: f64) -> Self {
        self.state.lock().unwrap().ticker = Ticker { bid, ask };
        self
    }

    pub fn with_margin(self, margin_balance: i64) -> Self {
        self.state.lock().unwrap().margin = Margin { margin_balance };
        self
    }

    pub fn failing_margin(self, times: u32) -> Self {
        self.state.lock().unwrap().margin_failures = times;
        self
    }

    pub fn failing_ticker(self, times: u32) -> Self {
        self.state.lock().unwrap().ticker_failures = times;
        self
    }

    pub fn rejecting_leverage(self) -> Self {
        self.state.lock().unwrap().leverage_ok = false;
        self
    }

    pub fn rejecting_orders(self) -> Self {
        self.state.lock().unwrap().orders_ok = false;
        self
    }

    /// Refuse every close the way BitMEX does on a flat account.
    pub fn rejecting_close(self) -> Self {
        self.state.lock().unwrap().closes_ok = false;
        self
    }

    /// Queue answers for live candle polls.
    pub fn with_live(self, polls: Vec<Option<Candle>>) -> Self {
        self.state.lock().unwrap().live.extend(polls);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateOrder(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, Call::ClosePosition(_)))
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn margin(&self) -> Result<Margin> {
        self.record(Call::Margin);
        let mut state = self.state.lock().unwrap();
        if state.margin_failures > 0 {
            state.margin_failures -= 1;
            return Err(BridgeError::Exchange("HTTP 503: margin".into()));
        }
        Ok(state.margin)
    }

    async fn ticker(&self) -> Result<Ticker> {
        self.record(Call::Ticker);
        let mut state = self.state.lock().unwrap();
        if state.ticker_failures > 0 {
            state.ticker_failures -= 1;
            return Err(BridgeError::Exchange("HTTP 503: instrument".into()));
        }
        Ok(state.ticker)
    }

    async fn candles(
        &self,
        _granularity: Granularity,
        count: u32,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>> {
        self.record(Call::Candles { count, end_time });

        match end_time {
            // History: `count` consecutive minutes ending at the minute of `end`
            Some(end) => {
                let end = end.duration_trunc(Duration::minutes(1)).unwrap();
                Ok((0..count as i64)
                    .map(|j| {
                        let ts = end - Duration::minutes(count as i64 - 1 - j);
                        candle_at(ts, 8000.0 + (ts.timestamp() / 60 % 1000) as f64)
                    })
                    .collect())
            }
            None => {
                let mut state = self.state.lock().unwrap();
                let next = match state.live.pop_front() {
                    Some(scripted) => scripted,
                    None => state.last_live.clone(),
                };
                match next {
                    Some(candle) => {
                        state.last_live = Some(candle.clone());
                        Ok(vec![candle])
                    }
                    None => Err(BridgeError::Exchange("HTTP 502: bucketed".into())),
                }
            }
        }
    }

    async fn set_leverage(&self, leverage: u8) -> Result<()> {
        self.record(Call::SetLeverage(leverage));
        if self.state.lock().unwrap().leverage_ok {
            Ok(())
        } else {
            Err(BridgeError::Rejected("HTTP 400: leverage".into()))
        }
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<()> {
        self.record(Call::CreateOrder(order.clone()));
        if self.state.lock().unwrap().orders_ok {
            Ok(())
        } else {
            Err(BridgeError::Rejected("HTTP 400: insufficient margin".into()))
        }
    }

    async fn close_position(&self, side: Option<OrderSide>) -> Result<()> {
        self.record(Call::ClosePosition(side));
        if self.state.lock().unwrap().closes_ok {
            Ok(())
        } else {
            Err(BridgeError::Rejected(
                "HTTP 400: Account has no XBTUSD position".into(),
            ))
        }
    }
}

type Replier = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Loopback decision engine answering each line with `reply(line)`
///
/// The join handle yields every line received once the bridge hangs up.
pub struct MockEngine {
    pub port: u16,
    pub handle: JoinHandle<Vec<String>>,
}

impl MockEngine {
    pub async fn spawn(reply: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        let reply: Replier = Arc::new(reply);
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut received = Vec::new();

            loop {
                let mut line = String::new();
                match socket.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = line.trim_end().to_string();
                        let answer = format!("{}\n", reply(&line));
                        received.push(line);
                        if socket.get_mut().write_all(answer.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            received
        });

        Self { port, handle }
    }

    /// Answers `OK` to everything.
    pub async fn always_ok() -> Self {
        Self::spawn(|_| "OK".to_string()).await
    }
}

/// Write `json` to a fresh file under the temp dir.
pub fn write_config(json: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("bitmex-bridge-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, json).unwrap();
    path
}

pub fn config_json(leverage: u8, contracts: &str) -> String {
    format!(
        r#"{{
            "leverage": {},
            "trade_mode": "test",
            "contracts_per_trade": {},
            "API": {{ "key": "uu6Yw37AN1tE3RU1m9AG_0xK", "secret": "wUd_wzwJ-L3oB5Ou3p4Vzei2" }}
        }}"#,
        leverage, contracts
    )
}
