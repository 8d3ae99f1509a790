use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::api::ExchangeGateway;
use crate::models::{Candle, Granularity};
use crate::Result;

/// Waits for the next closed candle
///
/// Polling is the shipped strategy; a streaming feed can stand in for it
/// without touching the state machine.
#[async_trait]
pub trait CandleFeed: Send {
    /// Block until a candle different from the last one yielded is available.
    async fn next_candle(&mut self) -> Result<Candle>;

    /// Remember the newest candle already delivered elsewhere (backfill) so it
    /// is not yielded again.
    fn seed(&mut self, _last_seen: &Candle) {}
}

/// Polls the exchange for the latest 1-minute candle
pub struct PollingCandleFeed {
    gateway: Arc<dyn ExchangeGateway>,
    previous: Option<Candle>,
    poll_interval: Duration,
    retry_interval: Duration,
}

impl PollingCandleFeed {
    pub fn new(gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            gateway,
            previous: None,
            poll_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(2),
        }
    }

    /// Override the unchanged-candle and failed-fetch sleeps.
    pub fn with_intervals(mut self, poll_interval: Duration, retry_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.retry_interval = retry_interval;
        self
    }
}

#[async_trait]
impl CandleFeed for PollingCandleFeed {
    async fn next_candle(&mut self) -> Result<Candle> {
        loop {
            let latest = match self.gateway.candles(Granularity::OneMinute, 1, None).await {
                Ok(mut candles) => candles.pop(),
                Err(e) => {
                    tracing::debug!("Candle poll failed: {}", e);
                    None
                }
            };

            match latest {
                None => {
                    tracing::warn!("Unable to get candle, will retry");
                    sleep(self.retry_interval).await;
                }
                Some(candle) if self.previous.as_ref() == Some(&candle) => {
                    sleep(self.poll_interval).await;
                }
                Some(candle) => {
                    self.previous = Some(candle.clone());
                    return Ok(candle);
                }
            }
        }
    }

    fn seed(&mut self, last_seen: &Candle) {
        self.previous = Some(last_seen.clone());
    }
}
