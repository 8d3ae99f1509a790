use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::{sleep, Duration, Instant};

use crate::api::ExchangeGateway;
use crate::engine::protocol::Request;
use crate::engine::EngineConnector;
use crate::models::{Candle, Granularity};
use crate::retry::RetryPolicy;
use crate::Result;

/// Candles per chunk
pub const DEFAULT_CHUNK_SIZE: u32 = 750;
/// Chunks per backfill, about 7.8 days of 1-minute history with the default size
pub const DEFAULT_CHUNK_COUNT: u32 = 15;
/// Most candles BitMEX returns per bucketed request
pub const MAX_CHUNK_SIZE: u32 = 1000;
/// Upper bound on chunks per backfill, about 1.9 years at the maximum size
pub const MAX_CHUNK_COUNT: u32 = 1000;
/// Pause between chunk fetches to stay clear of the exchange rate limit
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_secs(2);

/// Statistics from a backfill operation
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillStats {
    pub chunks: usize,
    pub fetched_candles: usize,
    pub replayed_candles: usize,
    pub skipped_duplicates: usize,
    /// Newest candle handed to the engine
    pub last_candle: Option<Candle>,
}

/// End time of every chunk, oldest first.
///
/// Chunk `i` ends at `now - 60 * once * (qty - i - 1)` seconds, so the last
/// chunk ends exactly at `now`.
pub fn chunk_end_times(now: DateTime<Utc>, once: u32, qty: u32) -> Vec<DateTime<Utc>> {
    (0..qty)
        .map(|i| {
            let back = Granularity::OneMinute.seconds() * once as i64 * (qty - i - 1) as i64;
            now - ChronoDuration::seconds(back)
        })
        .collect()
}

/// Feeds the decision engine enough history before live trading starts
pub struct BackfillSequencer {
    symbol: String,
    chunk_size: u32,
    chunk_count: u32,
    chunk_delay: Duration,
    retry: RetryPolicy,
}

impl BackfillSequencer {
    /// `symbol` is the engine-side instrument name.
    ///
    /// `chunk_size` is clamped to `1..=MAX_CHUNK_SIZE` so chunks never leave
    /// gaps, and `chunk_count` to `MAX_CHUNK_COUNT`.
    pub fn new(symbol: impl Into<String>, chunk_size: u32, chunk_count: u32) -> Self {
        let clamped_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        if clamped_size != chunk_size {
            tracing::warn!(
                "History chunk size {} out of range, using {}",
                chunk_size,
                clamped_size
            );
        }
        let clamped_count = chunk_count.min(MAX_CHUNK_COUNT);
        if clamped_count != chunk_count {
            tracing::warn!(
                "History chunk count {} too large, using {}",
                chunk_count,
                clamped_count
            );
        }

        Self {
            symbol: symbol.into(),
            chunk_size: clamped_size,
            chunk_count: clamped_count,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            retry: RetryPolicy::exchange(),
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every chunk, oldest first, and concatenate them.
    pub async fn fetch_history(&self, gateway: &dyn ExchangeGateway) -> Result<Vec<Candle>> {
        let ends = chunk_end_times(Utc::now(), self.chunk_size, self.chunk_count);
        let mut candles = Vec::new();

        for (i, end) in ends.iter().enumerate() {
            tracing::info!(
                "Receiving history candles, chunk #{} of {} (ending {})",
                i + 1,
                ends.len(),
                end.format("%Y-%m-%d %H:%M")
            );

            let chunk = self
                .retry
                .run_exchange("getCandles", || {
                    gateway.candles(Granularity::OneMinute, self.chunk_size, Some(*end))
                })
                .await?;
            tracing::debug!("Chunk #{} brought {} candles", i + 1, chunk.len());
            candles.extend(chunk);

            if i + 1 < ends.len() {
                sleep(self.chunk_delay).await;
            }
        }

        Ok(candles)
    }

    /// Replay `candles` as `HISTORICAL_TICK`s; every reply must be `OK`.
    ///
    /// Candles not strictly newer than the last one replayed are skipped, so
    /// the engine sees each minute once and in order.
    pub async fn replay(
        &self,
        candles: Vec<Candle>,
        connector: &mut EngineConnector,
    ) -> Result<BackfillStats> {
        let mut stats = BackfillStats {
            chunks: self.chunk_count as usize,
            fetched_candles: candles.len(),
            replayed_candles: 0,
            skipped_duplicates: 0,
            last_candle: None,
        };

        for candle in candles {
            if let Some(last) = &stats.last_candle {
                if candle.timestamp <= last.timestamp {
                    stats.skipped_duplicates += 1;
                    continue;
                }
            }

            let request = Request::historical_tick(&self.symbol, &candle);
            tracing::debug!("Sending historical tick [{}] at time point [{}]", request, candle.timestamp);
            connector.request_ok(&request).await?;

            stats.replayed_candles += 1;
            stats.last_candle = Some(candle);
        }

        if stats.skipped_duplicates > 0 {
            tracing::warn!(
                "Skipped {} out-of-order or duplicate historical candles",
                stats.skipped_duplicates
            );
        }

        Ok(stats)
    }

    /// Fetch and replay the whole history.
    pub async fn run(
        &self,
        gateway: &dyn ExchangeGateway,
        connector: &mut EngineConnector,
    ) -> Result<BackfillStats> {
        let started = Instant::now();

        let candles = self.fetch_history(gateway).await?;
        tracing::info!(
            "Got [{}] historical candles for instrument {}",
            candles.len(),
            self.symbol
        );

        let stats = self.replay(candles, connector).await?;
        tracing::info!(
            "Finished acquiring & applying data after {} seconds",
            started.elapsed().as_secs()
        );

        Ok(stats)
    }
}
