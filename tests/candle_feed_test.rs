mod common;

use bitmex_bridge::execution::{CandleFeed, PollingCandleFeed};
use bitmex_bridge::ExchangeGateway;
use common::{candle_at, minute, Call, MockGateway};
use std::sync::Arc;
use tokio::time::Duration;

fn live_polls(gateway: &MockGateway) -> usize {
    gateway.count(|c| matches!(c, Call::Candles { end_time: None, .. }))
}

#[tokio::test]
async fn test_first_poll_yields_latest_candle() {
    let gateway = Arc::new(MockGateway::new().with_live(vec![Some(candle_at(minute(3), 1.0))]));
    let mut feed = PollingCandleFeed::new(gateway.clone() as Arc<dyn ExchangeGateway>)
        .with_intervals(Duration::ZERO, Duration::ZERO);

    let candle = feed.next_candle().await.unwrap();

    assert_eq!(candle.timestamp, minute(3));
    assert_eq!(live_polls(&gateway), 1);
}

#[tokio::test]
async fn test_waits_out_failures_and_unchanged_candles() {
    let seen = candle_at(minute(0), 800_000.0);
    let fresh = candle_at(minute(1), 800_100.0);
    let gateway = Arc::new(MockGateway::new().with_live(vec![
        None,
        Some(seen.clone()),
        None,
        Some(seen.clone()),
        Some(fresh.clone()),
    ]));
    let mut feed = PollingCandleFeed::new(gateway.clone() as Arc<dyn ExchangeGateway>)
        .with_intervals(Duration::ZERO, Duration::ZERO);
    feed.seed(&seen);

    let candle = feed.next_candle().await.unwrap();

    assert_eq!(candle, fresh);
    assert_eq!(live_polls(&gateway), 5);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_candle_polls_every_ten_seconds() {
    let seen = candle_at(minute(0), 800_000.0);
    let fresh = candle_at(minute(1), 800_100.0);
    let gateway = Arc::new(MockGateway::new().with_live(vec![
        Some(seen.clone()),
        Some(seen.clone()),
        Some(fresh),
    ]));
    let mut feed = PollingCandleFeed::new(gateway.clone() as Arc<dyn ExchangeGateway>);
    feed.seed(&seen);

    let started = tokio::time::Instant::now();
    feed.next_candle().await.unwrap();

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(20), "waited {:?}", waited);
    assert!(waited < Duration::from_secs(21), "waited {:?}", waited);
}
