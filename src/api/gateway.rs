use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Candle, Granularity, Margin, OrderRequest, OrderSide, Ticker};
use crate::Result;

/// Abstraction over the exchange account the bridge trades on.
///
/// `BitMexClient` implements this against the REST API. Failures that are
/// worth retrying come back as [`crate::BridgeError::Exchange`], refusals as
/// [`crate::BridgeError::Rejected`]; callers own the retry discipline.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Current account margin.
    async fn margin(&self) -> Result<Margin>;

    /// Best bid/ask for the traded instrument.
    async fn ticker(&self) -> Result<Ticker>;

    /// Up to `count` closed candles ending at `end_time` (or now), oldest first.
    async fn candles(
        &self,
        granularity: Granularity,
        count: u32,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>>;

    async fn set_leverage(&self, leverage: u8) -> Result<()>;

    async fn create_order(&self, order: &OrderRequest) -> Result<()>;

    /// Close the open position at market. `None` closes whatever side is open.
    async fn close_position(&self, side: Option<OrderSide>) -> Result<()>;
}
