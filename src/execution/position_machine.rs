use chrono::Local;

use crate::api::ExchangeGateway;
use crate::config::ContractsPerTrade;
use crate::engine::protocol::{convert_price, Directive, Request};
use crate::engine::EngineConnector;
use crate::execution::sizing::QuantityResolver;
use crate::models::{Candle, OrderRequest, OrderSide, PositionDirection, Ticker};
use crate::retry::RetryPolicy;
use crate::Result;

/// Limit orders are placed one price unit inside the spread.
const PRICE_OFFSET: f64 = 1.0;

/// At least one whole contract. Also false for NaN.
fn tradable(quantity: f64) -> bool {
    quantity.is_finite() && quantity >= 1.0
}

/// Turns live candles into engine ticks and engine directives into orders
///
/// The tracked direction is advisory and only feeds the logs. CLOSE is a
/// market close whatever the tracked direction says, and the startup flatten
/// makes the exchange account the only authority on the real position.
pub struct PositionStateMachine {
    symbol: String,
    direction: PositionDirection,
    resolver: QuantityResolver,
    ticker_retry: RetryPolicy,
}

impl PositionStateMachine {
    /// `symbol` is the engine-side instrument name.
    pub fn new(symbol: impl Into<String>, resolver: QuantityResolver, ticker_retry: RetryPolicy) -> Self {
        Self {
            symbol: symbol.into(),
            direction: PositionDirection::Unknown,
            resolver,
            ticker_retry,
        }
    }

    pub fn direction(&self) -> PositionDirection {
        self.direction
    }

    /// Forward one live candle to the engine and act on its reply.
    pub async fn on_candle(
        &mut self,
        candle: &Candle,
        connector: &mut EngineConnector,
        gateway: &dyn ExchangeGateway,
        contracts: &ContractsPerTrade,
    ) -> Result<Directive> {
        tracing::info!(
            "Received BID [{}] at time point [{}]",
            convert_price(candle.close),
            candle.timestamp
        );

        let request = Request::tick(&self.symbol, candle, Local::now());
        let response = connector.request(&request).await?;
        let ticker = gateway.ticker().await;

        let directive = Directive::parse(&response)?;
        self.apply(directive, ticker, gateway, contracts).await?;
        Ok(directive)
    }

    /// Execute `directive` against the exchange.
    ///
    /// `ticker` is the quote fetched alongside the tick; it is fetched again
    /// under the retry policy if it failed and an order needs it. A rejected
    /// order is logged and leaves the tracked direction alone.
    pub async fn apply(
        &mut self,
        directive: Directive,
        ticker: Result<Ticker>,
        gateway: &dyn ExchangeGateway,
        contracts: &ContractsPerTrade,
    ) -> Result<()> {
        match directive {
            Directive::Ok => Ok(()),
            Directive::Long => {
                let ticker = self.usable_ticker(ticker, gateway).await?;
                let quantity = self.resolver.resolve(contracts, gateway).await?;
                if !tradable(quantity) {
                    tracing::warn!("Engine requested LONG but order size is [{}], skipping", quantity);
                    return Ok(());
                }
                tracing::info!(
                    "Engine requested to open LONG position, buying: [{}] contracts",
                    quantity
                );
                let order = OrderRequest::limit(OrderSide::Buy, ticker.ask - PRICE_OFFSET, quantity);
                self.submit(order, PositionDirection::Long, gateway).await;
                Ok(())
            }
            Directive::Short => {
                let ticker = self.usable_ticker(ticker, gateway).await?;
                let quantity = self.resolver.resolve(contracts, gateway).await?;
                if !tradable(quantity) {
                    tracing::warn!("Engine requested SHORT but order size is [{}], skipping", quantity);
                    return Ok(());
                }
                tracing::info!(
                    "Engine requested to open SHORT position, selling: [{}] contracts",
                    quantity
                );
                let order = OrderRequest::limit(OrderSide::Sell, ticker.bid + PRICE_OFFSET, quantity);
                self.submit(order, PositionDirection::Short, gateway).await;
                Ok(())
            }
            Directive::Close => {
                tracing::info!("Engine requested close position (tracked: {})", self.direction);
                match gateway.close_position(None).await {
                    Ok(()) => self.direction = PositionDirection::Unknown,
                    Err(e) => tracing::error!("Unable to close position: {}", e),
                }
                Ok(())
            }
        }
    }

    async fn usable_ticker(
        &self,
        ticker: Result<Ticker>,
        gateway: &dyn ExchangeGateway,
    ) -> Result<Ticker> {
        match ticker {
            Ok(ticker) => Ok(ticker),
            Err(e) => {
                tracing::warn!("Ticker unavailable ({}), fetching again", e);
                self.ticker_retry
                    .run_exchange("getTicker", || gateway.ticker())
                    .await
            }
        }
    }

    async fn submit(
        &mut self,
        order: OrderRequest,
        direction: PositionDirection,
        gateway: &dyn ExchangeGateway,
    ) {
        match gateway.create_order(&order).await {
            Ok(()) => {
                tracing::info!(
                    side = %order.side,
                    price = ?order.price,
                    qty = order.quantity,
                    "Order placed"
                );
                self.direction = direction;
            }
            Err(e) => {
                tracing::error!(side = %order.side, error = %e, "Order submission failed");
            }
        }
    }
}
