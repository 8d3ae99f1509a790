use std::convert::Infallible;
use std::sync::Arc;

use tokio::time::Duration;

use crate::api::ExchangeGateway;
use crate::backfill::{
    BackfillSequencer, BackfillStats, DEFAULT_CHUNK_COUNT, DEFAULT_CHUNK_DELAY, DEFAULT_CHUNK_SIZE,
};
use crate::config::{BridgeConfig, ConfigReconciler};
use crate::engine::protocol::{Directive, Request};
use crate::engine::EngineConnector;
use crate::error::BridgeError;
use crate::execution::{CandleFeed, PositionStateMachine, QuantityResolver};
use crate::models::PositionDirection;
use crate::retry::RetryPolicy;
use crate::Result;

/// Knobs of a bridge session that do not live in the config file
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Instrument name on the engine side
    pub engine_symbol: String,
    pub history_chunk_size: u32,
    pub history_chunk_count: u32,
    pub history_chunk_delay: Duration,
    /// Switch the engine's HCI filter off for the backfill and back on after
    pub hci_toggle: bool,
    pub connect_retry: RetryPolicy,
    pub exchange_retry: RetryPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            engine_symbol: "XBT/USD".to_string(),
            history_chunk_size: DEFAULT_CHUNK_SIZE,
            history_chunk_count: DEFAULT_CHUNK_COUNT,
            history_chunk_delay: DEFAULT_CHUNK_DELAY,
            hci_toggle: false,
            connect_retry: RetryPolicy::engine_connect(),
            exchange_retry: RetryPolicy::exchange(),
        }
    }
}

/// One bridge session: owns the engine socket, the exchange handle, the active
/// config and the position state, and drives them in a single control flow.
pub struct Bridge {
    settings: BridgeSettings,
    gateway: Arc<dyn ExchangeGateway>,
    reconciler: ConfigReconciler,
    connector: EngineConnector,
    machine: PositionStateMachine,
    feed: Box<dyn CandleFeed>,
}

impl Bridge {
    /// Connect to the decision engine on `port`.
    pub async fn connect(
        settings: BridgeSettings,
        reconciler: ConfigReconciler,
        gateway: Arc<dyn ExchangeGateway>,
        feed: Box<dyn CandleFeed>,
        port: u16,
    ) -> Result<Self> {
        let connector = EngineConnector::connect(port, settings.connect_retry).await?;
        let machine = PositionStateMachine::new(
            settings.engine_symbol.clone(),
            QuantityResolver::new(settings.exchange_retry),
            settings.exchange_retry,
        );

        Ok(Self {
            settings,
            gateway,
            reconciler,
            connector,
            machine,
            feed,
        })
    }

    pub fn direction(&self) -> PositionDirection {
        self.machine.direction()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.reconciler.active()
    }

    /// Flatten the account, set leverage, subscribe and replay history.
    pub async fn startup(&mut self) -> Result<BackfillStats> {
        let gateway = Arc::clone(&self.gateway);
        let gateway = gateway.as_ref();

        // Anything left open by a crash or downtime goes first. A flat
        // account may refuse the close, so this never stops startup.
        match self
            .settings
            .exchange_retry
            .run_exchange("closePosition", || gateway.close_position(None))
            .await
        {
            Ok(()) => tracing::info!("Closed any position left open on the exchange"),
            Err(e) => tracing::warn!("Startup close not applied, continuing: {}", e),
        }

        let leverage = self.reconciler.active().leverage;
        if let Err(e) = gateway.set_leverage(leverage).await {
            tracing::error!("Unable to setup leverage [{}]: {}", leverage, e);
            return Err(BridgeError::Leverage(leverage));
        }
        tracing::info!("Have setup leverage to {}", leverage);

        let symbol = self.settings.engine_symbol.clone();
        self.connector
            .request_ok(&Request::Subscribe {
                symbol: symbol.clone(),
            })
            .await?;
        tracing::info!("Subscribed instrument {}", symbol);

        if self.settings.hci_toggle {
            self.set_hci(false).await?;
        }

        let sequencer = BackfillSequencer::new(
            symbol,
            self.settings.history_chunk_size,
            self.settings.history_chunk_count,
        )
        .with_chunk_delay(self.settings.history_chunk_delay)
        .with_retry(self.settings.exchange_retry);
        let stats = sequencer.run(gateway, &mut self.connector).await?;

        if self.settings.hci_toggle {
            self.set_hci(true).await?;
        }

        if let Some(last) = &stats.last_candle {
            self.feed.seed(last);
        }

        Ok(stats)
    }

    /// One steady-state iteration: wait for a candle, reload config, tick.
    pub async fn step(&mut self) -> Result<Directive> {
        let candle = self.feed.next_candle().await?;

        self.reconciler.reconcile(self.gateway.as_ref()).await;

        let contracts = self.reconciler.active().contracts_per_trade;
        self.machine
            .on_candle(&candle, &mut self.connector, self.gateway.as_ref(), &contracts)
            .await
    }

    /// Start up and trade until a fatal error.
    pub async fn run(mut self) -> Result<Infallible> {
        self.startup().await?;
        loop {
            self.step().await?;
        }
    }

    async fn set_hci(&mut self, enabled: bool) -> Result<()> {
        let request = Request::HciSetup {
            symbol: self.settings.engine_symbol.clone(),
            enabled,
        };
        self.connector.request_ok(&request).await?;
        tracing::info!("{}", request);
        Ok(())
    }
}
