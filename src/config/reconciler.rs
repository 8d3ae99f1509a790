use std::path::PathBuf;

use crate::api::ExchangeGateway;
use crate::config::BridgeConfig;
use crate::Result;

/// What a steady-state reload did
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    /// New config is active; leverage was unchanged.
    Applied,
    /// New config is active and the exchange accepted the new leverage.
    LeverageChanged { from: u8, to: u8 },
    /// Exchange refused the new leverage. The rest of the new config is
    /// active; the old leverage is kept so the change is retried next cycle.
    LeverageRejected { wanted: u8, kept: u8 },
    /// File unreadable or invalid; the previous config stays active.
    Invalid(String),
}

/// Owns the active configuration and keeps it in sync with the file on disk
pub struct ConfigReconciler {
    path: PathBuf,
    active: BridgeConfig,
}

impl ConfigReconciler {
    /// First load. Any error here is fatal to the caller.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let active = BridgeConfig::load(&path).await?;
        active.log_summary();
        Ok(Self { path, active })
    }

    /// Wrap an already validated config (tests, embedding).
    pub fn with_config(path: impl Into<PathBuf>, active: BridgeConfig) -> Self {
        Self {
            path: path.into(),
            active,
        }
    }

    pub fn active(&self) -> &BridgeConfig {
        &self.active
    }

    /// Re-read the file and push a leverage change to the exchange.
    ///
    /// Never fails: a bad file or a refused leverage is logged and reported
    /// through the returned [`ReloadOutcome`].
    pub async fn reconcile(&mut self, gateway: &dyn ExchangeGateway) -> ReloadOutcome {
        let mut fresh = match BridgeConfig::load(&self.path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{}", e);
                return ReloadOutcome::Invalid(e.to_string());
            }
        };

        if fresh.trade_mode != self.active.trade_mode || fresh.api != self.active.api {
            tracing::warn!(
                "trade_mode or API credentials changed in {}; restart the bridge to apply",
                self.path.display()
            );
            fresh.trade_mode = self.active.trade_mode;
            fresh.api = self.active.api.clone();
        }

        let from = self.active.leverage;
        let to = fresh.leverage;
        let outcome = if from == to {
            ReloadOutcome::Applied
        } else {
            match gateway.set_leverage(to).await {
                Ok(()) => {
                    tracing::info!("Have setup leverage to {} (was {})", to, from);
                    ReloadOutcome::LeverageChanged { from, to }
                }
                Err(e) => {
                    tracing::error!("Unable to setup leverage [{}]: {}", to, e);
                    fresh.leverage = from;
                    ReloadOutcome::LeverageRejected {
                        wanted: to,
                        kept: from,
                    }
                }
            }
        };

        if fresh.contracts_per_trade != self.active.contracts_per_trade {
            tracing::info!(
                "contracts_per_trade changed to {}, effective on next order",
                fresh.contracts_per_trade
            );
        }

        self.active = fresh;
        outcome
    }
}
