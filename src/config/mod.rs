// Bridge configuration: loading, validation and hot-reload
pub mod reconciler;

pub use reconciler::{ConfigReconciler, ReloadOutcome};

use crate::error::BridgeError;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hft/bitmex-bridge-config.json";

const DEFAULT_LEVERAGE: u8 = 1;
const MAX_LEVERAGE: u8 = 100;

/// Which BitMEX environment to trade against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    /// testnet.bitmex.com
    Test,
    /// www.bitmex.com
    Prod,
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeMode::Test => write!(f, "test"),
            TradeMode::Prod => write!(f, "prod"),
        }
    }
}

/// Order size policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContractsPerTrade {
    /// Always trade this many contracts.
    Fixed(f64),
    /// Exponential sizing: `U` contracts at balance `K0`, times `k` for every
    /// doubling of the balance.
    Scaled {
        #[serde(rename = "K0")]
        k0: f64,
        #[serde(rename = "U")]
        u: f64,
        k: f64,
    },
}

impl fmt::Display for ContractsPerTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractsPerTrade::Fixed(n) => write!(f, "{}", n),
            ContractsPerTrade::Scaled { k0, u, k } => write!(f, "{{K0: {}, U: {}, k: {}}}", k0, u, k),
        }
    }
}

/// Exchange API credentials. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ApiCredentials {
    pub key: String,
    pub secret: String,
}

impl ApiCredentials {
    /// First four characters of the key, rest starred out.
    pub fn masked_key(&self) -> String {
        let shown: String = self.key.chars().take(4).collect();
        let hidden = self.key.chars().count().saturating_sub(4);
        format!("{}{}", shown, "*".repeat(hidden))
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("key", &self.masked_key())
            .field("secret", &"<snipped>")
            .finish()
    }
}

/// Validated bridge configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub leverage: u8,
    pub trade_mode: TradeMode,
    pub contracts_per_trade: ContractsPerTrade,
    pub api: ApiCredentials,
}

/// The file as written by the user, before any validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    leverage: Option<Value>,
    trade_mode: Option<Value>,
    contracts_per_trade: Option<Value>,
    #[serde(rename = "API")]
    api: Option<Value>,
}

impl BridgeConfig {
    /// Read and validate the configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            BridgeError::Config(format!(
                "Unable to load configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&data).map_err(|e| match e {
            BridgeError::Config(msg) => BridgeError::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Parse and validate a configuration document.
    ///
    /// Missing `leverage` and `trade_mode` fall back to their defaults with a
    /// warning; every other problem is a [`BridgeError::Config`].
    pub fn from_json(data: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(data)
            .map_err(|e| BridgeError::Config(format!("Syntax error in json: {}", e)))?;

        let leverage = match raw.leverage {
            None => {
                tracing::warn!("Undefined leverage, assume default: {}", DEFAULT_LEVERAGE);
                DEFAULT_LEVERAGE
            }
            Some(value) => parse_leverage(&value)?,
        };

        let trade_mode = match raw.trade_mode {
            None => {
                tracing::warn!("Undefined trade_mode, assume default [test]");
                TradeMode::Test
            }
            Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
                BridgeError::Config(format!(
                    "trade_mode must be set to prod for production or test for testnet, given {}",
                    value
                ))
            })?,
        };

        let contracts_per_trade = parse_contracts_per_trade(raw.contracts_per_trade)?;
        let api = parse_api(raw.api)?;

        Ok(Self {
            leverage,
            trade_mode,
            contracts_per_trade,
            api,
        })
    }

    pub fn log_summary(&self) {
        tracing::info!("User config: leverage ............. {}", self.leverage);
        tracing::info!("User config: trade mode ........... {}", self.trade_mode);
        tracing::info!("User config: contracts per trade .. {}", self.contracts_per_trade);
        tracing::info!("User config: API key .............. {}", self.api.masked_key());
        tracing::info!("User config: API secret ........... (defined, but snipped)");
    }
}

fn parse_leverage(value: &Value) -> Result<u8> {
    let out_of_range =
        || BridgeError::Config(format!("Leverage must be within [0..{}], given {}", MAX_LEVERAGE, value));

    let n = value.as_f64().ok_or_else(out_of_range)?;
    if n.fract() != 0.0 || n < 0.0 || n > MAX_LEVERAGE as f64 {
        return Err(out_of_range());
    }
    Ok(n as u8)
}

fn parse_contracts_per_trade(value: Option<Value>) -> Result<ContractsPerTrade> {
    let invalid = |given: &str| {
        BridgeError::Config(format!(
            "contracts_per_trade must be positive number or object having K0, U, k. Given {}",
            given
        ))
    };

    let value = value.ok_or_else(|| invalid("nothing"))?;
    let parsed: ContractsPerTrade =
        serde_json::from_value(value.clone()).map_err(|_| invalid(&value.to_string()))?;

    match parsed {
        ContractsPerTrade::Fixed(n) if n > 0.0 && n.is_finite() => Ok(parsed),
        ContractsPerTrade::Fixed(_) => Err(invalid(&value.to_string())),
        ContractsPerTrade::Scaled { k0, u, k }
            if [k0, u, k].iter().all(|x| *x > 0.0 && x.is_finite()) =>
        {
            Ok(parsed)
        }
        ContractsPerTrade::Scaled { .. } => Err(invalid(&value.to_string())),
    }
}

fn parse_api(value: Option<Value>) -> Result<ApiCredentials> {
    let section = match value {
        Some(Value::Object(map)) => map,
        _ => {
            return Err(BridgeError::Config(
                "Undefined Bitmex API informations.".to_string(),
            ))
        }
    };

    let field = |name: &str| match section.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(BridgeError::Config(format!(
            "Undefined API.{} or is defined not as a string.",
            name
        ))),
    };

    Ok(ApiCredentials {
        key: field("key")?,
        secret: field("secret")?,
    })
}
