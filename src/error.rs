use thiserror::Error;

/// Every failure the bridge can run into.
///
/// Only [`BridgeError::Exchange`] is worth retrying: transport failures,
/// 5xx and 429. A 4xx refusal is [`BridgeError::Rejected`]. The retry loops in
/// [`crate::retry`] turn an exhausted run of those into
/// [`BridgeError::ExchangeUnavailable`]. Everything else is fatal and is
/// propagated up to the control loop.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Bad config: {0}")]
    Config(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Cannot connect to decision engine: {0}")]
    Connection(String),

    #[error("Decision engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Got unexpected response from decision engine: [{0}]")]
    Protocol(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("Exchange rejected request: {0}")]
    Rejected(String),

    #[error("Exchange unavailable: {0}")]
    ExchangeUnavailable(String),

    #[error("Unable to setup leverage [{0}]")]
    Leverage(u8),
}

impl BridgeError {
    /// Transient, network or quota shaped failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Exchange(_))
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::Exchange(e.to_string())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
