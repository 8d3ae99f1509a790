use crate::api::ExchangeGateway;
use crate::config::ContractsPerTrade;
use crate::retry::RetryPolicy;
use crate::Result;

/// `floor(U * k^(log2(balance / K0)))`
///
/// `U` contracts at the baseline balance `K0`, multiplied by `k` for every
/// doubling of the balance above it.
pub fn scaled_quantity(k0: f64, u: f64, k: f64, balance: f64) -> f64 {
    (u * k.powf((balance / k0).ln() / 2f64.ln())).floor()
}

/// Resolves the configured order size into a contract count
pub struct QuantityResolver {
    margin_retry: RetryPolicy,
}

impl QuantityResolver {
    pub fn new(margin_retry: RetryPolicy) -> Self {
        Self { margin_retry }
    }

    /// Fixed sizes come back as-is; scaled sizes fetch the margin balance,
    /// retrying transient failures before giving up with
    /// [`crate::BridgeError::ExchangeUnavailable`].
    pub async fn resolve(
        &self,
        contracts: &ContractsPerTrade,
        gateway: &dyn ExchangeGateway,
    ) -> Result<f64> {
        match *contracts {
            ContractsPerTrade::Fixed(n) => Ok(n),
            ContractsPerTrade::Scaled { k0, u, k } => {
                let margin = self
                    .margin_retry
                    .run_exchange("getMargin", || gateway.margin())
                    .await?;
                let balance = margin.balance();
                let quantity = scaled_quantity(k0, u, k, balance);

                tracing::debug!(balance, quantity, "Resolved scaled contracts quantity");
                Ok(quantity)
            }
        }
    }
}

impl Default for QuantityResolver {
    fn default() -> Self {
        Self::new(RetryPolicy::exchange())
    }
}
