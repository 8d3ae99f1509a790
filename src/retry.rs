use std::fmt::Display;
use std::future::Future;

use tokio::time::{sleep, Duration};

use crate::error::BridgeError;

/// Fixed-delay retry discipline.
///
/// `max_attempts` counts every try, the first one included, and the delay is
/// only slept between two consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// The last failure of a run that used up all of its attempts.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// 10 attempts, 1s apart.
    pub const fn engine_connect() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// 10 attempts, 2s apart.
    pub const fn exchange() -> Self {
        Self::new(10, Duration::from_secs(2))
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Exhausted<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded after {} attempts", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        what,
                        attempt,
                        max_attempts,
                        e,
                        self.delay
                    );
                    sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    })
                }
            }
        }
    }

    /// Retry a transient exchange call.
    ///
    /// Non-retryable errors are returned straight away; an exhausted run
    /// escalates to [`BridgeError::ExchangeUnavailable`].
    pub async fn run_exchange<T, F, Fut>(&self, what: &str, mut op: F) -> crate::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        what,
                        attempt,
                        max_attempts,
                        e,
                        self.delay
                    );
                    sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(BridgeError::ExchangeUnavailable(format!(
                        "{} failed after {} attempts: {}",
                        what, attempt, e
                    )))
                }
            }
        }
    }
}
