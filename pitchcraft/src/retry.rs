//! Exponential-backoff retry for any fallible async operation.
//!
//! The only input to the retry decision is [`Retryable::is_retryable`]; error
//! content is never inspected here.

use crate::error::Retryable;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
        }
    }

    /// Delay slept after the zero-indexed failed `attempt`: `initial_delay_ms * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out
/// of attempts. The last error observed is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    tracing::debug!(attempt, "non-retryable failure: {}", err);
                    return Err(err);
                }
                if attempt >= config.max_retries {
                    tracing::warn!(
                        attempts = attempt + 1,
                        "giving up after retryable failure: {}",
                        err
                    );
                    return Err(err);
                }
                let wait = config.backoff(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    wait_ms = wait.as_millis() as u64,
                    "retrying after failure: {}",
                    err
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
