//! Retry with exponential backoff for transient failures.
//!
//! Terminal errors (see `SyncError::is_retryable`) propagate immediately.
//! Retryable errors sleep cooperatively between attempts; a server-supplied
//! retry-after hint overrides the computed delay. Exhausting the attempt
//! budget surfaces the last error wrapped in `SyncError::RetryExhausted`.

use crate::error::{Result, SyncError};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Cap on the computed backoff.
    pub max_delay: Duration,
    /// Add up to +10% random jitter to each computed delay, so many clients
    /// failing at once don't retry in lockstep. Retry-after hints are never
    /// jittered.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Executes async operations with classification-aware retries.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Backoff delay after the given zero-based failed attempt:
    /// `base * 2^attempt`, capped, with optional jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.config.max_delay);
        if self.config.jitter {
            let factor = 1.0 + rand::rng().random_range(0.0..0.1);
            Duration::from_secs_f64(exp.as_secs_f64() * factor)
        } else {
            exp
        }
    }

    /// Run `op` until it succeeds, fails terminally, or exhausts the attempt
    /// budget. `op` receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            // Cancellation observed mid-operation wins over classification.
            if cancel.is_cancelled() || matches!(err, SyncError::Cancelled) {
                return Err(SyncError::Cancelled);
            }
            if !err.is_retryable() {
                return Err(err);
            }

            attempt += 1;
            if attempt >= self.config.max_attempts {
                return Err(SyncError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = err
                .retry_after()
                .unwrap_or_else(|| self.backoff_delay(attempt - 1));
            debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient failure");

            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
