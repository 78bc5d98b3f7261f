//! Bounded retry with exponential backoff.
//!
//! Only errors marked retryable by [`Error::is_retryable`] are retried, which
//! restricts retries to store timeouts and connection failures. Auth and
//! authorization failures always surface on the first attempt.

use backon::{ExponentialBuilder, Retryable};
use tracing::debug;

use crate::config::RetryConfig;
use crate::{Error, Result};

/// Retry policy built once from config and shared by the store adapter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    builder: ExponentialBuilder,
}

impl RetryPolicy {
    /// Build a policy from config. `max_attempts` counts the first call, so
    /// the backoff budget is `max_attempts - 1` retries; a disabled policy
    /// runs the operation exactly once.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        let retries = if config.enabled {
            config.max_attempts.saturating_sub(1) as usize
        } else {
            0
        };
        Self {
            builder: ExponentialBuilder::default()
                .with_min_delay(config.initial_backoff)
                .with_max_delay(config.max_backoff)
                .with_max_times(retries),
        }
    }

    /// Run `op`, retrying retryable errors until the budget is spent.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        op.retry(self.builder)
            .when(Error::is_retryable)
            .notify(|e, delay| {
                debug!(error = %e, delay_ms = delay.as_millis(), "Retrying after transient failure");
            })
            .await
    }
}
