//! # Retry Policy
//!
//! Wraps calls to external services with a bounded retry budget. The policy is
//! a plain value built from [`RetryConfig`] and passed to each client that
//! needs it, so two call sites can retry differently.
//!
//! Exhausting the budget returns the last classified error; nothing panics or
//! escapes as anything other than a [`ServiceError`].

use super::errors::{ServiceError, ServiceResult};
use crate::config::{BackoffStrategy, RetryConfig};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// A single attempt, never retried
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.config.backoff {
            BackoffStrategy::Fixed => Duration::from_millis(self.config.delay_ms),
            BackoffStrategy::Exponential => {
                let max_delay = self.config.max_delay_ms;
                // Past u64 range the delay is clamped anyway
                let millis = 2u64
                    .checked_pow(retry.saturating_sub(1))
                    .and_then(|multiplier| multiplier.checked_mul(self.config.delay_ms))
                    .map_or(max_delay, |delay| delay.min(max_delay));
                Duration::from_millis(millis)
            }
        }
    }

    pub fn should_retry(&self, error: &ServiceError) -> bool {
        error.is_retriable_with(&self.config.retriable_status_codes)
    }

    /// Run `call` until it succeeds, fails permanently or the budget runs out
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "✅ Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if attempt < max_attempts && self.should_retry(&error) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔁 Retrying external call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(operation, attempt, error = %error, "External call failed");
                    return Err(error);
                }
            }
        }
    }
}
