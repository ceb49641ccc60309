//! Bounded retry with backoff for transient provider failures.

use crate::error::ApiError;

use std::future::Future;
use std::time::Duration;

/// Retries apply only to rate limits and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Backoff for the first retry when the server gives no hint; doubles after.
    pub base_delay: Duration,
    /// Cap on any single wait, including server-supplied `Retry-After`.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), or `None` to give up.
    pub fn delay_for(&self, retry: u32, error: &ApiError) -> Option<Duration> {
        if retry > self.max_retries || !error.is_retriable() {
            return None;
        }

        let delay = match error {
            ApiError::RateLimited {
                retry_after: Some(retry_after),
            } => *retry_after,
            _ => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1))),
        };

        Some(delay.min(self.max_delay))
    }

    /// Run `operation` until it succeeds, fails permanently, or the budget runs out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut retry = 0;
        loop {
            let error = match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            retry += 1;
            let Some(delay) = self.delay_for(retry, &error) else {
                return Err(error);
            };

            tracing::warn!(
                operation,
                retry,
                delay_ms = delay.as_millis() as u64,
                %error,
                "retriable provider error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
