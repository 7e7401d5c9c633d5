// src/retry.rs
//! Bounded retries with exponential backoff, and per-operation timeouts
//!
//! Only `CoreError::Transient` is retried. Everything else returns on the
//! first occurrence.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetrySettings;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration, max_delay: Duration, timeout: Duration) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            timeout,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.attempts,
            settings.base_delay(),
            settings.max_delay(),
            settings.timeout(),
        )
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Backoff before attempt `attempt + 1`: base · 2^(attempt-1), capped, jittered into [d/2, d]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let full = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let millis = full.as_millis() as u64;
        if millis < 2 {
            return full;
        }
        Duration::from_millis(rand::random_range(millis / 2..=millis))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Bound one network operation by this policy's timeout
    pub async fn timed<T, Fut>(&self, what: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        with_timeout(self.timeout, what, fut).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Elapsed timeouts count as transient so the caller may retry them
pub async fn with_timeout<T, Fut>(timeout: Duration, what: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Transient(format!(
            "{what} timed out after {}s",
            timeout.as_secs_f64()
        ))),
    }
}
