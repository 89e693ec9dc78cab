//! Bounded retry with exponential backoff for backend calls.
//!
//! Retries transient and malformed-output failures up to `max_attempts`
//! total attempts; permanent failures return immediately. Delays follow an
//! exponential schedule capped at `max_backoff`.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::BackendError;
use crate::domain::models::RetryConfig;

/// Errors that can tell whether another attempt may succeed.
pub trait Retryable: std::fmt::Display {
    /// True when another attempt may succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Bounded exponential-backoff retry for backend calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    max_attempts: u32,
    /// Delay before the second attempt
    initial_backoff: Duration,
    /// Ceiling for the doubling delay
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Create a retry policy.
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts including the first; values below 1 are raised to 1
    /// * `initial_backoff_ms` - Delay before the first retry
    /// * `max_backoff_ms` - Cap on the doubling delay; raised to `initial_backoff_ms` if lower
    ///
    /// # Example
    /// ```
    /// use credence::infrastructure::resilience::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(3, 500, 8_000);
    /// ```
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
        }
    }

    /// Policy from the `retry` config section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.initial_backoff_ms, config.max_backoff_ms)
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, 0, 0)
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run
    /// out. The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut schedule = self.schedule();
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(call = label, attempt, "backend call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = schedule.next_backoff().unwrap_or(self.max_backoff);
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "backend call failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(call = label, attempts = attempt, error = %err, "backend call failed after all attempts");
                    } else {
                        debug!(call = label, error = %err, "permanent backend failure, not retrying");
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
