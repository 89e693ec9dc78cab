//! Shared request throttle for the language-model backend.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::RateLimitConfig;

/// Token bucket shared by every run in the process.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl RequestThrottle {
    /// `requests_per_second` may be fractional; non-positive rates fall back
    /// to one request per second.
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        let period = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::from_secs(1)
        };
        let burst = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Throttle at `requests_per_second` with `burst_size` slack.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Effectively unthrottled; for tests and local backends.
    pub fn unlimited() -> Self {
        Self::new(1_000_000.0, u32::MAX)
    }

    /// Wait until a request slot is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_burst_is_immediate() {
        let throttle = RequestThrottle::new(1.0, 3);
        let start = Instant::now();
        for _ in 0..3 {
            throttle.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_waits_after_burst() {
        let throttle = RequestThrottle::new(20.0, 1);
        throttle.acquire().await;
        let start = Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
