//! Resilience for backend calls: bounded retry and request throttling.

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::RequestThrottle;
pub use retry::{RetryPolicy, Retryable};
