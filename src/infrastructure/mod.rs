//! Infrastructure: configuration, logging and backend-call resilience.

pub mod config;
pub mod logging;
pub mod resilience;

pub use config::{ConfigError, ConfigLoader};
pub use logging::{LogConfig, LoggerImpl};
pub use resilience::{RequestThrottle, RetryPolicy, Retryable};
