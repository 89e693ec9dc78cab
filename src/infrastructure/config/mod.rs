//! Layered configuration loading.
//!
//! Defaults, then `.credence/config.yaml`, then `.credence/local.yaml`, then
//! `CREDENCE_` environment variables, merged with figment and validated.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
