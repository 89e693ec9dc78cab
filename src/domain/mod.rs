//! Domain layer for the credence evidence pipeline
//!
//! Core models, the ports every collaborator implements, and domain errors.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{BackendError, DomainError, DomainResult};
