//! File-backed adapters.

pub mod trace_repository;

pub use trace_repository::JsonlTraceRepository;
