//! # Observability
//!
//! Structured logging through `tracing`. Every state change in the store,
//! learner and transmitter emits an event; binaries decide where they go.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
