//! Observability for asyncgate.
//!
//! Structured logging (JSON or pretty) on top of `tracing-subscriber`, plus
//! the standard event names every crate logs with.
//!
//! ```ignore
//! use asyncgate_telemetry::{init_logging, LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("debug")
//!     .with_log_format(LogFormat::Pretty);
//! init_logging(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::{events, init_logging};

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}
