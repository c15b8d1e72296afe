//! Structured logging: JSON lines for production, pretty output for development.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.log_level` when set. Fails if a subscriber
/// is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter),
    }
}

fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

fn init_pretty_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Standard log event names.
pub mod events {
    /// The process is starting up.
    pub const STARTUP: &str = "startup";

    /// The server is accepting connections.
    pub const LISTENING: &str = "listening";

    /// A compiled route pipeline was mounted on the host.
    pub const ROUTE_REGISTERED: &str = "route_registered";

    /// A request part failed its schema.
    pub const VALIDATION_FAILURE: &str = "validation_failure";

    /// A stub stood in for an unresolvable operation handler.
    pub const STUB_INVOKED: &str = "stub_invoked";

    /// An operation handler returned an error.
    pub const HANDLER_ERROR: &str = "handler_error";

    /// A request has been answered.
    pub const REQUEST_COMPLETED: &str = "request_completed";
}

/// Helper macros for structured logging with standard fields.
///
/// Callers need `tracing` as a dependency.
#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STARTUP,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_listening {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::LISTENING,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_route_registered {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::ROUTE_REGISTERED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_validation_failure {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::VALIDATION_FAILURE,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_stub_invoked {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::STUB_INVOKED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_handler_error {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::HANDLER_ERROR,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_request_completed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::REQUEST_COMPLETED,
            $($field)*
        )
    };
}
