use thiserror::Error;

use asyncgate_pipeline::ValidationTarget;

use crate::resolver::ResolveError;

/// Errors produced while compiling and registering routes.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The document could not be parsed or failed validation.
    #[error(transparent)]
    Parse(#[from] asyncgate_spec_parser::ParseError),

    /// E1020: A derived schema was rejected by the schema engine.
    #[error("E1020: invalid {target} schema on channel '{channel}': {message}")]
    InvalidSchema {
        channel: String,
        target: ValidationTarget,
        message: String,
    },

    /// E1030: An operation handler could not be resolved and stubbing is off.
    #[error("E1030: cannot resolve handler for channel '{channel}': {source}")]
    Resolution {
        channel: String,
        #[source]
        source: ResolveError,
    },

    /// Option file reading or parsing error.
    #[error("config error: {0}")]
    Config(String),
}

impl CompileError {
    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Parse(e) => e.code(),
            CompileError::InvalidSchema { .. } => "E1020",
            CompileError::Resolution { .. } => "E1030",
            CompileError::Config(_) => "E1040",
        }
    }
}
