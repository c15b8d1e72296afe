use serde::Serialize;
use thiserror::Error;

/// Boxed error raised by operation handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which part of the request a validation stage checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationTarget {
    Params,
    Headers,
    Body,
}

impl ValidationTarget {
    /// The discriminator carried on failures (`PARAMS`, `HEADERS`, `BODY`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationTarget::Params => "PARAMS",
            ValidationTarget::Headers => "HEADERS",
            ValidationTarget::Body => "BODY",
        }
    }

    /// Key under which validated data lands in the request context.
    pub fn context_key(&self) -> &'static str {
        match self {
            ValidationTarget::Params => "params",
            ValidationTarget::Headers => "headers",
            ValidationTarget::Body => "body",
        }
    }

    /// Human label used in failure messages.
    pub fn label(&self) -> &'static str {
        match self {
            ValidationTarget::Params => "Parameter",
            ValidationTarget::Headers => "Header",
            ValidationTarget::Body => "Body",
        }
    }
}

impl std::fmt::Display for ValidationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One constraint violation reported by the schema engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Schema location of the failing keyword (e.g. "#/properties/id/type").
    pub schema_path: String,
    /// Location in the validated data (e.g. "/id").
    pub instance_path: String,
    pub message: String,
}

/// A request part that did not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct ValidationFailure {
    pub target: ValidationTarget,
    pub message: String,
    /// The first violation the engine reported.
    pub violation: Violation,
}

impl ValidationFailure {
    pub fn new(target: ValidationTarget, violation: Violation) -> Self {
        let message = format!(
            "{} validation error on {}: {}",
            target.label(),
            violation.schema_path,
            violation.message
        );
        Self {
            target,
            message,
            violation,
        }
    }
}

/// Errors travelling along the chain's failure path.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("handler error: {0}")]
    Handler(BoxError),
}

impl PipelineError {
    /// Wrap an error raised by an operation handler.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        PipelineError::Handler(err.into())
    }

    pub fn as_validation(&self) -> Option<&ValidationFailure> {
        match self {
            PipelineError::Validation(failure) => Some(failure),
            PipelineError::Handler(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> Violation {
        Violation {
            schema_path: "#/properties/id/type".into(),
            instance_path: "/id".into(),
            message: "\"abc\" is not of type \"integer\"".into(),
        }
    }

    #[test]
    fn failure_message_names_the_schema_path() {
        let failure = ValidationFailure::new(ValidationTarget::Body, violation());
        assert_eq!(
            failure.message,
            "Body validation error on #/properties/id/type: \"abc\" is not of type \"integer\""
        );
        assert_eq!(failure.to_string(), failure.message);
    }

    #[test]
    fn target_serializes_as_discriminator() {
        let failure = ValidationFailure::new(ValidationTarget::Headers, violation());
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["target"], "HEADERS");
        assert_eq!(json["violation"]["instance_path"], "/id");
    }

    #[test]
    fn handler_errors_are_not_validation_failures() {
        let err = PipelineError::handler("database unavailable");
        assert!(err.as_validation().is_none());
        assert_eq!(err.to_string(), "handler error: database unavailable");

        let err = PipelineError::from(ValidationFailure::new(ValidationTarget::Params, violation()));
        assert_eq!(err.as_validation().map(|f| f.target), Some(ValidationTarget::Params));
    }
}
