use serde::Serialize;
use thiserror::Error;

/// Errors produced during spec parsing (E1000–E1004).
#[derive(Debug, Error)]
pub enum ParseError {
    /// E1001: Not an AsyncAPI 2.x document.
    #[error("not a valid AsyncAPI 2.x document: {0}")]
    UnsupportedFormat(String),

    /// E1002: YAML/JSON parse error.
    #[error("parse error: {0}")]
    Syntax(String),

    /// E1003: Unresolved $ref.
    #[error("unresolved $ref: {0}")]
    UnresolvedRef(String),

    /// E1004: The document failed structural validation.
    #[error("There were errors validating the AsyncAPI document.")]
    Validation { issues: Vec<ValidationIssue> },

    /// I/O error reading the spec file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Stable diagnostic code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::Io(_) => "E1000",
            ParseError::UnsupportedFormat(_) => "E1001",
            ParseError::Syntax(_) => "E1002",
            ParseError::UnresolvedRef(_) => "E1003",
            ParseError::Validation { .. } => "E1004",
        }
    }

    /// Validation issues, if this is a document validation failure.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ParseError::Validation { issues } => issues,
            _ => &[],
        }
    }
}

/// A single structural problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending node (e.g. "/channels/light~1measured").
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}
