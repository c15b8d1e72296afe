//! RFC 9457 problem details for failed requests.

use std::collections::HashMap;

use http::StatusCode;
use serde_json::Value;

use asyncgate_pipeline::{Response, ValidationFailure, ValidationTarget};

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Extended fields; the violation itself only in dev mode.
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl ProblemDetails {
    /// 400 for a request part that failed its schema.
    pub fn validation_failure(failure: &ValidationFailure, instance: &str, dev_mode: bool) -> Self {
        let slug = match failure.target {
            ValidationTarget::Params => "params",
            ValidationTarget::Headers => "header",
            ValidationTarget::Body => "body",
        };

        let mut extensions = HashMap::new();
        extensions.insert(
            "target".to_string(),
            Value::String(failure.target.as_str().to_string()),
        );
        if dev_mode {
            if let Ok(violation) = serde_json::to_value(&failure.violation) {
                extensions.insert("violation".to_string(), violation);
            }
        }

        Self {
            error_type: format!("urn:asyncgate:error:{}-validation-failed", slug),
            title: "Request validation failed".to_string(),
            status: StatusCode::BAD_REQUEST.as_u16(),
            detail: Some(failure.message.clone()),
            instance: Some(instance.to_string()),
            extensions,
        }
    }

    /// 500 for a handler that failed. The error text is only exposed in dev mode.
    pub fn handler_error(message: &str, instance: &str, dev_mode: bool) -> Self {
        Self {
            error_type: "urn:asyncgate:error:handler-failed".to_string(),
            title: "Internal Server Error".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: dev_mode.then(|| message.to_string()),
            instance: Some(instance.to_string()),
            extensions: HashMap::new(),
        }
    }

    /// 400 for a request the host could not turn into a pipeline request.
    pub fn bad_request(detail: &str, instance: &str) -> Self {
        Self {
            error_type: "urn:asyncgate:error:bad-request".to_string(),
            title: "Bad Request".to_string(),
            status: StatusCode::BAD_REQUEST.as_u16(),
            detail: Some(detail.to_string()),
            instance: Some(instance.to_string()),
            extensions: HashMap::new(),
        }
    }

    pub fn not_found(instance: &str) -> Self {
        Self {
            error_type: "urn:asyncgate:error:not-found".to_string(),
            title: "Not Found".to_string(),
            status: StatusCode::NOT_FOUND.as_u16(),
            detail: Some(format!("no route matches '{}'", instance)),
            instance: Some(instance.to_string()),
            extensions: HashMap::new(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"type":"{}","title":"{}","status":{}}}"#,
                self.error_type, self.title, self.status
            )
        })
    }

    pub fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Response::new(status)
            .with_content_type(PROBLEM_CONTENT_TYPE)
            .with_body(self.to_json())
    }
}
