//! Validation stages for params, headers and body.

use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use serde_json::Value;

use asyncgate_pipeline::{
    Flow, Middleware, PipelineError, Request, SharedMiddleware, ValidationFailure,
    ValidationTarget,
};
use asyncgate_spec_parser::strip_parser_metadata;

use crate::engine::{Coercion, CompiledValidator, SchemaEngine, SchemaError};

/// Key hosts use for an unnamed trailing capture. Never validated.
pub const POSITIONAL_PARAM: &str = "0";

struct ValidationStage {
    target: ValidationTarget,
    validator: CompiledValidator,
}

impl ValidationStage {
    fn extract(&self, req: &Request) -> Value {
        match self.target {
            ValidationTarget::Params => {
                let mut params = req.params.clone();
                params.remove(POSITIONAL_PARAM);
                Value::Object(params)
            }
            ValidationTarget::Headers => Value::Object(req.headers.clone()),
            ValidationTarget::Body => req.body.clone(),
        }
    }

    fn check(&self, req: &mut Request) -> Result<Flow, PipelineError> {
        let data = self.extract(req);

        match self.validator.validate(&data) {
            Ok(validated) => {
                req.api.insert(self.target.context_key(), validated);
                Ok(Flow::Continue)
            }
            Err(errors) => {
                tracing::debug!(
                    validation_target = %self.target,
                    path = %req.path,
                    violations = errors.len(),
                    "request failed validation"
                );
                Err(ValidationFailure::new(self.target, errors.into_first()).into())
            }
        }
    }
}

impl Middleware for ValidationStage {
    fn call<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<Flow, PipelineError>> {
        Box::pin(future::ready(self.check(req)))
    }
}

fn stage(
    engine: &SchemaEngine,
    target: ValidationTarget,
    schema: &Value,
    coercion: Coercion,
) -> Result<SharedMiddleware, SchemaError> {
    let validator = engine.compile(schema, coercion)?;
    Ok(Arc::new(ValidationStage { target, validator }))
}

/// Stage validating path captures into `api.params`, with scalar coercion.
pub fn validate_params(
    engine: &SchemaEngine,
    schema: &Value,
) -> Result<SharedMiddleware, SchemaError> {
    stage(engine, ValidationTarget::Params, schema, Coercion::Scalars)
}

/// Stage validating header values into `api.headers`, with scalar coercion.
///
/// Parser metadata is stripped from `schema` before it is compiled.
pub fn validate_headers(
    engine: &SchemaEngine,
    schema: &Value,
) -> Result<SharedMiddleware, SchemaError> {
    let schema = strip_parser_metadata(schema);
    stage(engine, ValidationTarget::Headers, &schema, Coercion::Scalars)
}

/// Stage validating the payload into `api.body`. Never coerces.
pub fn validate_body(
    engine: &SchemaEngine,
    schema: &Value,
) -> Result<SharedMiddleware, SchemaError> {
    stage(engine, ValidationTarget::Body, schema, Coercion::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asyncgate_pipeline::Pipeline;
    use http::Method;
    use serde_json::json;

    fn params_schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "userId": { "type": "integer" },
                "email": { "type": "string", "format": "email" },
                "direction": { "type": "string", "enum": ["more", "less"] },
                "year": { "type": "string", "pattern": "^(19|20)\\d{2}$" }
            },
            "required": ["userId", "email", "direction", "year"]
        })
    }

    fn request() -> Request {
        Request::new(Method::POST, "/users/6")
            .with_param("userId", "6")
            .with_param("email", "user@example.com")
            .with_param("direction", "more")
            .with_param("year", "1999")
    }

    async fn run(stage: SharedMiddleware, req: &mut Request) -> Result<Flow, PipelineError> {
        stage.call(req).await
    }

    #[tokio::test]
    async fn params_are_coerced_into_context() {
        let stage = validate_params(&SchemaEngine::new(), &params_schema()).unwrap();
        let mut req = request();

        run(stage, &mut req).await.unwrap();
        assert_eq!(
            req.api.get("params"),
            Some(&json!({
                "userId": 6,
                "email": "user@example.com",
                "direction": "more",
                "year": "1999"
            }))
        );
        assert_eq!(req.params["userId"], json!("6"));
    }

    #[tokio::test]
    async fn positional_capture_is_ignored() {
        let stage = validate_params(&SchemaEngine::new(), &params_schema()).unwrap();
        let mut req = request().with_param(POSITIONAL_PARAM, "trailing/segments");

        run(stage, &mut req).await.unwrap();
        assert!(req.api.get("params").unwrap().get(POSITIONAL_PARAM).is_none());
    }

    #[tokio::test]
    async fn params_failures_name_the_schema_path() {
        let stage = validate_params(&SchemaEngine::new(), &params_schema()).unwrap();
        let mut req = request().with_param("userId", "six");

        let err = run(stage, &mut req).await.unwrap_err();
        let failure = err.as_validation().unwrap();
        assert_eq!(failure.target, ValidationTarget::Params);
        assert_eq!(failure.violation.schema_path, "#/properties/userId/type");
        assert!(failure
            .message
            .starts_with("Parameter validation error on #/properties/userId/type: "));
        assert!(req.api.get("params").is_none());
    }

    #[tokio::test]
    async fn params_formats_enums_and_patterns_are_enforced() {
        let engine = SchemaEngine::new();
        let cases = [
            ("email", "not-an-email", "#/properties/email/format"),
            ("direction", "sideways", "#/properties/direction/enum"),
            ("year", "1899", "#/properties/year/pattern"),
        ];

        for (name, value, schema_path) in cases {
            let stage = validate_params(&engine, &params_schema()).unwrap();
            let mut req = request().with_param(name, value);
            let err = run(stage, &mut req).await.unwrap_err();
            assert_eq!(err.as_validation().unwrap().violation.schema_path, schema_path);
        }
    }

    #[tokio::test]
    async fn undeclared_params_are_rejected() {
        let stage = validate_params(&SchemaEngine::new(), &params_schema()).unwrap();
        let mut req = request().with_param("extra", "1");

        let err = run(stage, &mut req).await.unwrap_err();
        assert_eq!(
            err.as_validation().unwrap().violation.schema_path,
            "#/additionalProperties"
        );
    }

    #[tokio::test]
    async fn permissive_headers_pass_unchanged() {
        let stage = validate_headers(&SchemaEngine::new(), &json!({ "type": "object" })).unwrap();
        let mut req = Request::new(Method::POST, "/light.measured").with_header("userid", "6");

        run(stage, &mut req).await.unwrap();
        assert_eq!(req.api.get("headers"), Some(&json!({ "userid": "6" })));
    }

    #[tokio::test]
    async fn headers_are_coerced_after_stripping_metadata() {
        let schema = json!({
            "type": "object",
            "x-parser-schema-id": "<anonymous-schema-1>",
            "properties": {
                "my-app-header": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 100,
                    "x-parser-schema-id": "<anonymous-schema-2>"
                },
                "x-parser-schema-id": "<anonymous-schema-3>"
            }
        });
        let stage = validate_headers(&SchemaEngine::new(), &schema).unwrap();

        let mut req = Request::new(Method::POST, "/").with_header("my-app-header", "42");
        run(stage.clone(), &mut req).await.unwrap();
        assert_eq!(req.api.get("headers"), Some(&json!({ "my-app-header": 42 })));

        let mut req = Request::new(Method::POST, "/").with_header("my-app-header", "101");
        let err = run(stage, &mut req).await.unwrap_err();
        let failure = err.as_validation().unwrap();
        assert_eq!(failure.target, ValidationTarget::Headers);
        assert_eq!(
            failure.violation.schema_path,
            "#/properties/my-app-header/maximum"
        );
        assert!(failure.message.starts_with("Header validation error on "));
    }

    #[tokio::test]
    async fn body_is_never_coerced() {
        let schema = json!({
            "type": "object",
            "properties": { "lumens": { "type": "integer", "minimum": 0 } },
            "required": ["lumens"]
        });
        let stage = validate_body(&SchemaEngine::new(), &schema).unwrap();

        let mut req = Request::new(Method::POST, "/").with_body(json!({ "lumens": 3 }));
        run(stage.clone(), &mut req).await.unwrap();
        assert_eq!(req.api.get("body"), Some(&json!({ "lumens": 3 })));

        let mut req = Request::new(Method::POST, "/").with_body(json!({ "lumens": "3" }));
        let err = run(stage, &mut req).await.unwrap_err();
        let failure = err.as_validation().unwrap();
        assert_eq!(failure.target, ValidationTarget::Body);
        assert_eq!(
            failure.message,
            format!(
                "Body validation error on #/properties/lumens/type: {}",
                failure.violation.message
            )
        );
    }

    #[tokio::test]
    async fn body_formats_are_checked() {
        let schema = json!({
            "type": "object",
            "properties": { "sentAt": { "type": "string", "format": "date-time" } }
        });
        let stage = validate_body(&SchemaEngine::new(), &schema).unwrap();
        let mut req = Request::new(Method::POST, "/").with_body(json!({ "sentAt": "noon" }));
        assert!(run(stage, &mut req).await.is_err());
    }

    #[tokio::test]
    async fn stages_preserve_earlier_context_keys() {
        let engine = SchemaEngine::new();
        let pipeline = Pipeline::new(vec![
            validate_params(&engine, &json!({ "type": "object" })).unwrap(),
            validate_headers(&engine, &json!({ "type": "object" })).unwrap(),
            validate_body(&engine, &json!({})).unwrap(),
        ]);
        let mut req = Request::new(Method::POST, "/")
            .with_param("id", "1")
            .with_header("x-trace", "t")
            .with_body(json!("raw"));
        req.api.insert("touched", json!(true));

        pipeline.run(&mut req).await.unwrap();
        let keys: Vec<&str> = req.api.keys().collect();
        assert_eq!(keys, vec!["touched", "params", "headers", "body"]);
        assert_eq!(req.api.get("body"), Some(&json!("raw")));
    }
}
