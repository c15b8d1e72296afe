use serde_json::Value;
use thiserror::Error;

use asyncgate_pipeline::Violation;

use crate::coerce::coerce_value;

/// Whether scalars are coerced to their declared types before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    /// Validate the data exactly as received.
    #[default]
    None,
    /// Convert string scalars to the declared type first.
    Scalars,
}

/// A schema the engine refused to compile.
#[derive(Debug, Clone, Error)]
#[error("invalid schema: {message}")]
pub struct SchemaError {
    pub message: String,
}

/// Compiles JSON schemas into reusable validators.
///
/// A plain value: every route compiler owns its own engine, so two
/// compilations in one process can use different settings.
#[derive(Debug, Clone)]
pub struct SchemaEngine {
    validate_formats: bool,
}

impl Default for SchemaEngine {
    fn default() -> Self {
        Self {
            validate_formats: true,
        }
    }
}

impl SchemaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle `format` assertions (date-time, email, uuid, uri, ipv4, ipv6).
    pub fn with_format_validation(mut self, enabled: bool) -> Self {
        self.validate_formats = enabled;
        self
    }

    pub fn validates_formats(&self) -> bool {
        self.validate_formats
    }

    /// Compile `schema`. This is the only expensive step; call it once per route.
    pub fn compile(
        &self,
        schema: &Value,
        coercion: Coercion,
    ) -> Result<CompiledValidator, SchemaError> {
        let validator = jsonschema::options()
            .should_validate_formats(self.validate_formats)
            .build(schema)
            .map_err(|e| SchemaError {
                message: e.to_string(),
            })?;

        Ok(CompiledValidator {
            schema: schema.clone(),
            validator,
            coercion,
        })
    }
}

/// All violations for one piece of data. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    first: Violation,
    rest: Vec<Violation>,
}

impl ValidationErrors {
    /// The violation the engine reported first.
    pub fn first(&self) -> &Violation {
        &self.first
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    pub fn into_first(self) -> Violation {
        self.first
    }
}

/// A compiled schema. Stateless, so it can serve concurrent requests.
pub struct CompiledValidator {
    schema: Value,
    validator: jsonschema::Validator,
    coercion: Coercion,
}

impl CompiledValidator {
    /// Validate `data`, returning the (possibly coerced) value on success.
    pub fn validate(&self, data: &Value) -> Result<Value, ValidationErrors> {
        let candidate = match self.coercion {
            Coercion::None => data.clone(),
            Coercion::Scalars => coerce_value(&self.schema, data),
        };

        let mut violations = self
            .validator
            .iter_errors(&candidate)
            .map(|e| Violation {
                schema_path: format!("#{}", e.schema_path),
                instance_path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect::<Vec<_>>()
            .into_iter();

        match violations.next() {
            None => Ok(candidate),
            Some(first) => Err(ValidationErrors {
                first,
                rest: violations.collect(),
            }),
        }
    }

    pub fn is_valid(&self, data: &Value) -> bool {
        self.validate(data).is_ok()
    }

    pub fn coercion(&self) -> Coercion {
        self.coercion
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

impl std::fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("schema", &self.schema)
            .field("coercion", &self.coercion)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(schema: Value, coercion: Coercion) -> CompiledValidator {
        SchemaEngine::new().compile(&schema, coercion).unwrap()
    }

    #[test]
    fn valid_data_is_returned() {
        let validator = compile(
            json!({ "type": "object", "properties": { "id": { "type": "integer" } } }),
            Coercion::None,
        );
        assert_eq!(validator.validate(&json!({ "id": 1 })), Ok(json!({ "id": 1 })));
    }

    #[test]
    fn coercion_applies_only_when_enabled() {
        let schema = json!({ "type": "object", "properties": { "id": { "type": "integer" } } });

        let strict = compile(schema.clone(), Coercion::None);
        assert!(!strict.is_valid(&json!({ "id": "6" })));

        let lenient = compile(schema, Coercion::Scalars);
        assert_eq!(lenient.validate(&json!({ "id": "6" })), Ok(json!({ "id": 6 })));
    }

    #[test]
    fn violation_carries_schema_and_instance_paths() {
        let validator = compile(
            json!({ "type": "object", "properties": { "id": { "type": "integer" } } }),
            Coercion::None,
        );
        let errors = validator.validate(&json!({ "id": "abc" })).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.first().schema_path, "#/properties/id/type");
        assert_eq!(errors.first().instance_path, "/id");
        assert!(errors.first().message.contains("integer"));
    }

    #[test]
    fn every_violation_is_retrievable() {
        let validator = compile(
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer" },
                    "lumens": { "type": "integer", "minimum": 0 }
                },
                "required": ["sentAt"]
            }),
            Coercion::None,
        );
        let errors = validator
            .validate(&json!({ "id": "abc", "lumens": -1 }))
            .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.iter().count(), 3);
    }

    #[test]
    fn formats_are_asserted_by_default() {
        let schema = json!({ "type": "string", "format": "email" });

        let validator = compile(schema.clone(), Coercion::None);
        assert!(validator.is_valid(&json!("user@example.com")));
        assert!(!validator.is_valid(&json!("not-an-email")));

        let lax = SchemaEngine::new()
            .with_format_validation(false)
            .compile(&schema, Coercion::None)
            .unwrap();
        assert!(lax.is_valid(&json!("not-an-email")));
    }

    #[test]
    fn format_validation_uuid_and_date_time() {
        let uuid = compile(json!({ "type": "string", "format": "uuid" }), Coercion::None);
        assert!(uuid.is_valid(&json!("550e8400-e29b-41d4-a716-446655440000")));
        assert!(!uuid.is_valid(&json!("not-a-uuid")));

        let date_time = compile(json!({ "type": "string", "format": "date-time" }), Coercion::None);
        assert!(date_time.is_valid(&json!("2024-01-15T10:30:00Z")));
        assert!(!date_time.is_valid(&json!("yesterday")));
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let err = SchemaEngine::new()
            .compile(&json!({ "type": "not-a-type" }), Coercion::None)
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid schema:"));
    }
}
