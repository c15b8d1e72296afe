//! Schemas derived from channel and message definitions.

use serde_json::{json, Map, Value};

use asyncgate_spec_parser::{strip_parser_metadata, Message, ParameterDefinition};

/// Parameter keywords carried over into the synthesized schema.
const PARAMETER_KEYWORDS: &[&str] = &["type", "format", "enum", "pattern"];

/// Strict object schema for a channel's path parameters.
///
/// Every declared parameter is required and nothing else is allowed. An
/// empty list yields a schema that only matches `{}`.
pub fn parameters_schema(parameters: &[ParameterDefinition]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::with_capacity(parameters.len());

    for param in parameters {
        let property: Map<String, Value> = PARAMETER_KEYWORDS
            .iter()
            .filter_map(|keyword| {
                param
                    .schema
                    .get(*keyword)
                    .map(|value| (keyword.to_string(), value.clone()))
            })
            .collect();

        properties.insert(param.name.clone(), Value::Object(property));
        required.push(Value::String(param.name.clone()));
    }

    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": required,
    })
}

/// A message's header schema without parser metadata, or `{type: object}`.
pub fn header_schema(message: &Message) -> Value {
    message
        .headers
        .as_ref()
        .map(strip_parser_metadata)
        .unwrap_or_else(|| json!({ "type": "object" }))
}
