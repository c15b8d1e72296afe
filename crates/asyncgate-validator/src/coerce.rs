//! Scalar type coercion guided by a schema's `type` keyword.
//!
//! Path captures and header values always arrive as strings. Before they
//! are validated, each scalar is converted to the type its schema declares
//! when the conversion is lossless:
//!
//! | declared  | accepted input                                     |
//! |-----------|----------------------------------------------------|
//! | `number`  | numeric string, `true`/`false` (1/0), `null` (0)   |
//! | `integer` | as `number`, but only whole values                 |
//! | `string`  | number, boolean, `null` (`""`)                     |
//! | `boolean` | `"true"`/`"false"`, `1`/`0`, `null` (`false`)      |
//! | `null`    | `""`, `0`, `false`                                 |
//!
//! A value that already matches one of the declared types is left alone.

use serde_json::{Number, Value};

/// Return a copy of `value` with scalars coerced to the types `schema` declares.
///
/// Recurses through `properties`, object-valued `additionalProperties`,
/// `items` (single schema or tuple) and `allOf`.
pub fn coerce_value(schema: &Value, value: &Value) -> Value {
    let Some(schema_obj) = schema.as_object() else {
        return value.clone();
    };

    let mut coerced = coerce_scalar(schema, value);

    if let Some(Value::Array(all_of)) = schema_obj.get("allOf") {
        for subschema in all_of {
            coerced = coerce_value(subschema, &coerced);
        }
    }

    match &mut coerced {
        Value::Object(map) => {
            let properties = schema_obj.get("properties").and_then(Value::as_object);
            let additional = schema_obj
                .get("additionalProperties")
                .filter(|v| v.is_object());

            for (key, child) in map.iter_mut() {
                let subschema = properties.and_then(|p| p.get(key)).or(additional);
                if let Some(subschema) = subschema {
                    *child = coerce_value(subschema, child);
                }
            }
        }
        Value::Array(items) => match schema_obj.get("items") {
            Some(item_schema @ Value::Object(_)) => {
                for item in items.iter_mut() {
                    *item = coerce_value(item_schema, item);
                }
            }
            Some(Value::Array(tuple)) => {
                for (item, item_schema) in items.iter_mut().zip(tuple) {
                    *item = coerce_value(item_schema, item);
                }
            }
            _ => {}
        },
        _ => {}
    }

    coerced
}

fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn coerce_scalar(schema: &Value, value: &Value) -> Value {
    let types = declared_types(schema);
    if types.is_empty() || types.iter().any(|t| matches_type(t, value)) {
        return value.clone();
    }

    types
        .iter()
        .find_map(|t| convert(t, value))
        .unwrap_or_else(|| value.clone())
}

fn matches_type(declared: &str, value: &Value) -> bool {
    match declared {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_number().is_some_and(is_whole),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => false,
    }
}

fn convert(declared: &str, value: &Value) -> Option<Value> {
    match (declared, value) {
        ("number", Value::String(s)) => parse_number(s),
        ("integer", Value::String(s)) => {
            parse_number(s).filter(|n| n.as_number().is_some_and(is_whole))
        }
        ("number" | "integer", Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        ("number" | "integer", Value::Null) => Some(Value::from(0)),

        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        ("string", Value::Null) => Some(Value::String(String::new())),

        ("boolean", Value::String(s)) if s == "true" => Some(Value::Bool(true)),
        ("boolean", Value::String(s)) if s == "false" => Some(Value::Bool(false)),
        ("boolean", Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(Value::Bool(true)),
            Some(f) if f == 0.0 => Some(Value::Bool(false)),
            _ => None,
        },
        ("boolean", Value::Null) => Some(Value::Bool(false)),

        ("null", Value::String(s)) if s.is_empty() => Some(Value::Null),
        ("null", Value::Number(n)) if n.as_f64() == Some(0.0) => Some(Value::Null),
        ("null", Value::Bool(false)) => Some(Value::Null),

        _ => None,
    }
}

/// Parse a numeric string, preferring an integer representation.
fn parse_number(s: &str) -> Option<Value> {
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f: f64 = s.parse().ok()?;
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}

fn is_whole(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_strings_become_numbers() {
        let schema = json!({
            "type": "object",
            "properties": {
                "count": { "type": "integer" },
                "ratio": { "type": "number" },
                "name": { "type": "string" }
            }
        });
        let coerced = coerce_value(
            &schema,
            &json!({ "count": "6", "ratio": "0.5", "name": "6" }),
        );
        assert_eq!(coerced, json!({ "count": 6, "ratio": 0.5, "name": "6" }));
    }

    #[test]
    fn fractional_string_is_not_an_integer() {
        let schema = json!({ "type": "integer" });
        assert_eq!(coerce_value(&schema, &json!("12.5")), json!("12.5"));
        assert_eq!(coerce_value(&schema, &json!("1e3")), json!(1000));
    }

    #[test]
    fn non_numeric_strings_are_left_for_the_validator() {
        let schema = json!({ "type": "number" });
        assert_eq!(coerce_value(&schema, &json!("abc")), json!("abc"));
        assert_eq!(coerce_value(&schema, &json!("")), json!(""));
        assert_eq!(coerce_value(&schema, &json!("NaN")), json!("NaN"));
    }

    #[test]
    fn booleans_and_nulls() {
        assert_eq!(coerce_value(&json!({ "type": "boolean" }), &json!("true")), json!(true));
        assert_eq!(coerce_value(&json!({ "type": "boolean" }), &json!("false")), json!(false));
        assert_eq!(coerce_value(&json!({ "type": "boolean" }), &json!("yes")), json!("yes"));
        assert_eq!(coerce_value(&json!({ "type": "boolean" }), &json!(1)), json!(true));
        assert_eq!(coerce_value(&json!({ "type": "null" }), &json!("")), Value::Null);
        assert_eq!(coerce_value(&json!({ "type": "string" }), &Value::Null), json!(""));
        assert_eq!(coerce_value(&json!({ "type": "number" }), &json!(true)), json!(1));
    }

    #[test]
    fn matching_value_is_untouched() {
        let schema = json!({ "type": ["string", "integer"] });
        assert_eq!(coerce_value(&schema, &json!("6")), json!("6"));

        let schema = json!({ "type": ["integer", "string"] });
        assert_eq!(coerce_value(&schema, &json!(true)), json!(1));
    }

    #[test]
    fn untyped_schema_is_untouched() {
        let schema = json!({ "type": "object" });
        let headers = json!({ "userid": "6" });
        assert_eq!(coerce_value(&schema, &headers), headers);
    }

    #[test]
    fn recurses_through_items_additional_properties_and_all_of() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ids": { "type": "array", "items": { "type": "integer" } },
                "pair": { "type": "array", "items": [{ "type": "boolean" }, { "type": "number" }] }
            },
            "allOf": [
                { "properties": { "flag": { "type": "boolean" } } }
            ]
        });
        let coerced = coerce_value(
            &schema,
            &json!({ "ids": ["1", "2"], "pair": ["true", "2.5"], "flag": "false" }),
        );
        assert_eq!(
            coerced,
            json!({ "ids": [1, 2], "pair": [true, 2.5], "flag": false })
        );

        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "additionalProperties": { "type": "integer" }
        });
        let coerced = coerce_value(&schema, &json!({ "name": "7", "extra": "7" }));
        assert_eq!(coerced, json!({ "name": "7", "extra": 7 }));
    }
}
