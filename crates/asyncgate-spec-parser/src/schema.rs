//! Schema-level helpers: `$ref` resolution and parser metadata.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

/// Reserved annotation key the parser attaches to every message schema.
///
/// Not JSON Schema vocabulary: it must be removed before a schema reaches
/// the validator engine.
pub const PARSER_SCHEMA_ID: &str = "x-parser-schema-id";

/// Keywords whose value is a single subschema (or an array of them).
const SUBSCHEMA_KEYWORDS: &[&str] = &[
    "items",
    "additionalItems",
    "additionalProperties",
    "contains",
    "propertyNames",
    "not",
    "if",
    "then",
    "else",
];

/// Keywords whose value maps names to subschemas.
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties", "patternProperties", "definitions", "$defs"];

/// Keywords whose value is an array of subschemas.
const SCHEMA_LIST_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf"];

/// Remove [`PARSER_SCHEMA_ID`] from every nested object and array level.
pub fn strip_parser_metadata(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != PARSER_SCHEMA_ID)
                .map(|(key, value)| (key.clone(), strip_parser_metadata(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_parser_metadata).collect()),
        other => other.clone(),
    }
}

/// Attach [`PARSER_SCHEMA_ID`] to a schema and all of its subschemas.
///
/// Uses `$id` when the schema declares one, otherwise a document-wide
/// `<anonymous-schema-N>` counter.
pub(crate) fn annotate_schema(schema: &mut Value, counter: &mut usize) {
    let Value::Object(map) = schema else {
        return;
    };

    if !map.contains_key(PARSER_SCHEMA_ID) {
        let id = match map.get("$id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                *counter += 1;
                format!("<anonymous-schema-{}>", counter)
            }
        };
        map.insert(PARSER_SCHEMA_ID.to_string(), Value::String(id));
    }

    for keyword in SCHEMA_MAP_KEYWORDS {
        if let Some(Value::Object(children)) = map.get_mut(*keyword) {
            for child in children.values_mut() {
                annotate_schema(child, counter);
            }
        }
    }

    for keyword in SUBSCHEMA_KEYWORDS {
        match map.get_mut(*keyword) {
            Some(Value::Array(children)) => {
                for child in children {
                    annotate_schema(child, counter);
                }
            }
            Some(child) => annotate_schema(child, counter),
            None => {}
        }
    }

    for keyword in SCHEMA_LIST_KEYWORDS {
        if let Some(Value::Array(children)) = map.get_mut(*keyword) {
            for child in children {
                annotate_schema(child, counter);
            }
        }
    }
}

/// Why a `$ref` could not be inlined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RefError {
    /// Not a local pointer, or the pointer target does not exist.
    Unresolved(String),
    /// The reference points back at itself without any schema in between.
    Circular(String),
}

/// Inline every local `$ref` under `node`, looking targets up in `root`.
///
/// A reference met again while its own target is being inlined stays a
/// `$ref`, aimed at an `$id` stamped on the outermost inlined copy, so
/// recursive schemas come out as finite self-contained trees.
pub(crate) fn resolve_refs(node: &Value, root: &Value) -> Result<Value, RefError> {
    let mut resolver = RefResolver {
        root,
        stack: Vec::new(),
        recursive: BTreeSet::new(),
    };
    resolver.resolve(node)
}

/// `$id` given to the inlined target of a recursive reference.
fn recursive_ref_id(reference: &str) -> String {
    let name: String = reference
        .trim_start_matches(['#', '/'])
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { ':' })
        .collect();
    format!("urn:asyncgate:ref:{}", name)
}

struct RefResolver<'a> {
    root: &'a Value,
    stack: Vec<String>,
    recursive: BTreeSet<String>,
}

impl RefResolver<'_> {
    fn resolve(&mut self, node: &Value) -> Result<Value, RefError> {
        match node {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    return self.resolve_ref(reference);
                }

                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn resolve_ref(&mut self, reference: &str) -> Result<Value, RefError> {
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| RefError::Unresolved(reference.to_string()))?;

        if self.stack.iter().any(|seen| seen == reference) {
            self.recursive.insert(reference.to_string());
            return Ok(json!({ "$ref": recursive_ref_id(reference) }));
        }

        let target = self
            .root
            .pointer(pointer)
            .ok_or_else(|| RefError::Unresolved(reference.to_string()))?;

        self.stack.push(reference.to_string());
        let resolved = self.resolve(target);
        self.stack.pop();
        let mut resolved = resolved?;

        if self.recursive.remove(reference) {
            let id = recursive_ref_id(reference);
            match resolved.as_object_mut() {
                Some(map) if !is_bare_ref(map) => {
                    map.insert("$id".to_string(), Value::String(id));
                }
                _ => return Err(RefError::Circular(reference.to_string())),
            }
        }

        Ok(resolved)
    }
}

/// An object that is nothing but a `$ref`.
fn is_bare_ref(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.contains_key("$ref")
}
