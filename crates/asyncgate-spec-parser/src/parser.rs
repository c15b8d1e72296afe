use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Map, Value};

use crate::error::{ParseError, ValidationIssue};
use crate::model::{AsyncApiDocument, Channel, Message, Operation, ParameterDefinition};
use crate::schema::{annotate_schema, resolve_refs, RefError};

/// Root keys defined by the AsyncAPI 2.x document schema.
const ROOT_KEYS: &[&str] = &[
    "asyncapi",
    "id",
    "info",
    "servers",
    "defaultContentType",
    "channels",
    "components",
    "tags",
    "externalDocs",
];

/// Prefix of the vendor extensions we keep on the model.
const EXTENSION_PREFIX: &str = "x-asyncgate-";

/// Operation extension naming the controller module that implements it.
pub const CONTROLLER_EXTENSION: &str = "x-asyncgate-controller";

/// Parse an AsyncAPI document from a YAML/JSON string.
pub fn parse_spec(input: &str) -> Result<AsyncApiDocument, ParseError> {
    // JSON is valid YAML, so one parser covers both
    let root: Value = serde_yaml::from_str(input).map_err(|e| ParseError::Syntax(e.to_string()))?;
    parse_value(&root)
}

/// Parse a spec from a file path.
pub fn parse_spec_file(path: &std::path::Path) -> Result<AsyncApiDocument, ParseError> {
    let content = std::fs::read_to_string(path)?;
    let mut document = parse_spec(&content)?;
    document.filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());
    Ok(document)
}

/// Parse an already-deserialized document.
pub fn parse_value(root: &Value) -> Result<AsyncApiDocument, ParseError> {
    let root_obj = root
        .as_object()
        .ok_or_else(|| ParseError::Syntax("spec root must be an object".into()))?;

    let version = detect_version(root_obj)?;

    let mut issues = Vec::new();

    for key in root_obj.keys() {
        if !ROOT_KEYS.contains(&key.as_str()) && !key.starts_with("x-") {
            issues.push(ValidationIssue::new(
                "/",
                format!("unknown root property '{}'", key),
            ));
        }
    }

    let (title, api_version) = parse_info(root_obj, &mut issues);

    let default_content_type = root_obj
        .get("defaultContentType")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let channels = match root_obj.get("channels") {
        Some(Value::Object(channels)) => parse_channels(channels, root, &mut issues)?,
        Some(_) => {
            issues.push(ValidationIssue::new("/channels", "must be an object"));
            Vec::new()
        }
        None => {
            issues.push(ValidationIssue::new("/", "missing required 'channels' object"));
            Vec::new()
        }
    };

    check_unique_operation_ids(&channels, &mut issues);

    if !issues.is_empty() {
        return Err(ParseError::Validation { issues });
    }

    Ok(AsyncApiDocument {
        filename: None,
        version,
        title,
        api_version,
        default_content_type,
        channels,
        extensions: extract_extensions(root_obj),
    })
}

/// Check the `asyncapi` field and return the version string.
fn detect_version(root: &Map<String, Value>) -> Result<String, ParseError> {
    match root.get("asyncapi") {
        Some(Value::String(version)) if version.starts_with("2.") => Ok(version.clone()),
        Some(Value::String(version)) => Err(ParseError::UnsupportedFormat(format!(
            "unsupported AsyncAPI version: {} (only 2.x supported)",
            version
        ))),
        Some(_) => Err(ParseError::UnsupportedFormat(
            "'asyncapi' must be a version string".into(),
        )),
        None if root.contains_key("openapi") || root.contains_key("swagger") => Err(
            ParseError::UnsupportedFormat("OpenAPI documents are not supported".into()),
        ),
        None => Err(ParseError::UnsupportedFormat(
            "missing 'asyncapi' field".into(),
        )),
    }
}

fn parse_info(root: &Map<String, Value>, issues: &mut Vec<ValidationIssue>) -> (String, String) {
    let Some(info) = root.get("info").and_then(|v| v.as_object()) else {
        issues.push(ValidationIssue::new("/", "missing required 'info' object"));
        return (String::new(), String::new());
    };

    let title = match info.get("title").and_then(|v| v.as_str()) {
        Some(title) => title.to_string(),
        None => {
            issues.push(ValidationIssue::new("/info", "missing required 'title'"));
            String::new()
        }
    };

    let version = match info.get("version").and_then(|v| v.as_str()) {
        Some(version) => version.to_string(),
        None => {
            issues.push(ValidationIssue::new("/info", "missing required 'version'"));
            String::new()
        }
    };

    (title, version)
}

/// Extract all x-asyncgate-* keys from an object.
fn extract_extensions(obj: &Map<String, Value>) -> BTreeMap<String, Value> {
    obj.iter()
        .filter(|(k, _)| k.starts_with(EXTENSION_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Parse channels in declaration order.
fn parse_channels(
    channels: &Map<String, Value>,
    root: &Value,
    issues: &mut Vec<ValidationIssue>,
) -> Result<Vec<Channel>, ParseError> {
    let mut parsed = Vec::with_capacity(channels.len());
    // Anonymous schema ids are numbered across the whole document
    let mut schema_counter = 0;

    for (name, channel_value) in channels {
        let pointer = format!("/channels/{}", escape_pointer(name));

        let resolved = match resolve_refs(channel_value, root) {
            Ok(resolved) => resolved,
            Err(RefError::Unresolved(reference)) => {
                return Err(ParseError::UnresolvedRef(reference));
            }
            Err(RefError::Circular(reference)) => {
                issues.push(ValidationIssue::new(
                    pointer,
                    format!("circular $ref '{}'", reference),
                ));
                continue;
            }
        };

        let Some(channel_obj) = resolved.as_object() else {
            issues.push(ValidationIssue::new(pointer, "channel must be an object"));
            continue;
        };

        let parameters = parse_parameters(channel_obj, &pointer, issues);
        check_address_parameters(name, &parameters, &pointer, issues);

        let publish = parse_operation(
            channel_obj.get("publish"),
            &format!("{}/publish", pointer),
            &mut schema_counter,
            issues,
        );
        let subscribe = parse_operation(
            channel_obj.get("subscribe"),
            &format!("{}/subscribe", pointer),
            &mut schema_counter,
            issues,
        );

        parsed.push(Channel {
            name: name.clone(),
            description: channel_obj
                .get("description")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            parameters,
            publish,
            subscribe,
        });
    }

    Ok(parsed)
}

/// Parse the `parameters` map of a channel.
fn parse_parameters(
    channel: &Map<String, Value>,
    pointer: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<ParameterDefinition> {
    let params = match channel.get("parameters") {
        None => return Vec::new(),
        Some(Value::Object(params)) => params,
        Some(_) => {
            issues.push(ValidationIssue::new(
                format!("{}/parameters", pointer),
                "must be an object",
            ));
            return Vec::new();
        }
    };

    params
        .iter()
        .filter_map(|(name, param_value)| {
            let Some(param_obj) = param_value.as_object() else {
                issues.push(ValidationIssue::new(
                    format!("{}/parameters/{}", pointer, escape_pointer(name)),
                    "parameter must be an object",
                ));
                return None;
            };

            Some(ParameterDefinition {
                name: name.clone(),
                description: param_obj
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                schema: param_obj.get("schema").cloned().unwrap_or_else(|| json!({})),
                location: param_obj
                    .get("location")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            })
        })
        .collect()
}

/// Every `{name}` in the address must be declared, and every declared
/// parameter must be used.
fn check_address_parameters(
    name: &str,
    parameters: &[ParameterDefinition],
    pointer: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let used = address_parameters(name);

    for param in &used {
        if !parameters.iter().any(|p| &p.name == param) {
            issues.push(ValidationIssue::new(
                pointer,
                format!("channel parameter '{}' is not declared in 'parameters'", param),
            ));
        }
    }

    for param in parameters {
        if !used.contains(&param.name) {
            issues.push(ValidationIssue::new(
                format!("{}/parameters/{}", pointer, escape_pointer(&param.name)),
                format!(
                    "parameter '{}' does not appear in the channel address",
                    param.name
                ),
            ));
        }
    }
}

/// Names of the `{param}` placeholders in a channel address, in order.
fn address_parameters(address: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = address;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        names.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    names
}

/// Parse a publish/subscribe operation object.
fn parse_operation(
    value: Option<&Value>,
    pointer: &str,
    schema_counter: &mut usize,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Operation> {
    let op_obj = match value? {
        Value::Object(obj) => obj,
        _ => {
            issues.push(ValidationIssue::new(pointer, "operation must be an object"));
            return None;
        }
    };

    let tags = match op_obj.get("tags") {
        None => Vec::new(),
        Some(Value::Array(tags)) => tags
            .iter()
            .filter_map(|tag| {
                let name = tag.get("name").and_then(|v| v.as_str());
                if name.is_none() {
                    issues.push(ValidationIssue::new(
                        format!("{}/tags", pointer),
                        "tag must be an object with a 'name'",
                    ));
                }
                name.map(|s| s.to_string())
            })
            .collect(),
        Some(_) => {
            issues.push(ValidationIssue::new(
                format!("{}/tags", pointer),
                "must be an array",
            ));
            Vec::new()
        }
    };

    let controller = match op_obj.get(CONTROLLER_EXTENSION) {
        None => None,
        Some(Value::String(controller)) => Some(controller.clone()),
        Some(_) => {
            issues.push(ValidationIssue::new(
                format!("{}/{}", pointer, CONTROLLER_EXTENSION),
                "must be a string",
            ));
            None
        }
    };

    let message = match op_obj.get("message") {
        None => empty_message(schema_counter),
        Some(Value::Object(msg)) if msg.contains_key("oneOf") => {
            issues.push(ValidationIssue::new(
                format!("{}/message", pointer),
                "'oneOf' messages are not supported, an operation carries exactly one message",
            ));
            empty_message(schema_counter)
        }
        Some(Value::Object(msg)) => parse_message(msg, schema_counter),
        Some(_) => {
            issues.push(ValidationIssue::new(
                format!("{}/message", pointer),
                "message must be an object",
            ));
            empty_message(schema_counter)
        }
    };

    Some(Operation {
        operation_id: op_obj
            .get("operationId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        summary: op_obj
            .get("summary")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        tags,
        controller,
        message,
        extensions: extract_extensions(op_obj),
    })
}

fn parse_message(msg: &Map<String, Value>, schema_counter: &mut usize) -> Message {
    let original_payload = msg.get("payload").cloned().unwrap_or_else(|| json!({}));

    let mut payload = original_payload.clone();
    annotate_schema(&mut payload, schema_counter);

    let headers = msg.get("headers").cloned().map(|mut headers| {
        annotate_schema(&mut headers, schema_counter);
        headers
    });

    Message {
        name: msg
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        content_type: msg
            .get("contentType")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        payload,
        original_payload,
        headers,
    }
}

/// A message with a match-anything payload.
fn empty_message(schema_counter: &mut usize) -> Message {
    let mut payload = json!({});
    annotate_schema(&mut payload, schema_counter);
    Message {
        name: None,
        content_type: None,
        payload,
        original_payload: json!({}),
        headers: None,
    }
}

fn check_unique_operation_ids(channels: &[Channel], issues: &mut Vec<ValidationIssue>) {
    let mut seen: HashMap<&str, String> = HashMap::new();

    for channel in channels {
        let operations = [("publish", &channel.publish), ("subscribe", &channel.subscribe)];
        for (kind, op) in operations {
            let Some(op_id) = op.as_ref().and_then(|op| op.operation_id.as_deref()) else {
                continue;
            };
            let location = format!("/channels/{}/{}", escape_pointer(&channel.name), kind);
            if let Some(first) = seen.get(op_id) {
                issues.push(ValidationIssue::new(
                    location,
                    format!(
                        "operationId '{}' is not unique (first declared at {})",
                        op_id, first
                    ),
                ));
            } else {
                seen.insert(op_id, location);
            }
        }
    }
}

/// Escape a key for use as a JSON pointer segment (RFC 6901).
fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
