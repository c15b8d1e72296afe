use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A parsed AsyncAPI 2.x document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncApiDocument {
    /// Source file name, when parsed from disk.
    pub filename: Option<String>,
    /// The `asyncapi` version string (e.g. "2.5.0").
    pub version: String,
    /// The `info.title` field.
    pub title: String,
    /// The `info.version` field.
    pub api_version: String,
    /// Root `defaultContentType`, if declared.
    pub default_content_type: Option<String>,
    /// Channels in declaration order.
    pub channels: Vec<Channel>,
    /// Raw `x-asyncgate-*` extensions at root level.
    pub extensions: BTreeMap<String, Value>,
}

impl AsyncApiDocument {
    /// Channel names in declaration order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }
}

/// A named channel (path or topic), possibly with `{param}` segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub description: Option<String>,
    /// Declared parameters, in declaration order.
    pub parameters: Vec<ParameterDefinition>,
    /// The operation clients use to send messages to this channel.
    pub publish: Option<Operation>,
    pub subscribe: Option<Operation>,
}

impl Channel {
    pub fn has_publish(&self) -> bool {
        self.publish.is_some()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// A channel parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub description: Option<String>,
    /// The parameter schema (`{}` when none is declared).
    pub schema: Value,
    /// The runtime-expression `location`, if any.
    pub location: Option<String>,
}

impl ParameterDefinition {
    /// The declared `type` keyword, if it is a single type name.
    pub fn declared_type(&self) -> Option<&str> {
        self.schema.get("type").and_then(Value::as_str)
    }
}

/// A publish or subscribe operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    /// Tag names, in declaration order.
    pub tags: Vec<String>,
    /// Controller binding from `x-asyncgate-controller`.
    pub controller: Option<String>,
    pub message: Message,
    /// Operation-level `x-asyncgate-*` extensions.
    pub extensions: BTreeMap<String, Value>,
}

impl Operation {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// The message carried by an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub name: Option<String>,
    pub content_type: Option<String>,
    /// Payload schema after parser annotation.
    pub payload: Value,
    /// Payload schema exactly as declared (refs resolved, no annotation).
    pub original_payload: Value,
    /// Header schema after parser annotation.
    pub headers: Option<Value>,
}
