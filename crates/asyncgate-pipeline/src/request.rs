use http::Method;
use serde::Serialize;
use serde_json::Value;

/// JSON object map (keeps insertion order).
pub type JsonMap = serde_json::Map<String, Value>;

/// A request as seen by pipeline stages.
///
/// `params` and `headers` hold the raw string values the host extracted;
/// validation stages never rewrite them, they publish their validated copy
/// into [`ApiContext`] instead.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Path captures, keyed by parameter name (plus `"0"` for a trailing remainder).
    pub params: JsonMap,
    /// Header values, keyed by lowercase name.
    pub headers: JsonMap,
    /// Decoded message payload (`Null` when the request carried none).
    pub body: Value,
    /// Per-request context, created fresh for every request.
    pub api: ApiContext,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .insert(name.into(), Value::String(value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into(), Value::String(value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// The per-request context mapping stages write validated data into.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ApiContext(JsonMap);

impl ApiContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Set one key, leaving every other key untouched.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &JsonMap {
        &self.0
    }

    pub fn into_inner(self) -> JsonMap {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_stores_string_values() {
        let req = Request::new(Method::POST, "/light.measured")
            .with_param("streetlightId", "42")
            .with_header("x-request-id", "abc")
            .with_body(json!({ "lumens": 3 }));

        assert_eq!(req.params["streetlightId"], json!("42"));
        assert_eq!(req.headers["x-request-id"], json!("abc"));
        assert_eq!(req.body["lumens"], 3);
        assert!(req.api.is_empty());
    }

    #[test]
    fn context_insert_preserves_other_keys() {
        let mut api = ApiContext::new();
        api.insert("touched", json!(true));
        api.insert("params", json!({ "id": 1 }));
        api.insert("params", json!({ "id": 2 }));

        assert_eq!(api.len(), 2);
        assert_eq!(api.get("touched"), Some(&json!(true)));
        assert_eq!(api.get("params"), Some(&json!({ "id": 2 })));
        assert_eq!(serde_json::to_value(&api).unwrap()["touched"], true);
    }
}
