//! Where a specification comes from, and how it gets parsed.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use serde_json::Value;

use asyncgate_spec_parser::{parse_spec, parse_value, AsyncApiDocument, ParseError};

/// A specification in any of the forms `register` accepts.
#[derive(Debug, Clone)]
pub enum SpecSource {
    /// Already parsed; used as is.
    Document(AsyncApiDocument),
    /// YAML or JSON text.
    Text(String),
    /// A deserialized JSON/YAML value.
    Json(Value),
    /// A file to read.
    File(PathBuf),
}

impl From<AsyncApiDocument> for SpecSource {
    fn from(document: AsyncApiDocument) -> Self {
        SpecSource::Document(document)
    }
}

impl From<&str> for SpecSource {
    fn from(text: &str) -> Self {
        SpecSource::Text(text.to_string())
    }
}

impl From<String> for SpecSource {
    fn from(text: String) -> Self {
        SpecSource::Text(text)
    }
}

impl From<Value> for SpecSource {
    fn from(value: Value) -> Self {
        SpecSource::Json(value)
    }
}

impl From<PathBuf> for SpecSource {
    fn from(path: PathBuf) -> Self {
        SpecSource::File(path)
    }
}

impl From<&Path> for SpecSource {
    fn from(path: &Path) -> Self {
        SpecSource::File(path.to_path_buf())
    }
}

/// Turns a [`SpecSource`] into a document.
pub trait SpecParser: Send + Sync {
    fn parse(&self, source: SpecSource) -> BoxFuture<'_, Result<AsyncApiDocument, ParseError>>;
}

/// The default parser: `asyncgate-spec-parser`, with async file reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncApiParser;

impl SpecParser for AsyncApiParser {
    fn parse(&self, source: SpecSource) -> BoxFuture<'_, Result<AsyncApiDocument, ParseError>> {
        Box::pin(async move {
            match source {
                SpecSource::Document(document) => Ok(document),
                SpecSource::Text(text) => parse_spec(&text),
                SpecSource::Json(value) => parse_value(&value),
                SpecSource::File(path) => {
                    let content = tokio::fs::read_to_string(&path).await?;
                    let mut document = parse_spec(&content)?;
                    document.filename = path
                        .file_name()
                        .and_then(|s| s.to_str())
                        .map(|s| s.to_string());
                    Ok(document)
                }
            }
        })
    }
}
