//! Registration options (`asyncgate.yaml`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// Conventional option file name.
pub const DEFAULT_CONFIG_FILE: &str = "asyncgate.yaml";

/// Options for one registration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Compile only operations carrying this tag.
    pub tag: Option<String>,
    /// Base location joined with each operation's controller reference.
    pub controllers: String,
    /// Replace unresolvable handlers with logging stubs instead of failing.
    pub stub_middleware: bool,
    /// When false, routes get validation stages only.
    pub require_controller: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            tag: None,
            controllers: String::new(),
            stub_middleware: false,
            require_controller: true,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_controllers(mut self, base: impl Into<String>) -> Self {
        self.controllers = base.into();
        self
    }

    pub fn with_stub_middleware(mut self, enabled: bool) -> Self {
        self.stub_middleware = enabled;
        self
    }

    pub fn with_require_controller(mut self, required: bool) -> Self {
        self.require_controller = required;
        self
    }

    /// Load options from a YAML file.
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompileError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content, path)
    }

    /// Parse options from YAML content. `path` is only used in messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, CompileError> {
        // An empty file deserializes to unit, not to the defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            CompileError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}
