use std::{any::Any, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ToolError;

/// Capability the model can invoke by name
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameter schema advertised to the model
    fn definition(&self) -> &ToolDefinition;

    /// Run the tool with decoded arguments and the caller-supplied context
    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<String, ToolError>;
}

/// Definition of a tool the model can call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    /// Human-readable description
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter
    #[must_use]
    pub fn parameter(
        mut self,
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.parameters.push(ToolParameter {
            name: name.into(),
            kind,
            description: description.into(),
            required,
        });
        self
    }

    /// JSON Schema object describing the parameters
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|param| {
                let mut schema = json!({ "type": param.kind });
                if !param.description.is_empty() {
                    schema["description"] = Value::String(param.description.clone());
                }
                (param.name.clone(), schema)
            })
            .collect();

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A named, typed parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// JSON Schema primitive type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Opaque caller state handed to every tool execution
///
/// The orchestration core never inspects it; tools downcast to the type the
/// application stored.
#[derive(Clone, Default)]
pub struct ToolContext {
    inner: Option<Arc<dyn Any + Send + Sync>>,
}

impl ToolContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Some(Arc::new(value)),
        }
    }

    pub const fn empty() -> Self {
        Self { inner: None }
    }

    pub const fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Borrow the stored value if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_deref()?.downcast_ref()
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext").field("present", &self.inner.is_some()).finish()
    }
}
