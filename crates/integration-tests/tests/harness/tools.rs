//! Tools handed to the client in tests

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use cadence_llm::{ParameterKind, Tool, ToolContext, ToolDefinition, ToolError};
use serde_json::Value;

/// Adds `a` and `b`, counting invocations
pub struct Calculator {
    definition: ToolDefinition,
    pub invocations: AtomicU32,
}

impl Calculator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            definition: ToolDefinition::new("add", "Add two numbers")
                .parameter("a", ParameterKind::Number, "First operand", true)
                .parameter("b", ParameterKind::Number, "Second operand", true),
            invocations: AtomicU32::new(0),
        })
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for Calculator {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, arguments: Value, _context: &ToolContext) -> Result<String, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let operand = |key: &str| {
            arguments[key]
                .as_f64()
                .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a number")))
        };
        let sum = operand("a")? + operand("b")?;

        Ok(sum.to_string())
    }
}
