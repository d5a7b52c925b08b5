use std::fmt;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::permissions::PermissionError;
use crate::registry::ToolDef;

/// Arguments of a single tool call, exactly as the model supplied them.
pub type Params = Map<String, Value>;

/// Structured result from a successful tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub tool_name: String,
    pub data: Map<String, Value>,
}

impl ToolOutput {
    #[must_use]
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            data: Map::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.data.clone()))
    }
}

/// Errors that can occur during tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{reason}")]
    Blocked { reason: String },

    #[error("permission denied for {operation}")]
    PermissionDenied { operation: String },

    #[error("command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("invalid command syntax: {message}")]
    InvalidSyntax { message: String },

    #[error("unknown tool '{name}'. Available tools: {}", available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("execution failed: {0}")]
    Execution(#[from] std::io::Error),

    #[error(transparent)]
    Permission(#[from] PermissionError),
}

/// Render a tool result as the JSON object fed back to the model.
///
/// Successful outputs carry `"success": true` plus their data fields; failures carry
/// `"success": false` and the error text.
#[must_use]
pub fn result_record(result: &Result<ToolOutput, ToolError>) -> Value {
    let mut record = Map::new();
    match result {
        Ok(output) => {
            record.insert("success".into(), Value::Bool(true));
            for (key, value) in &output.data {
                record.insert(key.clone(), value.clone());
            }
        }
        Err(err) => {
            record.insert("success".into(), Value::Bool(false));
            record.insert("error".into(), Value::String(err.to_string()));
        }
    }
    Value::Object(record)
}

/// Deserialize tool call params into a typed struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned>(params: &Params) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}

/// A capability the model may invoke by name.
///
/// Implementations perform their own safety checks (classification, path validation,
/// approval) before touching the system.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDef;

    fn execute<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, Result<ToolOutput, ToolError>>;
}
