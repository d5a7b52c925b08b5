use std::fmt::Write;

use crate::executor::{Params, Tool, ToolError, ToolOutput};

/// Model-facing description of a tool.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: schemars::Schema,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{name}' is already registered")]
    DuplicateName { name: String },
}

/// Name-indexed set of tools, kept in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateName` if a tool with the same name exists.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.definition().name;
        if self.get(name).is_some() {
            return Err(RegistryError::DuplicateName { name: name.into() });
        }
        tracing::debug!(tool = name, "registered tool");
        self.tools.push(tool);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.definition().name == name)
            .map(|t| &**t)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.definition().name).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every tool in registration order.
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolDef> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Dispatch a call by name. The tool's own result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::UnknownTool` listing the available names when `name` is not
    /// registered, otherwise whatever the tool returns.
    pub async fn execute(&self, name: &str, params: &Params) -> Result<ToolOutput, ToolError> {
        let Some(tool) = self.get(name) else {
            return Err(ToolError::UnknownTool {
                name: name.into(),
                available: self.names().into_iter().map(String::from).collect(),
            });
        };
        tool.execute(params).await
    }

    /// Plain-text listing of tools and their parameters.
    #[must_use]
    pub fn format_listing(&self) -> String {
        let mut out = String::new();
        for def in self.schemas() {
            let _ = writeln!(out, "## {}", def.name);
            let _ = writeln!(out, "{}", def.description);
            format_schema_params(&mut out, &def.schema);
            out.push('\n');
        }
        out
    }
}

/// `Option<T>` renders as `"type": ["T", "null"]` or an `anyOf` with a null arm.
fn non_null_type(obj: &serde_json::Map<String, serde_json::Value>) -> Option<&str> {
    if let Some(arr) = obj.get("type").and_then(|v| v.as_array()) {
        return arr.iter().filter_map(|v| v.as_str()).find(|t| *t != "null");
    }
    obj.get("anyOf")?
        .as_array()?
        .iter()
        .filter_map(|v| v.get("type")?.as_str())
        .find(|t| *t != "null")
}

fn format_schema_params(out: &mut String, schema: &schemars::Schema) {
    let Some(obj) = schema.as_object() else {
        return;
    };
    let Some(serde_json::Value::Object(props)) = obj.get("properties") else {
        return;
    };
    if props.is_empty() {
        return;
    }

    let required: Vec<&str> = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let _ = writeln!(out, "Parameters:");
    for (name, prop) in props {
        let Some(prop) = prop.as_object() else {
            continue;
        };
        let ty = prop
            .get("type")
            .and_then(|v| v.as_str())
            .or_else(|| non_null_type(prop))
            .unwrap_or("string");
        let desc = prop
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let req = if required.contains(&name.as_str()) {
            "required"
        } else {
            "optional"
        };
        let _ = writeln!(out, "  - {name}: {desc} ({ty}, {req})");
    }
}
