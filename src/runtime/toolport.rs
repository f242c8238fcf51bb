use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::CatalogError;

/// Input for tool execution
#[derive(Debug, Clone)]
pub struct ToolInput {
    /// Tool arguments as structured data
    pub payload: Value,
    /// Result cardinality cap for this request
    pub row_cap: usize,
}

/// Output from tool execution
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Tool result payload as structured data
    pub payload: Value,
}

/// Error types for tool execution
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// The candidate query failed the read-only safety check. Recoverable:
    /// the planner reformulates or gives up, the catalog is never touched.
    #[error("query rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A single external capability.
///
/// Tools are stateless interfaces that perform one operation. They do NOT
/// decide when to run - that authority belongs to the Executor, which is
/// their only caller.
#[async_trait]
pub trait ToolPort: Send + Sync {
    /// Returns the name of this tool
    fn name(&self) -> &str;

    /// Execute the tool with the given input
    async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError>;
}

/// Maps tool names to ToolPort implementations. Only the Executor should
/// reach into the registry.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn ToolPort>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: ToolPort + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolPort> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed tool call request emitted by the model
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Parses a tool call from model output.
///
/// Strict by construction: the output must be a single JSON object (bare or
/// in one code fence) with type == "tool_call", a non-empty name, and an
/// object for arguments. Any ambiguity - trailing prose, multiple blocks,
/// wrong shapes - yields None and the output is treated as plain text.
/// Never panics.
pub fn parse_tool_call(output: &str) -> Option<ToolCall> {
    let trimmed = output.trim();

    // HARD SIZE LIMIT: pathological outputs are not worth parsing.
    if trimmed.len() > 10_000 || trimmed.is_empty() {
        return None;
    }

    if !trimmed.starts_with('{') && !trimmed.starts_with("```") {
        return None;
    }

    let json_str = match strip_code_fence(trimmed) {
        Some(inner) => inner,
        None => return None,
    };

    let value: Value = serde_json::from_str(json_str).ok()?;
    let obj = value.as_object()?;

    // Type field must exist, be a string, and equal exactly "tool_call".
    if obj.get("type")?.as_str()? != "tool_call" {
        return None;
    }

    let name = obj.get("name")?.as_str()?;
    if name.is_empty() {
        return None;
    }

    let arguments = obj.get("arguments")?;
    arguments.as_object()?;

    Some(ToolCall {
        name: name.to_string(),
        arguments: arguments.clone(),
    })
}

/// Unwraps ```json ... ``` / ``` ... ``` fences; bare text passes through.
/// A fence that opens without closing, or closes into more text, is invalid.
fn strip_code_fence(text: &str) -> Option<&str> {
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        let inner = rest.strip_suffix("```")?;
        let inner = inner.trim();
        if inner.is_empty() {
            return None;
        }
        Some(inner)
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_tool_call_parses() {
        let out = r#"{"type":"tool_call","name":"sql_query","arguments":{"sql":"SELECT 1"}}"#;
        let call = parse_tool_call(out).unwrap();
        assert_eq!(call.name, "sql_query");
        assert_eq!(call.arguments["sql"], "SELECT 1");
    }

    #[test]
    fn fenced_tool_call_parses() {
        let out = "```json\n{\"type\":\"tool_call\",\"name\":\"sql_query\",\"arguments\":{\"sql\":\"SELECT 1\"}}\n```";
        assert!(parse_tool_call(out).is_some());
    }

    #[test]
    fn plain_text_is_not_a_tool_call() {
        assert!(parse_tool_call("I found 3 apartments in Dubai Marina.").is_none());
        assert!(parse_tool_call("").is_none());
    }

    #[test]
    fn wrong_type_field_is_rejected() {
        assert!(parse_tool_call(r#"{"type":"function","name":"sql_query","arguments":{}}"#).is_none());
        assert!(parse_tool_call(r#"{"name":"sql_query","arguments":{}}"#).is_none());
        assert!(parse_tool_call(r#"{"type":"tool_call","name":"","arguments":{}}"#).is_none());
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        for args in [json!(null), json!("SELECT 1"), json!([1, 2]), json!(3)] {
            let out = json!({"type": "tool_call", "name": "sql_query", "arguments": args});
            assert!(parse_tool_call(&out.to_string()).is_none());
        }
    }

    #[test]
    fn trailing_prose_after_json_is_rejected() {
        let out = r#"{"type":"tool_call","name":"sql_query","arguments":{}} and then some"#;
        assert!(parse_tool_call(out).is_none());
    }

    #[test]
    fn oversized_output_is_rejected() {
        let huge = format!(
            r#"{{"type":"tool_call","name":"sql_query","arguments":{{"sql":"{}"}}}}"#,
            "x".repeat(11_000)
        );
        assert!(parse_tool_call(&huge).is_none());
    }

    #[test]
    fn registry_round_trip() {
        struct Dummy;
        #[async_trait]
        impl ToolPort for Dummy {
            fn name(&self) -> &str {
                "dummy"
            }
            async fn execute(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
                Ok(ToolOutput {
                    payload: input.payload,
                })
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Dummy);
        assert!(registry.get("dummy").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list_tools(), vec!["dummy".to_string()]);
    }
}
