//! Tool descriptors, tool calls and the function-name encoding exposed to
//! the model.

use serde::{Deserialize, Serialize};

/// Delimiter between server id and tool name in model-facing function names.
pub const FUNCTION_NAME_DELIMITER: &str = "__";

/// Build the model-facing function name `<serverId>__<toolName>`.
pub fn encode_function_name(server_id: &str, tool_name: &str) -> String {
    format!("{}{}{}", server_id, FUNCTION_NAME_DELIMITER, tool_name)
}

/// Split a model-facing function name into `(server_id, tool_name)`.
///
/// Only the first `__` is a delimiter, so tool names may contain
/// underscores (including `__`) themselves. Returns `None` when the
/// delimiter is missing or either half is empty.
pub fn parse_function_name(name: &str) -> Option<(&str, &str)> {
    let (server, tool) = name.split_once(FUNCTION_NAME_DELIMITER)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// A tool discovered on an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub server_id: String,
    pub server_name: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments
    pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
    /// The function name exposed to the model.
    pub fn function_name(&self) -> String {
        encode_function_name(&self.server_id, &self.name)
    }

    /// Build the model-facing declaration for this tool.
    pub fn to_declaration(&self) -> FunctionDeclaration {
        let description = format!(
            "[{}] {}",
            self.server_name,
            self.description.as_deref().unwrap_or_default()
        );
        FunctionDeclaration {
            name: self.function_name(),
            description: description.trim_end().to_string(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Wire wrapper `{"type": "function", "function": {...}}` for the `tools`
/// array of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDeclaration,
}

impl From<FunctionDeclaration> for FunctionTool {
    fn from(function: FunctionDeclaration) -> Self {
        Self {
            kind: "function".to_string(),
            function,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Function name and raw argument string of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Argument JSON as streamed by the model; may be partial until the
    /// response completes
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parse the accumulated argument string.
    ///
    /// An empty string is treated as an empty object.
    pub fn parse_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.function.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.function.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_function_name_first_delimiter_only() {
        assert_eq!(
            parse_function_name("fs__read_file"),
            Some(("fs", "read_file"))
        );
        assert_eq!(
            parse_function_name("fs__read__file"),
            Some(("fs", "read__file"))
        );
        assert_eq!(parse_function_name("no_delimiter"), None);
        assert_eq!(parse_function_name("__tool"), None);
        assert_eq!(parse_function_name("server__"), None);
    }

    #[test]
    fn test_function_name_round_trip() {
        for tool in ["read_file", "a__b", "x___y", "__lead"] {
            let encoded = encode_function_name("srv", tool);
            assert_eq!(parse_function_name(&encoded), Some(("srv", tool)));
        }
    }

    #[test]
    fn test_declaration_prefixes_server_name() {
        let tool = ToolDescriptor {
            server_id: "s1".into(),
            server_name: "Files".into(),
            name: "read_file".into(),
            description: Some("Read a file".into()),
            input_schema: json!({"type": "object"}),
        };
        let decl = tool.to_declaration();
        assert_eq!(decl.name, "s1__read_file");
        assert_eq!(decl.description, "[Files] Read a file");

        let wire = serde_json::to_value(FunctionTool::from(decl)).unwrap();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "s1__read_file");
    }

    #[test]
    fn test_parse_arguments() {
        let call = ToolCall::new("c1", "s__t", r#"{"path": "/tmp"}"#);
        assert_eq!(call.parse_arguments().unwrap(), json!({"path": "/tmp"}));

        let empty = ToolCall::new("c2", "s__t", "");
        assert_eq!(empty.parse_arguments().unwrap(), json!({}));

        let broken = ToolCall::new("c3", "s__t", r#"{"path": "#);
        assert!(broken.parse_arguments().is_err());
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let call = ToolCall::new("c1", "s__t", "{}");
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({"id": "c1", "type": "function", "function": {"name": "s__t", "arguments": "{}"}})
        );
    }
}
