//! Conversions between MCP tool shapes and the model-facing tool model.

use parley_core::{McpServerDescriptor, ToolDescriptor};

use crate::protocol::{CallToolResult, McpToolDefinition, ToolContent};

/// Describe a server tool for the model.
pub fn describe_tool(server: &McpServerDescriptor, tool: McpToolDefinition) -> ToolDescriptor {
    ToolDescriptor {
        server_id: server.id.clone(),
        server_name: server.name.clone(),
        name: tool.name,
        description: tool.description,
        input_schema: tool.input_schema,
    }
}

/// Render a tool result as the text of a tool-role message.
///
/// A lone text item is passed through, a lone image becomes a placeholder
/// naming its MIME type, and anything else is the raw result as JSON.
pub fn format_tool_result(result: &CallToolResult) -> String {
    let mut content = result.content();
    if content.is_empty() {
        return "No result".to_string();
    }

    if content.len() == 1 {
        match content.pop().flatten() {
            Some(ToolContent::Text { text }) => return text,
            Some(ToolContent::Image { mime_type, .. }) => return format!("[Image: {}]", mime_type),
            _ => {}
        }
    }

    serde_json::to_string(&result.0).unwrap_or_else(|_| result.0.to_string())
}
