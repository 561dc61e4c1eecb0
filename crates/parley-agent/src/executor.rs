//! Tool execution.
//!
//! [`ToolExecutor`] maps a model-issued tool call back to an MCP server and
//! runs it. Every failure is reported in-band as the tool result text so
//! the model can react; nothing here aborts a turn.
//!
//! ```text
//! Agent
//!   └─> ToolExecutor (name resolution, argument parsing, result formatting)
//!       └─> ToolBackend (discovery + tools/call)
//!           └─> McpClientRegistry -> McpClient per server
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use parley_core::{parse_function_name, McpServerDescriptor, ToolCall};
use parley_mcp::{format_tool_result, CallToolResult, DiscoveryReport, McpClientRegistry, McpError};

/// Where tools come from and how they are invoked.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// List tools from every enabled server.
    async fn discover(&self, servers: &[McpServerDescriptor]) -> Result<DiscoveryReport, McpError>;

    /// Invoke `tool` on `server`.
    async fn call(
        &self,
        server: &McpServerDescriptor,
        tool: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError>;
}

#[async_trait]
impl ToolBackend for McpClientRegistry {
    async fn discover(&self, servers: &[McpServerDescriptor]) -> Result<DiscoveryReport, McpError> {
        Ok(self.discover_tools(servers).await)
    }

    async fn call(
        &self,
        server: &McpServerDescriptor,
        tool: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        self.client_for(server).call_tool(tool, arguments).await
    }
}

/// Record of one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub call_id: String,
    /// Name as issued by the model
    pub function_name: String,
    /// Resolved server, if any
    pub server_id: Option<String>,
    /// Text sent back to the model
    pub output: String,
    pub success: bool,
}

impl ToolExecution {
    fn failed(call: &ToolCall, server_id: Option<String>, output: String) -> Self {
        Self {
            call_id: call.id.clone(),
            function_name: call.function.name.clone(),
            server_id,
            output,
            success: false,
        }
    }
}

/// Resolves and runs tool calls against a [`ToolBackend`].
#[derive(Clone)]
pub struct ToolExecutor {
    backend: Arc<dyn ToolBackend>,
}

impl ToolExecutor {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn ToolBackend> {
        &self.backend
    }

    /// Execute one call.
    ///
    /// Unknown names and missing or disabled servers produce an error
    /// string. So do invalid argument JSON and failures inside the tool.
    pub async fn execute(&self, call: &ToolCall, servers: &[McpServerDescriptor]) -> ToolExecution {
        let name = call.function.name.as_str();

        let resolved = parse_function_name(name).and_then(|(server_id, tool)| {
            servers
                .iter()
                .find(|s| s.enabled && s.id == server_id)
                .map(|server| (server, tool))
        });

        let Some((server, tool)) = resolved else {
            warn!(tool = %name, "Unknown tool or server not found");
            let output = match parse_function_name(name) {
                Some((server_id, _)) => format!(
                    "Error: unknown tool '{}': server '{}' not found or disabled",
                    name, server_id
                ),
                None => format!("Error: unknown tool '{}'", name),
            };
            return ToolExecution::failed(call, None, output);
        };

        let arguments = match call.parse_arguments() {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool arguments are not valid JSON");
                return ToolExecution::failed(
                    call,
                    Some(server.id.clone()),
                    format!("Error executing tool: invalid arguments: {}", e),
                );
            }
        };

        debug!(server = %server.id, tool = %tool, "Executing tool");
        match self.backend.call(server, tool, arguments).await {
            Ok(result) => ToolExecution {
                call_id: call.id.clone(),
                function_name: name.to_string(),
                server_id: Some(server.id.clone()),
                output: format_tool_result(&result),
                success: !result.is_error(),
            },
            Err(e) => {
                warn!(server = %server.id, tool = %tool, error = %e, "Tool execution failed");
                ToolExecution::failed(
                    call,
                    Some(server.id.clone()),
                    format!("Error executing tool: {}", e),
                )
            }
        }
    }

    /// Execute calls in order.
    pub async fn execute_all(
        &self,
        calls: &[ToolCall],
        servers: &[McpServerDescriptor],
    ) -> Vec<ToolExecution> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call, servers).await);
        }
        results
    }
}
