//! # parley-mcp
//!
//! MCP (Model Context Protocol) client for Parley.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for the MCP methods Parley uses
//! - A per-server client over HTTP with session handling and SSE decoding
//! - A client cache keyed by server identity with concurrent tool discovery
//! - Formatting of tool results for the model

pub mod client;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod tools;

#[cfg(test)]
mod testing;

pub use client::{decode_body, McpClient, SESSION_HEADER};
pub use discovery::{DiscoveryReport, McpClientRegistry};
pub use error::{McpError, Result};
pub use protocol::{
    CallToolResult, McpToolDefinition, PromptDescriptor, RequestId, ResourceContents,
    ResourceDescriptor, ToolContent,
};
pub use tools::{describe_tool, format_tool_result};
