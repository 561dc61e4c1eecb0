//! # parley-core
//!
//! Core types and abstractions for Parley, the agent orchestration layer for
//! OpenAI-compatible chat endpoints extended with MCP tool servers.
//!
//! This crate provides:
//! - Chat message and conversation primitives
//! - Tool descriptors, tool calls and function-name encoding
//! - Endpoint and MCP server descriptors
//! - Model capability descriptors and tiers
//! - SSE line framing shared by the MCP client and the completion driver
//! - The HTTP transport seam and the cumulative text sink
//! - Configuration system
//! - Common error types

pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod model;
pub mod sink;
pub mod sse;
pub mod tool;
pub mod transport;

pub use config::Config;
pub use endpoint::{EndpointConfig, McpServerDescriptor};
pub use error::{Error, ProviderError, Result};
pub use message::{
    Attachment, AttachmentKind, ChatMessage, Content, ContentPart, ConversationMessage, Role,
};
pub use model::{Capabilities, Pricing, Tier};
pub use sink::{NoOpSink, TextSink};
pub use tool::{
    encode_function_name, parse_function_name, FunctionCall, FunctionDeclaration, FunctionTool,
    ToolCall, ToolDescriptor,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ResponseBody};
