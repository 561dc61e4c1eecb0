//! MCP-specific error types.

use parley_core::transport::TransportError;
use thiserror::Error;

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport-level error (connection refused, timeout, dropped body).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Protocol-level error (malformed envelope, missing response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server returned a JSON-RPC error object.
    #[error("{message}")]
    Rpc { code: i64, message: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server not found by id.
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// Tool not found on server.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an error from a JSON-RPC error object.
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Whether the failure happened below the protocol level.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => {
                matches!(*status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}

impl From<McpError> for parley_core::Error {
    fn from(e: McpError) -> Self {
        parley_core::Error::Mcp(e.to_string())
    }
}

/// Result type alias for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;
