//! # parley-agent
//!
//! Agent orchestration for Parley.
//!
//! This crate provides:
//! - The bounded tool-calling chat loop
//! - Context construction with memories and image attachments
//! - Tool execution against MCP servers with in-band error reporting
//! - Queuing and replay of turns that failed in transit

pub mod agent;
pub mod attachments;
pub mod context;
pub mod executor;

pub use agent::{
    Agent, AgentBuilder, AgentConfig, AgentError, AgentResponse, AgentResult, ChatTurnRequest,
    TurnOutcome,
};
pub use attachments::{AttachmentError, AttachmentResolver, InlineAttachmentResolver};
pub use context::build_messages;
pub use executor::{ToolBackend, ToolExecution, ToolExecutor};
