//! Core agent implementation.
//!
//! The [`Agent`] drives one chat turn: it builds the context, asks the
//! decision engine for a model, streams a completion and executes any tool
//! calls the model makes, looping until the model answers without tools.
//!
//! ## Architecture
//!
//! ```text
//! Agent
//! ├── DecisionEngine (model + tool policy per call)
//! ├── CompletionDriver (streaming chat completions)
//! ├── ToolExecutor (MCP tool discovery + invocation)
//! ├── AttachmentResolver (image attachments -> URLs)
//! ├── MemoryStore (optional context memories)
//! └── OfflineQueue (optional retry of failed turns)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use parley_core::config::AgentSettings;
use parley_core::{
    ChatMessage, ConversationMessage, EndpointConfig, McpServerDescriptor, ProviderError,
    TextSink, ToolDescriptor,
};
use parley_providers::{
    AgentDecision, ChatRequest, CompletionDriver, DecisionEngine, DecisionRequest, ToolChoice,
    Usage,
};
use parley_store::{format_context, FlushReport, MemoryQuery, MemoryStore, OfflineQueue, StoreError};

use crate::attachments::{AttachmentResolver, InlineAttachmentResolver};
use crate::context::build_messages;
use crate::executor::{ToolBackend, ToolExecution, ToolExecutor};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort a chat turn.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Error from the model endpoint.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The model kept calling tools past the configured depth.
    #[error("Maximum tool call depth exceeded ({0})")]
    MaxDepthExceeded(usize),

    /// Error from the memory store or offline queue.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Agent not properly configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl AgentError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Provider(e) if e.is_transient())
    }
}

impl From<AgentError> for parley_core::Error {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Provider(e) => parley_core::Error::Provider(e),
            AgentError::Storage(e) => parley_core::Error::Storage(e.to_string()),
            other => parley_core::Error::Validation(other.to_string()),
        }
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum tool-executing iterations per turn.
    pub max_depth: usize,
    /// Offer MCP tools to the model at all.
    pub use_tools: bool,
    /// Memories injected into the context.
    pub memory: MemoryQuery,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for AgentConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_depth: settings.max_depth,
            use_tools: settings.use_tools,
            memory: MemoryQuery::new(settings.memory_limit, settings.memory_min_importance as f32),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// Everything needed to run (or later replay) one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    pub endpoint: EndpointConfig,
    pub conversation: Vec<ConversationMessage>,
    #[serde(default)]
    pub servers: Vec<McpServerDescriptor>,
    #[serde(default = "default_true")]
    pub use_tools: bool,
    /// Queue the request if it fails at the transport level
    #[serde(default)]
    pub queue_on_failure: bool,
}

fn default_true() -> bool {
    true
}

impl ChatTurnRequest {
    pub fn new(endpoint: EndpointConfig, conversation: Vec<ConversationMessage>) -> Self {
        Self {
            endpoint,
            conversation,
            servers: Vec::new(),
            use_tools: true,
            queue_on_failure: false,
        }
    }

    pub fn with_servers(mut self, servers: Vec<McpServerDescriptor>) -> Self {
        self.servers = servers;
        self
    }

    pub fn without_tools(mut self) -> Self {
        self.use_tools = false;
        self
    }

    pub fn queue_on_failure(mut self, queue: bool) -> Self {
        self.queue_on_failure = queue;
        self
    }

    fn enabled_server_count(&self) -> usize {
        self.servers.iter().filter(|s| s.enabled).count()
    }
}

/// Final response from a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    /// Final assistant text.
    pub text: String,
    /// Decision behind the last model call.
    pub decision: AgentDecision,
    /// Tool-executing iterations taken.
    pub depth: usize,
    /// Usage summed across all model calls.
    pub usage: Usage,
    /// Every tool call executed, in order.
    pub tools: Vec<ToolExecution>,
}

/// What happened to a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed(AgentResponse),
    /// The request failed in transit and was stored for replay.
    Queued { request_id: String },
}

impl TurnOutcome {
    pub fn response(&self) -> Option<&AgentResponse> {
        match self {
            TurnOutcome::Completed(response) => Some(response),
            TurnOutcome::Queued { .. } => None,
        }
    }
}

// ============================================================================
// Agent
// ============================================================================

/// The orchestrator for chat turns.
pub struct Agent {
    driver: Arc<dyn CompletionDriver>,
    decisions: DecisionEngine,
    executor: ToolExecutor,
    resolver: Arc<dyn AttachmentResolver>,
    memory: Option<Arc<MemoryStore>>,
    queue: Option<Arc<OfflineQueue<ChatTurnRequest>>>,
    config: AgentConfig,
}

impl Agent {
    /// Get the agent configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    /// The attached offline queue, if any.
    pub fn queue(&self) -> Option<&Arc<OfflineQueue<ChatTurnRequest>>> {
        self.queue.as_ref()
    }

    /// Run one chat turn.
    ///
    /// A transport-level failure is queued instead of returned when the
    /// request asks for it and a queue is attached.
    #[instrument(skip_all, fields(provider = %request.endpoint.provider))]
    pub async fn run(&self, request: ChatTurnRequest, sink: &dyn TextSink) -> AgentResult<TurnOutcome> {
        match self.run_turn(&request, sink).await {
            Ok(response) => Ok(TurnOutcome::Completed(response)),
            Err(e) if e.is_transient() && request.queue_on_failure => {
                let Some(queue) = &self.queue else {
                    return Err(e);
                };
                let request_id = queue.enqueue(request).await?;
                info!(request_id = %request_id, error = %e, "Chat request queued for retry");
                Ok(TurnOutcome::Queued { request_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Run one chat turn without queuing on failure.
    pub async fn run_turn(
        &self,
        request: &ChatTurnRequest,
        sink: &dyn TextSink,
    ) -> AgentResult<AgentResponse> {
        let memory_context = self.memory_context().await;
        let mut messages = build_messages(
            &request.endpoint,
            memory_context,
            &request.conversation,
            self.resolver.as_ref(),
        )
        .await;

        let tools_requested = self.config.use_tools && request.use_tools;
        let mut discovered: Option<Vec<ToolDescriptor>> = None;
        let mut depth = 0;
        let mut usage = Usage::default();
        let mut executed = Vec::new();

        loop {
            let decision = self.decide(request, tools_requested, discovered.as_deref());

            if decision.tools_enabled() && discovered.is_none() {
                discovered = Some(self.discover(&request.servers).await);
            }

            let declarations = match &discovered {
                Some(tools) if decision.tools_enabled() => {
                    tools.iter().map(ToolDescriptor::to_declaration).collect()
                }
                _ => Vec::new(),
            };
            let tool_choice = if declarations.is_empty() {
                ToolChoice::None
            } else {
                decision.tool_choice
            };

            debug!(
                model = %decision.model,
                reason = %decision.reason,
                tools = declarations.len(),
                depth,
                "Calling model"
            );

            let endpoint = request.endpoint.clone().with_model(decision.model.clone());
            let chat = ChatRequest::new(decision.model.clone(), messages.clone())
                .with_tools(declarations, tool_choice);
            let outcome = self.driver.stream_chat(&endpoint, chat, sink).await?;

            if let Some(call_usage) = &outcome.usage {
                usage.add(call_usage);
            }

            if outcome.tool_calls.is_empty() {
                return Ok(AgentResponse {
                    text: outcome.text,
                    decision,
                    depth,
                    usage,
                    tools: executed,
                });
            }

            if depth >= self.config.max_depth {
                error!(max_depth = self.config.max_depth, "Maximum tool call depth exceeded");
                return Err(AgentError::MaxDepthExceeded(self.config.max_depth));
            }
            depth += 1;

            messages.push(ChatMessage::assistant_with_tool_calls(
                outcome.text,
                outcome.tool_calls.clone(),
            ));
            for call in &outcome.tool_calls {
                let execution = self.executor.execute(call, &request.servers).await;
                messages.push(ChatMessage::tool_result(&execution.call_id, &execution.output));
                executed.push(execution);
            }
        }
    }

    fn decide(
        &self,
        request: &ChatTurnRequest,
        tools_requested: bool,
        discovered: Option<&[ToolDescriptor]>,
    ) -> AgentDecision {
        let mut decision_request = DecisionRequest::new(&request.endpoint, &request.conversation);
        if tools_requested {
            // Before discovery the enabled server count stands in for the tool count.
            let tool_count = discovered.map_or_else(|| request.enabled_server_count(), <[_]>::len);
            decision_request = decision_request.with_tools(tool_count);
        }
        self.decisions.decide(&decision_request)
    }

    async fn discover(&self, servers: &[McpServerDescriptor]) -> Vec<ToolDescriptor> {
        match self.executor.backend().discover(servers).await {
            Ok(report) => {
                for (server, message) in &report.errors {
                    warn!(server = %server, error = %message, "Server tools unavailable this turn");
                }
                debug!(tools = report.tools.len(), "Discovered tools");
                report.tools
            }
            Err(e) => {
                warn!(error = %e, "Tool discovery failed; continuing without tools");
                Vec::new()
            }
        }
    }

    async fn memory_context(&self) -> Option<String> {
        let memory = self.memory.as_ref()?;
        match memory.relevant(&self.config.memory).await {
            Ok(entries) => format_context(&entries),
            Err(e) => {
                warn!(error = %e, "Memory lookup failed");
                None
            }
        }
    }

    /// Retry every queued request through [`Agent::run_turn`].
    ///
    /// Replayed turns stream into `sink`. Requests that fail again stay
    /// queued.
    pub async fn replay_queued(&self, sink: &dyn TextSink) -> AgentResult<FlushReport> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| AgentError::NotConfigured("offline queue is not attached".into()))?;

        let report = queue
            .flush(|request: ChatTurnRequest| async move {
                self.run_turn(&request, sink).await.map(|_| ())
            })
            .await?;
        Ok(report)
    }
}

// ============================================================================
// Agent Builder
// ============================================================================

/// Builder for constructing an [`Agent`].
#[derive(Default)]
pub struct AgentBuilder {
    driver: Option<Arc<dyn CompletionDriver>>,
    decisions: Option<DecisionEngine>,
    tools: Option<Arc<dyn ToolBackend>>,
    resolver: Option<Arc<dyn AttachmentResolver>>,
    memory: Option<Arc<MemoryStore>>,
    queue: Option<Arc<OfflineQueue<ChatTurnRequest>>>,
    config: AgentConfig,
}

impl AgentBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the completion driver.
    pub fn driver(mut self, driver: Arc<dyn CompletionDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the decision engine.
    pub fn decisions(mut self, engine: DecisionEngine) -> Self {
        self.decisions = Some(engine);
        self
    }

    /// Set the tool backend.
    pub fn tools(mut self, backend: Arc<dyn ToolBackend>) -> Self {
        self.tools = Some(backend);
        self
    }

    /// Set the attachment resolver. Defaults to [`InlineAttachmentResolver`].
    pub fn resolver(mut self, resolver: Arc<dyn AttachmentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn queue(mut self, queue: Arc<OfflineQueue<ChatTurnRequest>>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Set the maximum tool call depth.
    pub fn max_depth(mut self, max: usize) -> Self {
        self.config.max_depth = max;
        self
    }

    /// Set the full configuration.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the agent.
    ///
    /// Returns an error if required components are missing.
    pub fn build(self) -> AgentResult<Agent> {
        let driver = self
            .driver
            .ok_or_else(|| AgentError::NotConfigured("driver is required".into()))?;
        let decisions = self
            .decisions
            .ok_or_else(|| AgentError::NotConfigured("decision engine is required".into()))?;
        let tools = self
            .tools
            .ok_or_else(|| AgentError::NotConfigured("tool backend is required".into()))?;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(InlineAttachmentResolver::new()));

        Ok(Agent {
            driver,
            decisions,
            executor: ToolExecutor::new(tools),
            resolver,
            memory: self.memory,
            queue: self.queue,
            config: self.config,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
