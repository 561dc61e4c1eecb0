//! Streaming completion driver.
//!
//! Issues one OpenAI-compatible `POST {base}/chat/completions` call and
//! returns the fully accumulated assistant text plus tool calls, whether or
//! not the transport streamed. Text is pushed to a [`TextSink`] as it grows.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use parley_core::sse::{self, SseLineBuffer};
use parley_core::transport::{HttpRequest, HttpTransport, ResponseBody};
use parley_core::{
    ChatMessage, EndpointConfig, FunctionDeclaration, FunctionTool, ProviderError, TextSink,
    ToolCall,
};

use crate::decision::ToolChoice;
use crate::providers;

/// Token usage reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// Add another usage record to this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Declared tools; omitted from the body when empty
    pub tools: Vec<FunctionDeclaration>,
    pub tool_choice: ToolChoice,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::None,
        }
    }

    /// Declare tools with the given policy.
    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>, tool_choice: ToolChoice) -> Self {
        self.tools = tools;
        self.tool_choice = tool_choice;
        self
    }
}

/// Result of one chat-completion call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// Anything that can run a chat completion.
#[async_trait]
pub trait CompletionDriver: Send + Sync {
    /// Run one completion, emitting the cumulative text to `sink`.
    async fn stream_chat(
        &self,
        endpoint: &EndpointConfig,
        request: ChatRequest,
        sink: &dyn TextSink,
    ) -> Result<ChatOutcome, ProviderError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<serde_json::Value>,
    tool_calls: Option<Vec<ToolCall>>,
}

// ============================================================================
// Accumulation
// ============================================================================

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds SSE deltas into text, tool calls and usage.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_calls: BTreeMap<usize, PendingToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `data:` payload. Returns an error if the payload carries an
    /// error object.
    pub fn apply(&mut self, payload: &str, sink: &dyn TextSink) -> Result<(), String> {
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse SSE payload: {}", e);
                return Ok(());
            }
        };

        if let Some(err) = value.get("error") {
            return Err(error_object_message(err).unwrap_or_else(|| err.to_string()));
        }

        let chunk: StreamChunk = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Unexpected SSE payload shape: {}", e);
                return Ok(());
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
            let Some(delta) = choice.delta else { continue };

            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                self.text.push_str(&content);
                sink.emit(&self.text);
            }

            for call in delta.tool_calls.unwrap_or_default() {
                self.apply_tool_delta(call);
            }
        }

        Ok(())
    }

    fn apply_tool_delta(&mut self, delta: ToolCallDelta) {
        let index = delta.index.unwrap_or_else(|| self.index_without_position(&delta));
        let pending = self.tool_calls.entry(index).or_default();

        if pending.id.is_none() {
            pending.id = delta.id.filter(|id| !id.is_empty());
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                pending.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                pending.arguments.push_str(&arguments);
            }
        }
    }

    /// Some servers omit `index`; a new id then starts a new call and
    /// anything else continues the latest one.
    fn index_without_position(&self, delta: &ToolCallDelta) -> usize {
        let last = self.tool_calls.keys().next_back().copied();
        match (&delta.id, last) {
            (_, None) => 0,
            (Some(id), Some(last)) => self
                .tool_calls
                .iter()
                .find(|(_, p)| p.id.as_deref() == Some(id.as_str()))
                .map(|(i, _)| *i)
                .unwrap_or(last + 1),
            (None, Some(last)) => last,
        }
    }

    /// Current accumulated text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Finish accumulation, assigning fallback ids where the server sent none.
    pub fn finish(self) -> ChatOutcome {
        let tool_calls = self
            .tool_calls
            .into_values()
            .filter(|p| !p.name.is_empty())
            .map(|p| {
                let id = p
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                ToolCall::new(id, p.name, p.arguments)
            })
            .collect();

        ChatOutcome {
            text: self.text,
            tool_calls,
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}

fn error_object_message(err: &serde_json::Value) -> Option<String> {
    match err {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}

/// Most specific error message extractable from an error body.
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let structured = value
            .get("error")
            .and_then(error_object_message)
            .or_else(|| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .or_else(|| value.get("detail").and_then(|m| m.as_str()).map(str::to_string));
        if let Some(message) = structured {
            return message;
        }
    }
    let raw = body.trim();
    if raw.is_empty() {
        format!("HTTP {}", status)
    } else {
        raw.to_string()
    }
}

/// Parse a non-streaming completion object.
fn parse_completion(body: &str, sink: &dyn TextSink) -> Result<ChatOutcome, String> {
    let completion: Completion = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let choice = completion.choices.into_iter().next();

    let (content, tool_calls, finish_reason) = match choice {
        Some(c) => (c.message.content, c.message.tool_calls, c.finish_reason),
        None => (None, None, None),
    };

    let text = match content {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };
    if !text.is_empty() {
        sink.emit(&text);
    }

    Ok(ChatOutcome {
        text,
        tool_calls: tool_calls.unwrap_or_default(),
        usage: completion.usage,
        finish_reason,
    })
}

// ============================================================================
// Driver
// ============================================================================

/// Driver for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiCompatibleDriver {
    transport: Arc<dyn HttpTransport>,
}

impl OpenAiCompatibleDriver {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn build_request(
        &self,
        endpoint: &EndpointConfig,
        request: &ChatRequest,
    ) -> Result<HttpRequest, ProviderError> {
        let spec = providers::lookup_or_custom(&endpoint.provider);
        let base_url = spec.resolve_base_url(endpoint);
        if base_url.is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: endpoint.provider.clone(),
                env_var: None,
            });
        }

        let tools: Vec<FunctionTool> = request.tools.iter().cloned().map(FunctionTool::from).collect();
        let tool_choice = if tools.is_empty() {
            None
        } else {
            Some(request.tool_choice)
        };
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            tools,
            tool_choice,
        };
        let body = serde_json::to_string(&body).map_err(|e| ProviderError::InvalidResponse {
            provider: endpoint.provider.clone(),
            message: e.to_string(),
        })?;

        let mut http = HttpRequest::json(format!("{}/chat/completions", base_url), body)
            .with_header("Accept", "text/event-stream, application/json");
        for (name, value) in spec.request_headers(endpoint) {
            http = http.with_header(name, value);
        }
        Ok(http)
    }
}

#[async_trait]
impl CompletionDriver for OpenAiCompatibleDriver {
    #[instrument(skip(self, endpoint, request, sink), fields(provider = %endpoint.provider, model = %request.model))]
    async fn stream_chat(
        &self,
        endpoint: &EndpointConfig,
        request: ChatRequest,
        sink: &dyn TextSink,
    ) -> Result<ChatOutcome, ProviderError> {
        let provider = endpoint.provider.clone();
        if request.model.trim().is_empty() {
            return Err(ProviderError::NotConfigured {
                provider,
                env_var: None,
            });
        }

        let http = self.build_request(endpoint, &request)?;
        debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .transport
            .post(http)
            .await
            .map_err(|e| ProviderError::NetworkError {
                provider: provider.clone(),
                message: e.to_string(),
            })?;

        if !response.is_success() {
            let status = response.status;
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(status, &body);
            error!(status, "Chat completion failed: {}", message);
            return Err(ProviderError::api_error(provider, status, message));
        }

        let stream_error = |message: String| ProviderError::StreamError {
            provider: provider.clone(),
            message,
        };
        let server_error = |message: String| {
            error!("Endpoint reported an error mid-response: {}", message);
            ProviderError::ServerError {
                provider: provider.clone(),
                message,
            }
        };

        let mut accumulator = StreamAccumulator::new();
        match response.body {
            ResponseBody::Stream(mut stream) => {
                let mut lines = SseLineBuffer::new();
                let mut raw = Vec::new();
                let mut saw_payload = false;

                while let Some(chunk) = stream.next().await {
                    let bytes = chunk.map_err(|e| stream_error(e.to_string()))?;
                    if !saw_payload {
                        raw.extend_from_slice(&bytes);
                    }
                    for payload in lines.push(&bytes) {
                        saw_payload = true;
                        accumulator.apply(&payload, sink).map_err(&server_error)?;
                    }
                }
                if let Some(payload) = lines.finish() {
                    saw_payload = true;
                    accumulator.apply(&payload, sink).map_err(&server_error)?;
                }

                // Servers that ignore `stream: true` reply with a plain object
                if !saw_payload {
                    let body = String::from_utf8_lossy(&raw);
                    if !body.trim().is_empty() && !sse::is_sse_body(&body) {
                        return parse_completion(&body, sink).map_err(|message| {
                            ProviderError::InvalidResponse {
                                provider: provider.clone(),
                                message,
                            }
                        });
                    }
                }
            }
            ResponseBody::Full(body) => {
                if !sse::is_sse_body(&body) {
                    return parse_completion(&body, sink).map_err(|message| {
                        ProviderError::InvalidResponse {
                            provider: provider.clone(),
                            message,
                        }
                    });
                }
                for payload in sse::data_payloads(&body) {
                    accumulator.apply(payload, sink).map_err(&server_error)?;
                }
            }
        }

        let outcome = accumulator.finish();
        debug!(
            chars = outcome.text.len(),
            tool_calls = outcome.tool_calls.len(),
            "Chat completion finished"
        );
        Ok(outcome)
    }
}
