//! MCP client for one server.
//!
//! JSON-RPC 2.0 over HTTP POST. Responses are either a plain JSON envelope
//! or an SSE-framed body carrying one or more envelopes. The server may
//! assign a session id in a response header; once assigned it is sent as
//! `Mcp-Session-Id` on every later request until the session is cleared.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parley_core::sse;
use parley_core::transport::{HttpRequest, HttpTransport};
use parley_core::McpServerDescriptor;

use crate::error::{McpError, Result};
use crate::protocol::{
    methods, CallToolParams, CallToolResult, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListPromptsResult, ListResourcesResult,
    ListToolsResult, McpToolDefinition, PromptDescriptor, ReadResourceParams, ReadResourceResult,
    RequestId, ResourceContents, ResourceDescriptor,
};

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Decode a response body into the result of request `id`.
///
/// An empty body yields `None`. SSE bodies are scanned line by line; the
/// last envelope answering `id` wins and unrelated ids are skipped. An
/// envelope carrying an `error` object raises with the server's message.
pub fn decode_body(body: &str, id: &RequestId) -> Result<Option<Value>> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let envelope = if sse::is_sse_body(body) {
        let payloads = sse::data_payloads(body);
        if payloads.is_empty() {
            return Ok(None);
        }

        let mut matched: Option<JsonRpcResponse<Value>> = None;
        let mut orphan_error = None;
        for payload in payloads {
            let envelope: JsonRpcResponse<Value> = match serde_json::from_str(payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!("Skipping non-envelope SSE payload: {}", e);
                    continue;
                }
            };
            if envelope.answers(id) {
                matched = Some(envelope);
            } else if envelope.id.is_none() && envelope.error.is_some() {
                orphan_error = envelope.error;
            }
        }

        match (matched, orphan_error) {
            (Some(envelope), _) => envelope,
            (None, Some(error)) => return Err(McpError::rpc(error.code, error.message)),
            (None, None) => {
                return Err(McpError::protocol(format!("no response for request {}", id)))
            }
        }
    } else {
        serde_json::from_str::<JsonRpcResponse<Value>>(body)
            .map_err(|e| McpError::protocol(format!("Failed to parse response: {}", e)))?
    };

    if let Some(error) = envelope.error {
        return Err(McpError::rpc(error.code, error.message));
    }
    Ok(Some(envelope.result.unwrap_or(Value::Null)))
}

/// Most specific message in an HTTP error body.
fn http_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(Value::as_str)
            .or_else(|| value.get("message").and_then(Value::as_str));
        if let Some(message) = message {
            return message.to_string();
        }
    }
    body.trim().to_string()
}

/// JSON-RPC client bound to one MCP server.
pub struct McpClient {
    server: McpServerDescriptor,
    transport: Arc<dyn HttpTransport>,
    /// Server-assigned session id
    session_id: RwLock<Option<String>>,
    /// Cached initialize result
    initialized: RwLock<Option<InitializeResult>>,
    /// Serializes the initialize handshake
    init_lock: Mutex<()>,
    cached_tools: RwLock<Vec<McpToolDefinition>>,
    last_request_id: AtomicI64,
}

impl McpClient {
    /// Create a client; nothing is sent until first use.
    pub fn new(server: McpServerDescriptor, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            server,
            transport,
            session_id: RwLock::new(None),
            initialized: RwLock::new(None),
            init_lock: Mutex::new(()),
            cached_tools: RwLock::new(Vec::new()),
            last_request_id: AtomicI64::new(0),
        }
    }

    /// The server this client talks to.
    pub fn server(&self) -> &McpServerDescriptor {
        &self.server
    }

    /// Current session id, if the server assigned one.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.read().is_some()
    }

    /// Tools from the last successful `tools/list`.
    pub fn cached_tools(&self) -> Vec<McpToolDefinition> {
        self.cached_tools.read().clone()
    }

    /// Time-derived request id, strictly increasing per client.
    fn next_request_id(&self) -> RequestId {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_request_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        RequestId::Number(now.max(previous + 1))
    }

    fn http_request(&self, body: String) -> HttpRequest {
        let mut request = HttpRequest::json(&self.server.url, body)
            .with_header("Accept", "application/json, text/event-stream");
        if let Some(token) = self.server.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.with_header("Authorization", format!("Bearer {}", token));
        }
        if let Some(session) = self.session_id() {
            request = request.with_header(SESSION_HEADER, session);
        }
        request
    }

    /// POST one message and return the response body.
    async fn exchange(&self, body: String) -> Result<String> {
        let response = self.transport.post(self.http_request(body)).await?;

        if let Some(session) = response.header(SESSION_HEADER).filter(|s| !s.is_empty()) {
            let mut current = self.session_id.write();
            if current.as_deref() != Some(session) {
                debug!(server = %self.server.id, session = %session, "Session id assigned");
                *current = Some(session.to_string());
            }
        }

        let status = response.status;
        let success = response.is_success();
        let text = response.text().await?;

        if !success {
            let message = http_error_message(&text);
            return Err(McpError::Http {
                status,
                message: if message.is_empty() {
                    format!("request failed with status {}", status)
                } else {
                    message
                },
            });
        }
        Ok(text)
    }

    /// Send a request and decode its result.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let body = serde_json::to_string(&JsonRpcRequest::new(id.clone(), method, params))?;

        debug!(server = %self.server.id, method, id = %id, "MCP request");
        let text = self.exchange(body).await?;

        let result = decode_body(&text, &id)?
            .ok_or_else(|| McpError::protocol(format!("empty response to {}", method)))?;
        serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("Invalid {} result: {}", method, e)))
    }

    /// Send a notification; any response body is ignored.
    async fn notify(&self, method: &str) -> Result<()> {
        let body = serde_json::to_string(&JsonRpcNotification::<()>::new(method, None))?;
        self.exchange(body).await.map(|_| ())
    }

    /// Perform the initialize handshake once.
    ///
    /// Later calls return the cached result without touching the network.
    /// A failed `notifications/initialized` is logged, not raised.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        if let Some(result) = self.initialized.read().clone() {
            return Ok(result);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(result) = self.initialized.read().clone() {
            return Ok(result);
        }

        debug!(server = %self.server.id, "Initializing MCP session");
        let result: InitializeResult = self
            .request(methods::INITIALIZE, Some(InitializeParams::default()))
            .await?;

        if let Err(e) = self.notify(methods::INITIALIZED).await {
            warn!(server = %self.server.id, error = %e, "Initialized notification failed");
        }

        info!(
            server = %self.server.id,
            server_name = %result.server_info.name,
            protocol_version = %result.protocol_version,
            session = self.session_id().is_some(),
            "MCP session initialized"
        );

        *self.initialized.write() = Some(result.clone());
        Ok(result)
    }

    /// List the server's tools, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>> {
        self.initialize().await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = self.request(methods::TOOLS_LIST, params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(server = %self.server.id, tool_count = tools.len(), "Listed tools");
        *self.cached_tools.write() = tools.clone();
        Ok(tools)
    }

    /// List resources. Optional capability: any failure yields an empty list.
    pub async fn list_resources(&self) -> Vec<ResourceDescriptor> {
        let result: Result<ListResourcesResult> = async {
            self.initialize().await?;
            self.request::<(), _>(methods::RESOURCES_LIST, None).await
        }
        .await;

        match result {
            Ok(result) => result.resources,
            Err(e) => {
                debug!(server = %self.server.id, error = %e, "resources/list unavailable");
                Vec::new()
            }
        }
    }

    /// List prompts. Optional capability: any failure yields an empty list.
    pub async fn list_prompts(&self) -> Vec<PromptDescriptor> {
        let result: Result<ListPromptsResult> = async {
            self.initialize().await?;
            self.request::<(), _>(methods::PROMPTS_LIST, None).await
        }
        .await;

        match result {
            Ok(result) => result.prompts,
            Err(e) => {
                debug!(server = %self.server.id, error = %e, "prompts/list unavailable");
                Vec::new()
            }
        }
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        self.initialize().await?;
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        let result: ReadResourceResult = self.request(methods::RESOURCES_READ, Some(params)).await?;
        Ok(result.contents)
    }

    /// Call a tool on the server.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.initialize().await?;

        debug!(server = %self.server.id, tool = name, "Calling tool");
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request(methods::TOOLS_CALL, Some(params)).await?;

        if result.is_error() {
            warn!(server = %self.server.id, tool = name, "Tool returned error");
        }
        Ok(result)
    }

    /// Forget the session id, the handshake and the tool cache.
    pub fn clear_session(&self) {
        *self.session_id.write() = None;
        *self.initialized.write() = None;
        self.cached_tools.write().clear();
        debug!(server = %self.server.id, "MCP session cleared");
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.server.id)
            .field("url", &self.server.url)
            .field("session_id", &self.session_id())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use parley_core::transport::HttpResponse;
    use serde_json::json;

    fn server() -> McpServerDescriptor {
        McpServerDescriptor::new("fs", "Files", "http://mcp.local/mcp").with_token("t0k")
    }

    fn init_response() -> HttpResponse {
        HttpResponse::full(
            200,
            r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"files"}}}"#,
        )
        .with_header("Mcp-Session-Id", "sess-1")
    }

    #[test]
    fn test_decode_plain_json() {
        let id = RequestId::Number(7);
        let body = r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#;
        assert_eq!(decode_body(body, &id).unwrap(), Some(json!({"ok": true})));
    }

    #[test]
    fn test_decode_empty_body() {
        assert_eq!(decode_body("", &RequestId::Number(1)).unwrap(), None);
        assert_eq!(decode_body("  \n", &RequestId::Number(1)).unwrap(), None);
    }

    #[test]
    fn test_decode_sse_skips_unrelated_ids() {
        let id = RequestId::Number(42);
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":41,\"result\":{\"wrong\":true}}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
            "data: [DONE]\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":42,\"result\":{\"right\":true}}\n\n",
        );
        assert_eq!(decode_body(body, &id).unwrap(), Some(json!({"right": true})));
    }

    #[test]
    fn test_decode_sse_last_match_wins() {
        let id = RequestId::Number(1);
        let body = concat!(
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"n\":1}}\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"n\":2}}\n",
        );
        assert_eq!(decode_body(body, &id).unwrap(), Some(json!({"n": 2})));
    }

    #[test]
    fn test_decode_sse_without_match() {
        let id = RequestId::Number(9);
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":8,\"result\":{}}\n\n";
        let err = decode_body(body, &id).unwrap_err();
        assert!(err.to_string().contains("no response for request 9"));
    }

    #[test]
    fn test_decode_error_envelope() {
        let id = RequestId::Number(3);
        let body = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#;
        let err = decode_body(body, &id).unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32601, .. }));
        assert_eq!(err.to_string(), "Method not found");
    }

    #[test]
    fn test_request_ids_increase() {
        let client = McpClient::new(server(), ScriptedTransport::new(vec![]));
        let a = client.next_request_id();
        let b = client.next_request_id();
        match (a, b) {
            (RequestId::Number(a), RequestId::Number(b)) => assert!(b > a),
            other => panic!("unexpected ids {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let transport = ScriptedTransport::new(vec![init_response(), HttpResponse::full(202, "")]);
        let client = McpClient::new(server(), transport.clone());

        let first = client.initialize().await.unwrap();
        assert_eq!(first.server_info.name, "files");
        assert_eq!(transport.request_count(), 2);

        let second = client.initialize().await.unwrap();
        assert_eq!(second.server_info.name, "files");
        assert_eq!(transport.request_count(), 2);
        assert!(client.is_initialized());
    }

    #[tokio::test]
    async fn test_session_id_sent_on_later_requests() {
        let transport = ScriptedTransport::new(vec![
            init_response(),
            HttpResponse::full(202, ""),
            HttpResponse::full(
                200,
                "data: {\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{\"tools\":[{\"name\":\"read_file\",\"inputSchema\":{\"type\":\"object\"}}]}}\n\n",
            ),
        ]);
        transport.echo_request_ids();
        let client = McpClient::new(server(), transport.clone());

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(client.cached_tools()[0].name, "read_file");

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].header("mcp-session-id"), None);
        assert_eq!(requests[1].header("mcp-session-id"), Some("sess-1"));
        assert_eq!(requests[2].header("mcp-session-id"), Some("sess-1"));
        for request in &requests {
            assert_eq!(request.header("authorization"), Some("Bearer t0k"));
            assert_eq!(
                request.header("accept"),
                Some("application/json, text/event-stream")
            );
        }

        let notification: Value = serde_json::from_str(&requests[1].body).unwrap();
        assert_eq!(notification["method"], "notifications/initialized");
        assert!(notification.get("id").is_none());
    }

    #[tokio::test]
    async fn test_initialized_notification_failure_is_tolerated() {
        let transport = ScriptedTransport::new(vec![
            init_response(),
            HttpResponse::full(500, "boom"),
        ]);
        let client = McpClient::new(server(), transport);
        assert!(client.initialize().await.is_ok());
        assert_eq!(client.session_id().as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_message() {
        let transport = ScriptedTransport::new(vec![HttpResponse::full(
            401,
            r#"{"error":{"message":"invalid token"}}"#,
        )]);
        let client = McpClient::new(server(), transport);
        let err = client.initialize().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("401"));
        assert!(message.contains("invalid token"));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_optional_listings_swallow_errors() {
        let transport = ScriptedTransport::new(vec![
            init_response(),
            HttpResponse::full(202, ""),
            HttpResponse::full(
                200,
                r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32601,"message":"Method not found"}}"#,
            ),
            HttpResponse::full(404, "not here"),
        ]);
        transport.echo_request_ids();
        let client = McpClient::new(server(), transport);
        assert!(client.list_resources().await.is_empty());
        assert!(client.list_prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_call_tool_and_read_resource_propagate_errors() {
        let transport = ScriptedTransport::new(vec![
            init_response(),
            HttpResponse::full(202, ""),
            HttpResponse::full(
                200,
                r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32602,"message":"bad arguments"}}"#,
            ),
            HttpResponse::full(
                200,
                r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32002,"message":"resource not found"}}"#,
            ),
        ]);
        transport.echo_request_ids();
        let client = McpClient::new(server(), transport.clone());

        let err = client.call_tool("read_file", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "bad arguments");

        let err = client.read_resource("file:///nope").await.unwrap_err();
        assert_eq!(err.to_string(), "resource not found");

        let call: Value = serde_json::from_str(&transport.requests()[2].body).unwrap();
        assert_eq!(call["method"], "tools/call");
        assert_eq!(call["params"]["name"], "read_file");
        assert_eq!(call["params"]["arguments"], json!({}));
    }

    #[tokio::test]
    async fn test_clear_session_forces_new_handshake() {
        let transport = ScriptedTransport::new(vec![
            init_response(),
            HttpResponse::full(202, ""),
            init_response().with_header("Mcp-Session-Id", "sess-2"),
            HttpResponse::full(202, ""),
        ]);
        let client = McpClient::new(server(), transport.clone());
        client.initialize().await.unwrap();
        client.clear_session();
        assert!(!client.is_initialized());
        assert_eq!(client.session_id(), None);

        client.initialize().await.unwrap();
        assert_eq!(transport.request_count(), 4);
        assert_eq!(transport.requests()[2].header("mcp-session-id"), None);
        assert_eq!(client.session_id().as_deref(), Some("sess-2"));
    }
}
