//! Client cache and concurrent tool discovery.
//!
//! [`McpClientRegistry`] hands out one [`McpClient`] per server identity
//! (url plus token). Server ids sharing an identity share its client. When
//! a server's descriptor changes identity the old client is dropped once no
//! other server id is still bound to it.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use parley_core::endpoint::ServerIdentity;
use parley_core::transport::HttpTransport;
use parley_core::{McpServerDescriptor, ToolDescriptor};

use crate::client::McpClient;
use crate::tools::describe_tool;

/// Tools gathered from a set of servers, plus the servers that failed.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub tools: Vec<ToolDescriptor>,
    /// `(server_id, message)` per failed server
    pub errors: Vec<(String, String)>,
}

impl DiscoveryReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
struct RegistryState {
    clients: HashMap<ServerIdentity, Arc<McpClient>>,
    /// server id -> identity it was last resolved with
    bindings: HashMap<String, ServerIdentity>,
}

impl RegistryState {
    /// Evict the client for `identity` unless a binding still uses it.
    fn release(&mut self, identity: &ServerIdentity) -> Option<Arc<McpClient>> {
        if self.bindings.values().any(|bound| bound == identity) {
            return None;
        }
        let client = self.clients.remove(identity)?;
        client.clear_session();
        Some(client)
    }
}

/// Per-identity MCP client cache.
pub struct McpClientRegistry {
    transport: Arc<dyn HttpTransport>,
    state: RwLock<RegistryState>,
}

impl McpClientRegistry {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Client for `server`, creating one if its identity has none yet.
    ///
    /// If the server id was previously bound to another identity that no
    /// other server id uses, that client is evicted and its session cleared.
    pub fn client_for(&self, server: &McpServerDescriptor) -> Arc<McpClient> {
        let identity = server.identity();
        let mut state = self.state.write();

        let previous = state.bindings.insert(server.id.clone(), identity.clone());
        if let Some(previous) = previous.filter(|p| *p != identity) {
            if state.release(&previous).is_some() {
                info!(server = %server.id, "Server identity changed; session replaced");
            }
        }

        if let Some(client) = state.clients.get(&identity) {
            return Arc::clone(client);
        }

        debug!(server = %server.id, url = %server.url, "Creating MCP client");
        let client = Arc::new(McpClient::new(server.clone(), Arc::clone(&self.transport)));
        state.clients.insert(identity, Arc::clone(&client));
        client
    }

    /// Unbind `server_id`, dropping its client unless another server id
    /// shares it. Returns whether the id was bound.
    pub fn invalidate(&self, server_id: &str) -> bool {
        let mut state = self.state.write();
        let Some(identity) = state.bindings.remove(server_id) else {
            return false;
        };
        if state.release(&identity).is_some() {
            debug!(server = %server_id, "MCP client invalidated");
        }
        true
    }

    /// Drop every cached client.
    pub fn clear(&self) {
        let mut state = self.state.write();
        for client in state.clients.values() {
            client.clear_session();
        }
        state.clients.clear();
        state.bindings.clear();
    }

    /// Number of live clients.
    pub fn len(&self) -> usize {
        self.state.read().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List tools from every enabled server concurrently.
    ///
    /// A failing server contributes an entry to `errors` and no tools; the
    /// others are unaffected.
    pub async fn discover_tools(&self, servers: &[McpServerDescriptor]) -> DiscoveryReport {
        let enabled: Vec<&McpServerDescriptor> = servers.iter().filter(|s| s.enabled).collect();

        let lookups = enabled.iter().map(|server| {
            let client = self.client_for(server);
            async move { (*server, client.list_tools().await) }
        });

        let mut report = DiscoveryReport::default();
        for (server, result) in join_all(lookups).await {
            match result {
                Ok(tools) => {
                    report
                        .tools
                        .extend(tools.into_iter().map(|tool| describe_tool(server, tool)));
                }
                Err(e) => {
                    warn!(server = %server.id, error = %e, "Tool discovery failed");
                    report.errors.push((server.id.clone(), e.to_string()));
                }
            }
        }

        debug!(
            servers = enabled.len(),
            tools = report.tools.len(),
            failed = report.errors.len(),
            "Tool discovery finished"
        );
        report
    }
}

impl std::fmt::Debug for McpClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientRegistry")
            .field("clients", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use parley_core::transport::{HttpResponse, TransportError};

    const INIT: &str = r#"{"jsonrpc":"2.0","id":0,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"srv"}}}"#;

    fn tools_body(names: &[&str]) -> String {
        let tools: Vec<_> = names
            .iter()
            .map(|n| serde_json::json!({"name": n, "inputSchema": {"type": "object"}}))
            .collect();
        serde_json::json!({"jsonrpc": "2.0", "id": 0, "result": {"tools": tools}}).to_string()
    }

    #[test]
    fn test_client_reused_for_same_identity() {
        let registry = McpClientRegistry::new(ScriptedTransport::new(vec![]));
        let server = McpServerDescriptor::new("a", "A", "http://a/mcp");
        let first = registry.client_for(&server);
        let second = registry.client_for(&server);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identity_change_replaces_client() {
        let registry = McpClientRegistry::new(ScriptedTransport::new(vec![]));
        let server = McpServerDescriptor::new("a", "A", "http://a/mcp");
        let first = registry.client_for(&server);

        let rotated = server.clone().with_token("new-token");
        let second = registry.client_for(&rotated);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(second.server().token.as_deref(), Some("new-token"));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let registry = McpClientRegistry::new(ScriptedTransport::new(vec![]));
        registry.client_for(&McpServerDescriptor::new("a", "A", "http://a/mcp"));
        registry.client_for(&McpServerDescriptor::new("b", "B", "http://b/mcp"));
        assert_eq!(registry.len(), 2);

        assert!(registry.invalidate("a"));
        assert!(!registry.invalidate("a"));
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shared_identity_survives_other_id_rotation() {
        let transport = ScriptedTransport::new(vec![]);
        transport.echo_request_ids();
        transport.route(
            "http://shared/mcp",
            vec![
                Ok(HttpResponse::full(200, INIT).with_header("Mcp-Session-Id", "s-1")),
                Ok(HttpResponse::full(202, "")),
            ],
        );
        let registry = McpClientRegistry::new(transport.clone());
        let a = McpServerDescriptor::new("a", "A", "http://shared/mcp");
        let b = McpServerDescriptor::new("b", "B", "http://shared/mcp");

        let shared = registry.client_for(&a);
        assert!(Arc::ptr_eq(&shared, &registry.client_for(&b)));
        shared.initialize().await.unwrap();
        assert_eq!(shared.session_id().as_deref(), Some("s-1"));

        let rotated = registry.client_for(&a.clone().with_token("new-token"));
        assert!(!Arc::ptr_eq(&shared, &rotated));
        assert_eq!(registry.len(), 2);

        let still_b = registry.client_for(&b);
        assert!(Arc::ptr_eq(&shared, &still_b));
        assert_eq!(still_b.session_id().as_deref(), Some("s-1"));
        assert!(still_b.is_initialized());

        // Last binding gone: the client is dropped.
        assert!(registry.invalidate("b"));
        assert_eq!(registry.len(), 1);
        assert!(shared.session_id().is_none());
    }

    #[tokio::test]
    async fn test_discovery_tolerates_failing_server() {
        let transport = ScriptedTransport::new(vec![]);
        transport.echo_request_ids();
        transport.route(
            "http://good/mcp",
            vec![
                Ok(HttpResponse::full(200, INIT)),
                Ok(HttpResponse::full(202, "")),
                Ok(HttpResponse::full(200, tools_body(&["read_file", "write_file"]))),
            ],
        );
        transport.route(
            "http://down/mcp",
            vec![Err(TransportError::Network("connection refused".into()))],
        );

        let servers = vec![
            McpServerDescriptor::new("good", "Good", "http://good/mcp"),
            McpServerDescriptor::new("down", "Down", "http://down/mcp"),
            McpServerDescriptor::new("off", "Off", "http://off/mcp").disabled(),
        ];

        let registry = McpClientRegistry::new(transport.clone());
        let report = registry.discover_tools(&servers).await;

        let names: Vec<String> = report.tools.iter().map(|t| t.function_name()).collect();
        assert_eq!(names, vec!["good__read_file", "good__write_file"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "down");
        assert!(report.errors[0].1.contains("connection refused"));
        assert!(!report.is_complete());
        assert_eq!(transport.requests_to("http://off/mcp"), 0);
    }
}
