//! Endpoint and MCP server descriptors.
//!
//! Both are owned by the settings collaborator and read-only to the agent.

use serde::{Deserialize, Serialize};

/// Model endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Provider id (e.g. "openai", "yandex", "custom")
    pub provider: String,
    /// Base URL; empty means the provider's default
    pub base_url: String,
    /// API key; empty means look up the provider's environment variable
    pub api_key: String,
    /// Selected model; empty means "auto" mode
    pub model: String,
    pub system_prompt: Option<String>,
    /// Auxiliary folder/account id for providers that need one
    pub folder_id: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            system_prompt: None,
            folder_id: None,
        }
    }
}

impl EndpointConfig {
    /// Create an endpoint for `provider` in auto mode.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the folder/account id.
    pub fn with_folder_id(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Whether the model is picked by the decision engine.
    pub fn is_auto(&self) -> bool {
        self.model.trim().is_empty()
    }

    /// Conventional environment variable holding this provider's key,
    /// e.g. `OPENAI_API_KEY`.
    pub fn api_key_env(&self) -> String {
        format!(
            "{}_API_KEY",
            self.provider.to_uppercase().replace(['-', '.'], "_")
        )
    }

    /// Resolve the API key from either the direct value or the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(self.api_key_env())
            .ok()
            .filter(|key| !key.is_empty())
    }
}

/// An external MCP tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerDescriptor {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Bearer token sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Client-cache identity of a server: its URL and token.
pub type ServerIdentity = (String, Option<String>);

impl McpServerDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            enabled: true,
            token: None,
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Mark the server as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn identity(&self) -> ServerIdentity {
        (self.url.clone(), self.token.clone())
    }
}
