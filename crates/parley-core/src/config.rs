//! Configuration system for Parley.

use std::collections::HashSet;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointConfig, McpServerDescriptor};
use crate::error::Error;
use crate::model::Capabilities;

/// Main configuration struct for Parley.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model endpoint
    pub endpoint: EndpointConfig,
    /// MCP tool servers
    pub servers: Vec<McpServerDescriptor>,
    /// Extra model catalog entries
    pub models: Vec<ModelConfig>,
    /// Agent loop settings
    pub agent: AgentSettings,
    /// Persistence settings
    pub storage: StorageConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// A model catalog entry declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum tool-calling round-trips per turn
    pub max_depth: usize,
    /// Offer MCP tools to the model
    pub use_tools: bool,
    /// Queue requests that fail at the transport level
    pub queue_on_failure: bool,
    /// Maximum memories injected into the context
    pub memory_limit: usize,
    /// Importance floor for injected memories
    pub memory_min_importance: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            use_tools: true,
            queue_on_failure: false,
            memory_limit: 5,
            memory_min_importance: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; defaults to `<data_dir>/parley.db`
    pub database: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database path.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("parley.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Turn error-level issues into a single config error, logging warnings.
    pub fn into_result(self) -> Result<(), Error> {
        for warning in self.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }
        if self.is_ok() {
            return Ok(());
        }
        let errors: Vec<String> = self
            .errors()
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        Err(Error::Config(format!(
            "Configuration validation failed:\n  {}",
            errors.join("\n  ")
        )))
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "agent.max_depth")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// The layered configuration sources, lowest precedence first.
    pub fn figment() -> Figment {
        let config_dir = Self::config_dir();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(config_dir.join("config.toml")))
            // Project config
            .merge(Toml::file(".parley/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".parley/config.local.toml"))
            // PARLEY_AGENT__MAX_DEPTH=3 -> agent.max_depth
            .merge(Env::prefixed("PARLEY_").split("__"))
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        config.validate().into_result()?;
        Ok(config)
    }

    /// Validate the provider-independent parts of the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.endpoint.provider.trim().is_empty() {
            result.add_error("endpoint.provider", "Provider cannot be empty");
        }

        if !self.endpoint.base_url.is_empty() && !is_http_url(&self.endpoint.base_url) {
            result.add_error(
                "endpoint.base_url",
                "base_url must start with http:// or https://",
            );
        }

        let mut seen = HashSet::new();
        for (i, server) in self.servers.iter().enumerate() {
            if server.id.is_empty() {
                result.add_error(format!("servers[{}].id", i), "Server id cannot be empty");
            } else if server.id.contains("__") {
                result.add_error(
                    format!("servers[{}].id", i),
                    "Server id cannot contain '__' (used as the tool name delimiter)",
                );
            }
            if !seen.insert(server.id.as_str()) {
                result.add_error(
                    format!("servers[{}].id", i),
                    format!("Duplicate server id '{}'", server.id),
                );
            }
            if !is_http_url(&server.url) {
                result.add_error(
                    format!("servers[{}].url", i),
                    "url must start with http:// or https://",
                );
            }
            if server.token.as_deref() == Some("") {
                result.add_warning(format!("servers[{}].token", i), "Token is empty string");
            }
        }

        for (i, model) in self.models.iter().enumerate() {
            if model.model.trim().is_empty() {
                result.add_error(format!("models[{}].model", i), "Model name cannot be empty");
            }
            if !model.capabilities.streaming {
                result.add_warning(
                    format!("models[{}].capabilities.streaming", i),
                    "Models without streaming are never selected",
                );
            }
        }

        if self.agent.max_depth == 0 {
            result.add_error("agent.max_depth", "max_depth must be greater than 0");
        }

        if self.agent.max_depth > 32 {
            result.add_warning(
                "agent.max_depth",
                "max_depth is very high (> 32), runaway tool loops will be expensive",
            );
        }

        if !(0.0..=1.0).contains(&self.agent.memory_min_importance) {
            result.add_error(
                "agent.memory_min_importance",
                "memory_min_importance must be within [0, 1]",
            );
        }

        result
    }

    /// Enabled MCP servers.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &McpServerDescriptor> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.config/parley"))
    }

    /// Get the data directory (database, queue).
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.local/share/parley"))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_ok(), "Default config should be valid: {:?}", result.issues);
        assert_eq!(config.agent.max_depth, 5);
    }

    #[test]
    fn test_zero_depth_is_error() {
        let mut config = Config::default();
        config.agent.max_depth = 0;
        let result = config.validate();
        assert!(!result.is_ok());
        assert!(result.errors().iter().any(|e| e.field == "agent.max_depth"));
    }

    #[test]
    fn test_importance_out_of_range() {
        let mut config = Config::default();
        config.agent.memory_min_importance = 1.5;
        let result = config.validate();
        assert!(result
            .errors()
            .iter()
            .any(|e| e.field == "agent.memory_min_importance"));
    }

    #[test]
    fn test_duplicate_server_ids() {
        let mut config = Config::default();
        config.servers = vec![
            McpServerDescriptor::new("fs", "Files", "http://localhost:3000/mcp"),
            McpServerDescriptor::new("fs", "Files 2", "http://localhost:3001/mcp"),
        ];
        let result = config.validate();
        assert!(result.errors().iter().any(|e| e.field == "servers[1].id"));
    }

    #[test]
    fn test_bad_url_scheme() {
        let mut config = Config::default();
        config.endpoint.base_url = "ftp://example.com".into();
        config.servers = vec![McpServerDescriptor::new("fs", "Files", "localhost:3000")];
        let result = config.validate();
        assert!(result.errors().iter().any(|e| e.field == "endpoint.base_url"));
        assert!(result.errors().iter().any(|e| e.field == "servers[0].url"));
    }

    #[test]
    fn test_high_depth_is_warning() {
        let mut config = Config::default();
        config.agent.max_depth = 100;
        let result = config.validate();
        assert!(result.is_ok());
        assert!(result.warnings().iter().any(|e| e.field == "agent.max_depth"));
    }

    #[test]
    fn test_toml_sections() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [endpoint]
                provider = "groq"
                model = "llama-3.1-8b-instant"

                [[servers]]
                id = "fs"
                name = "Files"
                url = "http://localhost:3000/mcp"

                [agent]
                max_depth = 3
                "#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.endpoint.provider, "groq");
        assert_eq!(config.servers.len(), 1);
        assert!(config.servers[0].enabled);
        assert_eq!(config.agent.max_depth, 3);
        assert!(config.agent.use_tools);
    }
}
