//! Error types for Parley.
//!
//! This module provides the shared error hierarchy, with structured provider
//! errors that include context and recovery suggestions.

use thiserror::Error;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Parley.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider error with structured details
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// MCP error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check your config file at ~/.config/parley/config.toml"),
            Error::Provider(e) => e.recovery_suggestion(),
            Error::Mcp(_) => Some("Check that the MCP server URL and token are correct"),
            Error::Storage(_) => Some("Check that the data directory is writable"),
            _ => None,
        }
    }
}

/// Provider-specific errors with detailed context.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No API key could be resolved
    #[error("Provider '{provider}' is not configured")]
    NotConfigured {
        provider: String,
        env_var: Option<String>,
    },

    /// API request failed
    #[error("API request to {provider} failed: {status} - {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    /// Streaming error
    #[error("Streaming error from {provider}: {message}")]
    StreamError { provider: String, message: String },

    /// Error object reported by the endpoint inside an accepted response
    #[error("Error reported by {provider}: {message}")]
    ServerError { provider: String, message: String },

    /// Malformed response body
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Network error
    #[error("Network error connecting to {provider}: {message}")]
    NetworkError { provider: String, message: String },
}

impl ProviderError {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::NotConfigured {
                env_var: Some(_), ..
            } => Some("Set the API key environment variable"),
            ProviderError::NotConfigured { .. } => {
                Some("Configure the endpoint in ~/.config/parley/config.toml")
            }
            ProviderError::ApiError { status: 401 | 403, .. } => {
                Some("Check that your API key is valid and not expired")
            }
            ProviderError::ApiError { status: 404, .. } => {
                Some("Check the endpoint base_url and model name")
            }
            ProviderError::ApiError { .. } | ProviderError::NetworkError { .. }
                if self.is_transient() =>
            {
                Some("Retry later, or pass --queue to keep the request for `parley queue flush`")
            }
            _ => None,
        }
    }

    /// Create an API error from status code and message.
    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ProviderError::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Whether the failure happened at the transport level and is worth
    /// retrying later (network failure, timeout, throttling, server errors).
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::NetworkError { .. } | ProviderError::StreamError { .. } => true,
            ProviderError::ApiError { status, .. } => {
                matches!(*status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_not_configured() {
        let err = Error::from(ProviderError::NotConfigured {
            provider: "openai".into(),
            env_var: Some("OPENAI_API_KEY".into()),
        });
        assert!(err.to_string().contains("openai"));
        assert_eq!(
            err.recovery_suggestion(),
            Some("Set the API key environment variable")
        );
    }

    #[test]
    fn test_api_error() {
        let err = ProviderError::api_error("openai", 429, "Rate limited");
        assert!(err.to_string().contains("429"));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::api_error("openai", 503, "down").is_transient());
        assert!(ProviderError::api_error("openai", 429, "slow down").is_transient());
        assert!(!ProviderError::api_error("openai", 401, "bad key").is_transient());
        assert!(ProviderError::NetworkError {
            provider: "openai".into(),
            message: "connection refused".into(),
        }
        .is_transient());
        assert!(!ProviderError::InvalidResponse {
            provider: "openai".into(),
            message: "not json".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_in_band_server_error_is_not_transient() {
        let err = ProviderError::ServerError {
            provider: "openai".into(),
            message: "maximum context length is 8192 tokens".into(),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("8192"));
        assert!(ProviderError::StreamError {
            provider: "openai".into(),
            message: "connection reset".into(),
        }
        .is_transient());
    }
}
