//! CLI command implementations.

pub mod chat;
pub mod config;
pub mod decide;
pub mod mcp;
pub mod memory;
pub mod provider;
pub mod queue;

use parley_core::EndpointConfig;

/// The configured endpoint with command-line overrides applied.
///
/// Switching provider drops the configured base URL and key, which belong
/// to the old provider.
pub fn endpoint_with(
    base: &EndpointConfig,
    provider: Option<&str>,
    model: Option<&str>,
    system: Option<&str>,
) -> EndpointConfig {
    let mut endpoint = base.clone();
    if let Some(provider) = provider.filter(|p| !p.eq_ignore_ascii_case(&base.provider)) {
        endpoint = EndpointConfig {
            system_prompt: endpoint.system_prompt,
            folder_id: endpoint.folder_id,
            ..EndpointConfig::new(provider)
        };
    }
    if let Some(model) = model {
        endpoint.model = model.to_string();
    }
    if let Some(system) = system {
        endpoint.system_prompt = Some(system.to_string());
    }
    endpoint
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_overrides() {
        let base = EndpointConfig::new("openai")
            .with_base_url("https://proxy.local/v1")
            .with_api_key("sk-1")
            .with_model("gpt-4o");

        let same = endpoint_with(&base, Some("OpenAI"), None, Some("Be terse."));
        assert_eq!(same.base_url, "https://proxy.local/v1");
        assert_eq!(same.model, "gpt-4o");
        assert_eq!(same.system_prompt.as_deref(), Some("Be terse."));

        let switched = endpoint_with(&base, Some("groq"), Some(""), None);
        assert_eq!(switched.provider, "groq");
        assert!(switched.base_url.is_empty());
        assert!(switched.api_key.is_empty());
        assert!(switched.is_auto());
    }
}
