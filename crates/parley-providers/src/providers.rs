//! Static provider registry.
//!
//! Maps a provider id to its default base URL, auth header format, folder-id
//! requirement and default model. Pure lookup, no state.

use parley_core::config::{Config, ValidationResult};
use parley_core::{Capabilities, EndpointConfig, Tier};

/// How the API key is attached to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key: <key>`
    XApiKey,
    /// `Authorization: Api-Key <key>`
    ApiKey,
    /// `Authorization: Token <key>`
    Token,
    /// No authentication
    None,
}

impl AuthScheme {
    /// The header carrying `key`, if this scheme uses one.
    pub fn header(&self, key: &str) -> Option<(String, String)> {
        let (name, value) = match self {
            AuthScheme::Bearer => ("Authorization", format!("Bearer {}", key)),
            AuthScheme::XApiKey => ("x-api-key", key.to_string()),
            AuthScheme::ApiKey => ("Authorization", format!("Api-Key {}", key)),
            AuthScheme::Token => ("Authorization", format!("Token {}", key)),
            AuthScheme::None => return None,
        };
        Some((name.to_string(), value))
    }
}

/// Placeholder for the folder id in default model templates.
const FOLDER_PLACEHOLDER: &str = "{folder}";

/// Static description of a model provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub auth: AuthScheme,
    pub api_key_env: Option<&'static str>,
    /// Static headers sent on every request
    pub extra_headers: &'static [(&'static str, &'static str)],
    /// Whether a folder/account id must accompany requests (`x-folder-id`)
    pub requires_folder_id: bool,
    /// Default model; may embed `{folder}`
    pub default_model: Option<&'static str>,
    /// Capabilities assumed for models missing from the catalog
    pub default_capabilities: Capabilities,
}

const fn caps(vision: bool, tools: bool, context_window: u32) -> Capabilities {
    Capabilities {
        vision,
        tools,
        audio: false,
        streaming: true,
        context_window,
        tier: Tier::Standard,
        pricing: None,
    }
}

static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
        auth: AuthScheme::Bearer,
        api_key_env: Some("OPENAI_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("gpt-4o-mini"),
        default_capabilities: caps(true, true, 128_000),
    },
    ProviderSpec {
        id: "anthropic",
        name: "Anthropic",
        base_url: "https://api.anthropic.com/v1",
        auth: AuthScheme::XApiKey,
        api_key_env: Some("ANTHROPIC_API_KEY"),
        extra_headers: &[("anthropic-version", "2023-06-01")],
        requires_folder_id: false,
        default_model: Some("claude-3-5-haiku-latest"),
        default_capabilities: caps(true, true, 200_000),
    },
    ProviderSpec {
        id: "together",
        name: "Together AI",
        base_url: "https://api.together.xyz/v1",
        auth: AuthScheme::Bearer,
        api_key_env: Some("TOGETHER_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("meta-llama/Llama-3.3-70B-Instruct-Turbo"),
        default_capabilities: caps(false, true, 131_072),
    },
    ProviderSpec {
        id: "mistral",
        name: "Mistral",
        base_url: "https://api.mistral.ai/v1",
        auth: AuthScheme::Bearer,
        api_key_env: Some("MISTRAL_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("mistral-small-latest"),
        default_capabilities: caps(false, true, 32_768),
    },
    ProviderSpec {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        auth: AuthScheme::Bearer,
        api_key_env: Some("GROQ_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("llama-3.1-8b-instant"),
        default_capabilities: caps(false, true, 131_072),
    },
    ProviderSpec {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com/v1",
        auth: AuthScheme::Bearer,
        api_key_env: Some("DEEPSEEK_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("deepseek-chat"),
        default_capabilities: caps(false, true, 65_536),
    },
    ProviderSpec {
        id: "dashscope",
        name: "Alibaba DashScope",
        base_url: "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
        auth: AuthScheme::Bearer,
        api_key_env: Some("DASHSCOPE_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("qwen-plus"),
        default_capabilities: caps(false, true, 131_072),
    },
    ProviderSpec {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        auth: AuthScheme::Bearer,
        api_key_env: Some("OPENROUTER_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("openai/gpt-4o-mini"),
        default_capabilities: caps(true, true, 128_000),
    },
    ProviderSpec {
        id: "yandex",
        name: "Yandex Cloud",
        base_url: "https://llm.api.cloud.yandex.net/v1",
        auth: AuthScheme::ApiKey,
        api_key_env: Some("YANDEX_API_KEY"),
        extra_headers: &[],
        requires_folder_id: true,
        default_model: Some("gpt://{folder}/yandexgpt-lite/latest"),
        default_capabilities: caps(false, true, 32_768),
    },
    ProviderSpec {
        id: "replicate",
        name: "Replicate",
        base_url: "https://openai-proxy.replicate.com/v1",
        auth: AuthScheme::Token,
        api_key_env: Some("REPLICATE_API_KEY"),
        extra_headers: &[],
        requires_folder_id: false,
        default_model: None,
        default_capabilities: caps(false, false, 8_192),
    },
    ProviderSpec {
        id: "local",
        name: "Local (Ollama)",
        base_url: "http://localhost:11434/v1",
        auth: AuthScheme::None,
        api_key_env: None,
        extra_headers: &[],
        requires_folder_id: false,
        default_model: Some("llama3.2"),
        default_capabilities: caps(false, true, 8_192),
    },
    ProviderSpec {
        id: "custom",
        name: "Custom (OpenAI-compatible)",
        base_url: "",
        auth: AuthScheme::Bearer,
        api_key_env: None,
        extra_headers: &[],
        requires_folder_id: false,
        default_model: None,
        default_capabilities: caps(false, true, 8_192),
    },
];

/// All known providers.
pub fn all() -> &'static [ProviderSpec] {
    PROVIDERS
}

/// Look up a provider by id.
pub fn lookup(id: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Look up a provider, treating unknown ids as a custom OpenAI-compatible
/// endpoint.
pub fn lookup_or_custom(id: &str) -> &'static ProviderSpec {
    lookup(id).unwrap_or(&PROVIDERS[PROVIDERS.len() - 1])
}

impl ProviderSpec {
    /// Default model name, with the folder id substituted.
    ///
    /// Returns `None` if the provider has no default or the template needs a
    /// folder id that was not supplied.
    pub fn default_model_for(&self, folder_id: Option<&str>) -> Option<String> {
        let template = self.default_model?;
        if !template.contains(FOLDER_PLACEHOLDER) {
            return Some(template.to_string());
        }
        let folder = folder_id.filter(|f| !f.trim().is_empty())?;
        Some(template.replace(FOLDER_PLACEHOLDER, folder.trim()))
    }

    /// Base URL to use for `endpoint`.
    pub fn resolve_base_url<'a>(&'a self, endpoint: &'a EndpointConfig) -> &'a str {
        let url = if endpoint.base_url.trim().is_empty() {
            self.base_url
        } else {
            endpoint.base_url.trim()
        };
        url.trim_end_matches('/')
    }

    /// Resolve the API key from the endpoint or the provider's env var.
    pub fn resolve_api_key(&self, endpoint: &EndpointConfig) -> Option<String> {
        if !endpoint.api_key.is_empty() {
            return Some(endpoint.api_key.clone());
        }
        match self.api_key_env {
            Some(var) => std::env::var(var).ok().filter(|k| !k.is_empty()),
            None => endpoint.resolve_api_key(),
        }
    }

    /// All headers required to authenticate a request for `endpoint`.
    pub fn request_headers(&self, endpoint: &EndpointConfig) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(key) = self.resolve_api_key(endpoint) {
            headers.extend(self.auth.header(&key));
        }
        for (name, value) in self.extra_headers {
            headers.push((name.to_string(), value.to_string()));
        }
        if self.requires_folder_id {
            if let Some(folder) = endpoint.folder_id.as_deref().filter(|f| !f.is_empty()) {
                headers.push(("x-folder-id".to_string(), folder.to_string()));
            }
        }
        headers
    }
}

/// Full configuration validation, including provider-specific checks.
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = config.validate();

    match lookup(&config.endpoint.provider) {
        None => result.add_error(
            "endpoint.provider",
            format!(
                "Unknown provider '{}'. Known providers: {}",
                config.endpoint.provider,
                PROVIDERS.iter().map(|p| p.id).collect::<Vec<_>>().join(", ")
            ),
        ),
        Some(spec) => {
            if spec.requires_folder_id
                && config
                    .endpoint
                    .folder_id
                    .as_deref()
                    .map_or(true, |f| f.trim().is_empty())
            {
                result.add_warning(
                    "endpoint.folder_id",
                    format!("Provider '{}' requires a folder id", spec.id),
                );
            }
            if spec.base_url.is_empty() && config.endpoint.base_url.is_empty() {
                result.add_error(
                    "endpoint.base_url",
                    format!("Provider '{}' has no default base_url", spec.id),
                );
            }
        }
    }

    for (i, model) in config.models.iter().enumerate() {
        if lookup(&model.provider).is_none() {
            result.add_warning(
                format!("models[{}].provider", i),
                format!("Unknown provider '{}'", model.provider),
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_headers() {
        assert_eq!(
            AuthScheme::Bearer.header("k"),
            Some(("Authorization".to_string(), "Bearer k".to_string()))
        );
        assert_eq!(
            AuthScheme::XApiKey.header("k"),
            Some(("x-api-key".to_string(), "k".to_string()))
        );
        assert_eq!(
            AuthScheme::ApiKey.header("k"),
            Some(("Authorization".to_string(), "Api-Key k".to_string()))
        );
        assert_eq!(
            AuthScheme::Token.header("k"),
            Some(("Authorization".to_string(), "Token k".to_string()))
        );
        assert_eq!(AuthScheme::None.header("k"), None);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("openai").map(|p| p.auth), Some(AuthScheme::Bearer));
        assert_eq!(lookup("OpenAI").map(|p| p.id), Some("openai"));
        assert!(lookup("nope").is_none());
        assert_eq!(lookup_or_custom("nope").id, "custom");
        for id in ["together", "mistral", "groq", "deepseek", "dashscope"] {
            assert_eq!(lookup(id).map(|p| p.auth), Some(AuthScheme::Bearer), "{}", id);
        }
    }

    #[test]
    fn test_yandex_default_model_embeds_folder() {
        let yandex = lookup("yandex").unwrap();
        assert!(yandex.requires_folder_id);
        assert_eq!(
            yandex.default_model_for(Some("b1gabc")),
            Some("gpt://b1gabc/yandexgpt-lite/latest".to_string())
        );
        assert_eq!(yandex.default_model_for(None), None);
        assert_eq!(lookup("replicate").unwrap().default_model_for(None), None);
    }

    #[test]
    fn test_request_headers() {
        let endpoint = EndpointConfig::new("yandex")
            .with_api_key("secret")
            .with_folder_id("b1g");
        let headers = lookup("yandex").unwrap().request_headers(&endpoint);
        assert!(headers.contains(&("Authorization".to_string(), "Api-Key secret".to_string())));
        assert!(headers.contains(&("x-folder-id".to_string(), "b1g".to_string())));

        let endpoint = EndpointConfig::new("anthropic").with_api_key("secret");
        let headers = lookup("anthropic").unwrap().request_headers(&endpoint);
        assert!(headers.contains(&("x-api-key".to_string(), "secret".to_string())));
        assert!(headers.contains(&("anthropic-version".to_string(), "2023-06-01".to_string())));
    }

    #[test]
    fn test_resolve_base_url() {
        let openai = lookup("openai").unwrap();
        let endpoint = EndpointConfig::new("openai");
        assert_eq!(openai.resolve_base_url(&endpoint), "https://api.openai.com/v1");

        let endpoint = EndpointConfig::new("openai").with_base_url("http://proxy:8080/v1/");
        assert_eq!(openai.resolve_base_url(&endpoint), "http://proxy:8080/v1");
    }

    #[test]
    fn test_validate_config() {
        let mut config = Config::default();
        assert!(validate_config(&config).is_ok());

        config.endpoint.provider = "mystery".into();
        let result = validate_config(&config);
        assert!(result.errors().iter().any(|e| e.field == "endpoint.provider"));

        config.endpoint.provider = "yandex".into();
        let result = validate_config(&config);
        assert!(result.is_ok());
        assert!(result.warnings().iter().any(|e| e.field == "endpoint.folder_id"));
    }
}
