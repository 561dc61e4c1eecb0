//! Decision engine: which model to call and whether tools are offered.
//!
//! A pure function of the endpoint, the conversation and the current
//! catalog. Manual mode (explicit model) matches capabilities; auto mode
//! (empty model) classifies request complexity and picks the cheapest
//! sufficient tier.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_core::{Capabilities, ConversationMessage, EndpointConfig, Role, Tier};

use crate::catalog::{ModelCatalogEntry, SharedCatalog};
use crate::providers;

// ============================================================================
// Complexity classification
// ============================================================================

/// Word count above which a request is complex.
const COMPLEX_WORDS: usize = 150;
/// Word count above which a request is at least moderate.
const MODERATE_WORDS: usize = 40;
/// Question marks at which a request is at least moderate.
const MODERATE_QUESTIONS: usize = 2;

static COMPLEX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(implement|refactor|architect(ure)?|optimi[sz]e|debug|algorithm|analy[sz]e)\b",
        r"(?i)\b(step[- ]by[- ]step|in detail|compare and contrast|prove|derive|design a)\b",
        r"(?i)(реализ|рефактор|архитектур|спроектир|оптимизир|отлад|алгоритм|проанализир)",
        r"(?i)(пошагов|подробно|сравни|докажи|выведи формулу)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static MODERATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(explain|why|summari[sz]e|translate|describe|difference between|write)\b",
        r"(?i)\bhow (do|does|to|can|should)\b",
        r"(?i)(объясни|почему|кратко|переведи|опиши|разница между|напиши)",
        r"(?i)\bкак (сделать|работает|мне)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Request complexity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// Minimum model tier for this complexity.
    pub fn required_tier(&self) -> Tier {
        match self {
            Complexity::Simple => Tier::Cheap,
            Complexity::Moderate => Tier::Standard,
            Complexity::Complex => Tier::Premium,
        }
    }
}

/// Classify a user message.
pub fn classify_complexity(text: &str) -> Complexity {
    let words = text.split_whitespace().count();

    if text.contains("```")
        || words > COMPLEX_WORDS
        || COMPLEX_PATTERNS.iter().any(|re| re.is_match(text))
    {
        return Complexity::Complex;
    }

    let questions = text.matches('?').count();
    if words > MODERATE_WORDS
        || questions >= MODERATE_QUESTIONS
        || MODERATE_PATTERNS.iter().any(|re| re.is_match(text))
    {
        return Complexity::Moderate;
    }

    Complexity::Simple
}

// ============================================================================
// Decision
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Chat,
    Tool,
}

/// Machine-readable reason for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The endpoint's model satisfied every requirement
    ManualSelected,
    /// Another model of the provider satisfied the requirements
    ManualCapabilityMatch,
    /// Nothing satisfied the requirements; the endpoint's model is kept
    ManualFallback,
    AutoSelectedSimple,
    AutoSelectedModerate,
    AutoSelectedComplex,
    /// No candidate qualified; the highest-priority model is used
    AutoFallbackFirst,
    /// The catalog has no models for the provider
    AutoProviderDefault,
    NoModelsAvailable,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::ManualSelected => "manual_selected",
            ReasonCode::ManualCapabilityMatch => "manual_capability_match",
            ReasonCode::ManualFallback => "manual_fallback",
            ReasonCode::AutoSelectedSimple => "auto_selected_simple",
            ReasonCode::AutoSelectedModerate => "auto_selected_moderate",
            ReasonCode::AutoSelectedComplex => "auto_selected_complex",
            ReasonCode::AutoFallbackFirst => "auto_fallback_first",
            ReasonCode::AutoProviderDefault => "auto_provider_default",
            ReasonCode::NoModelsAvailable => "no_models_available",
        }
    }

    fn auto_selected(complexity: Complexity) -> Self {
        match complexity {
            Complexity::Simple => ReasonCode::AutoSelectedSimple,
            Complexity::Moderate => ReasonCode::AutoSelectedModerate,
            Complexity::Complex => ReasonCode::AutoSelectedComplex,
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved model and tool policy for one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDecision {
    /// Empty when no model is available
    pub model: String,
    pub tool_choice: ToolChoice,
    pub mode: AgentMode,
    pub capabilities: Capabilities,
    pub reason: ReasonCode,
}

impl AgentDecision {
    pub fn tools_enabled(&self) -> bool {
        self.mode == AgentMode::Tool
    }
}

/// Input to [`DecisionEngine::decide`].
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub endpoint: &'a EndpointConfig,
    pub conversation: &'a [ConversationMessage],
    /// Whether the caller wants tools offered at all
    pub tools_requested: bool,
    /// Number of tools available to offer
    pub tool_count: usize,
}

impl<'a> DecisionRequest<'a> {
    pub fn new(endpoint: &'a EndpointConfig, conversation: &'a [ConversationMessage]) -> Self {
        Self {
            endpoint,
            conversation,
            tools_requested: false,
            tool_count: 0,
        }
    }

    /// Offer `tool_count` tools.
    pub fn with_tools(mut self, tool_count: usize) -> Self {
        self.tools_requested = true;
        self.tool_count = tool_count;
        self
    }

    fn needs_tools(&self) -> bool {
        self.tools_requested && self.tool_count > 0
    }

    fn needs_vision(&self) -> bool {
        self.conversation
            .iter()
            .any(|m| m.role == Role::User && m.has_image())
    }

    fn latest_user_text(&self) -> &str {
        self.conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
            .unwrap_or_default()
    }
}

/// Capability requirements derived from a request.
#[derive(Debug, Clone, Copy)]
struct Requirements {
    vision: bool,
    tools: bool,
}

impl Requirements {
    fn satisfied_by(&self, caps: &Capabilities) -> bool {
        caps.streaming && (!self.vision || caps.vision) && (!self.tools || caps.tools)
    }
}

/// Selects the model and tool mode for each call.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    catalog: SharedCatalog,
}

impl DecisionEngine {
    pub fn new(catalog: SharedCatalog) -> Self {
        Self { catalog }
    }

    /// The catalog this engine reads.
    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    /// Resolve the model and tool policy for `request`.
    pub fn decide(&self, request: &DecisionRequest<'_>) -> AgentDecision {
        let requirements = Requirements {
            vision: request.needs_vision(),
            tools: request.needs_tools(),
        };

        let decision = if request.endpoint.is_auto() {
            self.decide_auto(request, requirements)
        } else {
            self.decide_manual(request, requirements)
        };

        debug!(
            provider = %request.endpoint.provider,
            model = %decision.model,
            reason = %decision.reason,
            tools = decision.tools_enabled(),
            "Model decision"
        );
        decision
    }

    fn decide_manual(&self, request: &DecisionRequest<'_>, req: Requirements) -> AgentDecision {
        let endpoint = request.endpoint;
        let model = endpoint.model.trim();
        let catalog = self.catalog.read();

        let primary = catalog
            .get(&endpoint.provider, model)
            .cloned()
            .unwrap_or_else(|| {
                let spec = providers::lookup_or_custom(&endpoint.provider);
                ModelCatalogEntry::new(
                    endpoint.provider.clone(),
                    model,
                    spec.default_capabilities.clone(),
                    0,
                )
            });

        if req.satisfied_by(&primary.capabilities) {
            return finish(request, primary.model, primary.capabilities, ReasonCode::ManualSelected);
        }

        let alternative = catalog
            .candidates(&endpoint.provider)
            .into_iter()
            .filter(|e| e.model != primary.model)
            .find(|e| req.satisfied_by(&e.capabilities));

        match alternative {
            Some(entry) => finish(
                request,
                entry.model.clone(),
                entry.capabilities.clone(),
                ReasonCode::ManualCapabilityMatch,
            ),
            None => finish(request, primary.model, primary.capabilities, ReasonCode::ManualFallback),
        }
    }

    fn decide_auto(&self, request: &DecisionRequest<'_>, req: Requirements) -> AgentDecision {
        let endpoint = request.endpoint;
        let complexity = classify_complexity(request.latest_user_text());
        let required = complexity.required_tier();
        let catalog = self.catalog.read();
        let candidates = catalog.candidates(&endpoint.provider);

        if candidates.is_empty() {
            let spec = providers::lookup_or_custom(&endpoint.provider);
            return match spec.default_model_for(endpoint.folder_id.as_deref()) {
                Some(model) => finish(
                    request,
                    model,
                    spec.default_capabilities.clone(),
                    ReasonCode::AutoProviderDefault,
                ),
                None => AgentDecision {
                    model: String::new(),
                    tool_choice: ToolChoice::None,
                    mode: AgentMode::Chat,
                    capabilities: Capabilities::default(),
                    reason: ReasonCode::NoModelsAvailable,
                },
            };
        }

        // Candidates are in priority order, so the first of the lowest
        // sufficient tier wins ties.
        let mut best: Option<&ModelCatalogEntry> = None;
        for entry in candidates.iter().copied() {
            if entry.tier() < required || !req.satisfied_by(&entry.capabilities) {
                continue;
            }
            if best.map_or(true, |b| entry.tier() < b.tier()) {
                best = Some(entry);
            }
        }

        match best {
            Some(entry) => finish(
                request,
                entry.model.clone(),
                entry.capabilities.clone(),
                ReasonCode::auto_selected(complexity),
            ),
            None => {
                let first = candidates[0];
                finish(
                    request,
                    first.model.clone(),
                    first.capabilities.clone(),
                    ReasonCode::AutoFallbackFirst,
                )
            }
        }
    }
}

fn finish(
    request: &DecisionRequest<'_>,
    model: String,
    capabilities: Capabilities,
    reason: ReasonCode,
) -> AgentDecision {
    let tools = capabilities.tools && request.needs_tools();
    AgentDecision {
        model,
        tool_choice: if tools { ToolChoice::Auto } else { ToolChoice::None },
        mode: if tools { AgentMode::Tool } else { AgentMode::Chat },
        capabilities,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use parley_core::Attachment;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(ModelCatalog::with_defaults().shared())
    }

    fn decide(engine: &DecisionEngine, endpoint: &EndpointConfig, text: &str) -> AgentDecision {
        let conversation = vec![ConversationMessage::user(text)];
        engine.decide(&DecisionRequest::new(endpoint, &conversation))
    }

    #[test]
    fn test_classify_complexity() {
        assert_eq!(classify_complexity("Hi"), Complexity::Simple);
        assert_eq!(classify_complexity("Привет"), Complexity::Simple);
        assert_eq!(
            classify_complexity("Fix this:\n```rust\nfn main() {}\n```"),
            Complexity::Complex
        );
        assert_eq!(
            classify_complexity("Please refactor the login module"),
            Complexity::Complex
        );
        assert_eq!(classify_complexity("Оптимизируй этот запрос"), Complexity::Complex);
        assert_eq!(classify_complexity("Explain monads"), Complexity::Moderate);
        assert_eq!(classify_complexity("Объясни, что такое монада"), Complexity::Moderate);
        assert_eq!(classify_complexity("Is it? Really?"), Complexity::Moderate);
        assert_eq!(classify_complexity(&"word ".repeat(60)), Complexity::Moderate);
        assert_eq!(classify_complexity(&"word ".repeat(200)), Complexity::Complex);
    }

    #[test]
    fn test_auto_simple_picks_cheapest() {
        let endpoint = EndpointConfig::new("openai");
        let decision = decide(&engine(), &endpoint, "Hi");
        assert_eq!(decision.model, "gpt-3.5-turbo");
        assert_eq!(decision.reason, ReasonCode::AutoSelectedSimple);
        assert_eq!(decision.reason.as_str(), "auto_selected_simple");
        assert!(!decision.tools_enabled());
    }

    #[test]
    fn test_auto_code_fence_picks_premium() {
        let endpoint = EndpointConfig::new("openai");
        let decision = decide(&engine(), &endpoint, "What does this do?\n```\nx = 1\n```");
        assert_eq!(decision.model, "gpt-4o");
        assert_eq!(decision.reason, ReasonCode::AutoSelectedComplex);
    }

    #[test]
    fn test_auto_moderate_picks_standard() {
        let endpoint = EndpointConfig::new("openai");
        let decision = decide(&engine(), &endpoint, "Explain how DNS works");
        assert_eq!(decision.model, "gpt-4o-mini");
        assert_eq!(decision.reason, ReasonCode::AutoSelectedModerate);
    }

    #[test]
    fn test_auto_vision_skips_text_only_model() {
        let endpoint = EndpointConfig::new("openai");
        let conversation =
            vec![ConversationMessage::user("Hi").with_attachment(Attachment::image("/tmp/a.png"))];
        let decision = engine().decide(&DecisionRequest::new(&endpoint, &conversation));
        assert_eq!(decision.model, "gpt-4o-mini");
        assert!(decision.capabilities.vision);
    }

    #[test]
    fn test_auto_fallback_first() {
        let endpoint = EndpointConfig::new("deepseek");
        // Premium deepseek model has no tools, standard one is below the tier
        let conversation = vec![ConversationMessage::user("Refactor this module")];
        let decision =
            engine().decide(&DecisionRequest::new(&endpoint, &conversation).with_tools(2));
        assert_eq!(decision.reason, ReasonCode::AutoFallbackFirst);
        assert_eq!(decision.model, "deepseek-reasoner");
        assert!(!decision.tools_enabled());
    }

    #[test]
    fn test_auto_provider_default_with_folder() {
        let endpoint = EndpointConfig::new("yandex").with_folder_id("b1g42");
        let decision = decide(&engine(), &endpoint, "Hi");
        assert_eq!(decision.model, "gpt://b1g42/yandexgpt-lite/latest");
        assert_eq!(decision.reason, ReasonCode::AutoProviderDefault);
    }

    #[test]
    fn test_no_models_available() {
        let endpoint = EndpointConfig::new("replicate");
        let conversation = vec![ConversationMessage::user("Hi")];
        let decision =
            engine().decide(&DecisionRequest::new(&endpoint, &conversation).with_tools(3));
        assert_eq!(decision.reason, ReasonCode::NoModelsAvailable);
        assert!(decision.model.is_empty());
        assert_eq!(decision.tool_choice, ToolChoice::None);
    }

    #[test]
    fn test_manual_selected_with_tools() {
        let endpoint = EndpointConfig::new("openai").with_model("gpt-4o");
        let conversation = vec![ConversationMessage::user("Hi")];
        let decision =
            engine().decide(&DecisionRequest::new(&endpoint, &conversation).with_tools(1));
        assert_eq!(decision.model, "gpt-4o");
        assert_eq!(decision.reason, ReasonCode::ManualSelected);
        assert_eq!(decision.tool_choice, ToolChoice::Auto);
        assert_eq!(decision.mode, AgentMode::Tool);
    }

    #[test]
    fn test_tools_disabled_without_tool_list() {
        let endpoint = EndpointConfig::new("openai").with_model("gpt-4o");
        let conversation = vec![ConversationMessage::user("Hi")];
        let decision =
            engine().decide(&DecisionRequest::new(&endpoint, &conversation).with_tools(0));
        assert_eq!(decision.tool_choice, ToolChoice::None);
        assert_eq!(decision.mode, AgentMode::Chat);
    }

    #[test]
    fn test_manual_capability_match() {
        let endpoint = EndpointConfig::new("openai").with_model("gpt-3.5-turbo");
        let conversation =
            vec![ConversationMessage::user("What is this?").with_attachment(Attachment::image("x.png"))];
        let decision = engine().decide(&DecisionRequest::new(&endpoint, &conversation));
        assert_eq!(decision.model, "gpt-4o");
        assert_eq!(decision.reason, ReasonCode::ManualCapabilityMatch);
    }

    #[test]
    fn test_manual_fallback_keeps_endpoint_model() {
        let endpoint = EndpointConfig::new("groq").with_model("llama-3.1-8b-instant");
        let conversation =
            vec![ConversationMessage::user("What is this?").with_attachment(Attachment::image("x.png"))];
        let decision = engine().decide(&DecisionRequest::new(&endpoint, &conversation));
        assert_eq!(decision.model, "llama-3.1-8b-instant");
        assert_eq!(decision.reason, ReasonCode::ManualFallback);
    }

    #[test]
    fn test_manual_unregistered_uses_provider_defaults() {
        let endpoint = EndpointConfig::new("local").with_model("qwen2.5:7b");
        let decision = decide(&engine(), &endpoint, "Hi");
        assert_eq!(decision.model, "qwen2.5:7b");
        assert_eq!(decision.reason, ReasonCode::ManualSelected);
        assert!(decision.capabilities.tools);
    }

    #[test]
    fn test_catalog_changes_are_visible() {
        let engine = engine();
        engine.catalog().write().unregister("openai", "gpt-3.5-turbo");
        let endpoint = EndpointConfig::new("openai");
        let decision = decide(&engine, &endpoint, "Hi");
        assert_eq!(decision.model, "gpt-4o-mini");
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ReasonCode::AutoProviderDefault).unwrap();
        assert_eq!(json, "\"auto_provider_default\"");
    }
}
