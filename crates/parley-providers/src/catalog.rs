//! Model catalog.
//!
//! A mutable registry of `(provider, model) -> capabilities` with priority
//! ordering for fallback selection. The catalog is an explicit object so
//! callers (and tests) own its lifecycle; share it through
//! [`SharedCatalog`] when several components need it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use parley_core::config::ModelConfig;
use parley_core::{Capabilities, Tier};

use crate::driver::Usage;

/// Catalog shared between the decision engine and its owner.
pub type SharedCatalog = Arc<RwLock<ModelCatalog>>;

/// A registered model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    pub provider: String,
    pub model: String,
    pub capabilities: Capabilities,
    /// Higher wins ties
    pub priority: i32,
}

impl ModelCatalogEntry {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        capabilities: Capabilities,
        priority: i32,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            capabilities,
            priority,
        }
    }

    /// Cost bucket of this model.
    pub fn tier(&self) -> Tier {
        self.capabilities.tier
    }
}

impl From<&ModelConfig> for ModelCatalogEntry {
    fn from(config: &ModelConfig) -> Self {
        Self::new(
            config.provider.clone(),
            config.model.clone(),
            config.capabilities.clone(),
            config.priority,
        )
    }
}

/// Registry of known models.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<ModelCatalogEntry>,
}

impl ModelCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the built-in models.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        for entry in default_entries() {
            catalog.register(entry);
        }
        catalog
    }

    /// Wrap in a shared handle.
    pub fn shared(self) -> SharedCatalog {
        Arc::new(RwLock::new(self))
    }

    /// Register a model, replacing any entry with the same provider and name.
    pub fn register(&mut self, entry: ModelCatalogEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.provider == entry.provider && e.model == entry.model)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Register every model declared in configuration.
    pub fn register_all<'a>(&mut self, models: impl IntoIterator<Item = &'a ModelConfig>) {
        for model in models {
            self.register(ModelCatalogEntry::from(model));
        }
    }

    /// Remove a model. Returns whether it was registered.
    pub fn unregister(&mut self, provider: &str, model: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.provider == provider && e.model == model));
        self.entries.len() != before
    }

    /// Remove every model.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Get a model by provider and name.
    pub fn get(&self, provider: &str, model: &str) -> Option<&ModelCatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.provider == provider && e.model == model)
    }

    /// All models of a provider, highest priority first.
    ///
    /// Equal priorities keep registration order.
    pub fn candidates(&self, provider: &str) -> Vec<&ModelCatalogEntry> {
        let mut candidates: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.provider == provider)
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        candidates
    }

    /// All registered models in registration order.
    pub fn entries(&self) -> &[ModelCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimate the cost of a call in USD, if pricing is known.
    pub fn estimate_cost(&self, provider: &str, model: &str, usage: &Usage) -> Option<f64> {
        let pricing = self.get(provider, model)?.capabilities.pricing?;
        Some(pricing.cost(usage.prompt_tokens, usage.completion_tokens))
    }
}

fn model(
    provider: &str,
    name: &str,
    tier: Tier,
    priority: i32,
    context_window: u32,
    pricing: (f64, f64),
) -> ModelCatalogEntry {
    let capabilities =
        Capabilities::chat(tier, context_window).with_pricing(pricing.0, pricing.1);
    ModelCatalogEntry::new(provider, name, capabilities, priority)
}

fn default_entries() -> Vec<ModelCatalogEntry> {
    let mut gpt_4o_mini = model("openai", "gpt-4o-mini", Tier::Standard, 20, 128_000, (0.15, 0.60));
    gpt_4o_mini.capabilities.vision = true;
    let mut gpt_4o = model("openai", "gpt-4o", Tier::Premium, 30, 128_000, (2.50, 10.0));
    gpt_4o.capabilities.vision = true;
    gpt_4o.capabilities.audio = true;

    let mut deepseek_reasoner = model("deepseek", "deepseek-reasoner", Tier::Premium, 20, 65_536, (0.55, 2.19));
    deepseek_reasoner.capabilities.tools = false;

    vec![
        model("openai", "gpt-3.5-turbo", Tier::Cheap, 10, 16_385, (0.50, 1.50)),
        gpt_4o_mini,
        gpt_4o,
        model("groq", "llama-3.1-8b-instant", Tier::Cheap, 10, 131_072, (0.05, 0.08)),
        model("groq", "llama-3.3-70b-versatile", Tier::Standard, 20, 131_072, (0.59, 0.79)),
        model("deepseek", "deepseek-chat", Tier::Standard, 10, 65_536, (0.27, 1.10)),
        deepseek_reasoner,
        model("mistral", "mistral-small-latest", Tier::Cheap, 10, 32_768, (0.20, 0.60)),
        model("mistral", "mistral-large-latest", Tier::Premium, 20, 131_072, (2.0, 6.0)),
    ]
}
