//! # parley-providers
//!
//! Model-side building blocks for Parley.
//!
//! This crate provides:
//! - The static provider registry (base URLs, auth headers, default models)
//! - The mutable model catalog with capability descriptors and tiers
//! - The decision engine choosing model and tool mode per call
//! - The streaming completion driver for OpenAI-compatible endpoints

pub mod catalog;
pub mod decision;
pub mod driver;
pub mod providers;

pub use catalog::{ModelCatalog, ModelCatalogEntry, SharedCatalog};
pub use decision::{
    classify_complexity, AgentDecision, AgentMode, Complexity, DecisionEngine, DecisionRequest,
    ReasonCode, ToolChoice,
};
pub use driver::{
    ChatOutcome, ChatRequest, CompletionDriver, OpenAiCompatibleDriver, StreamAccumulator, Usage,
};
pub use providers::{validate_config, AuthScheme, ProviderSpec};
