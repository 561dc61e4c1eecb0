//! Model capability descriptors.

use serde::{Deserialize, Serialize};

/// Coarse cost/capability bucket. Ordered from cheapest to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Cheap,
    Standard,
    Premium,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Standard
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Cheap => "cheap",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        };
        f.write_str(s)
    }
}

/// Pricing per million tokens (USD).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost in USD for the given token counts.
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let input = prompt_tokens as f64 / 1_000_000.0 * self.input_per_million;
        let output = completion_tokens as f64 / 1_000_000.0 * self.output_per_million;
        input + output
    }
}

/// What a model supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub vision: bool,
    pub tools: bool,
    pub audio: bool,
    pub streaming: bool,
    pub context_window: u32,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            vision: false,
            tools: false,
            audio: false,
            streaming: true,
            context_window: 8_192,
            tier: Tier::Standard,
            pricing: None,
        }
    }
}

impl Capabilities {
    /// Text-only streaming model with tool support.
    pub fn chat(tier: Tier, context_window: u32) -> Self {
        Self {
            tools: true,
            context_window,
            tier,
            ..Self::default()
        }
    }

    /// Enable vision.
    pub fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }

    /// Set tool support.
    pub fn with_tools(mut self, tools: bool) -> Self {
        self.tools = tools;
        self
    }

    /// Set pricing.
    pub fn with_pricing(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.pricing = Some(Pricing::new(input_per_million, output_per_million));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Cheap < Tier::Standard);
        assert!(Tier::Standard < Tier::Premium);
        assert_eq!(Tier::Premium.to_string(), "premium");
    }

    #[test]
    fn test_pricing_cost() {
        let pricing = Pricing::new(2.5, 10.0);
        let cost = pricing.cost(1_000_000, 500_000);
        assert!((cost - 7.5).abs() < 1e-9);
    }
}
