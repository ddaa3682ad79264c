use crate::core::models::cost::{CostInfo, TokenUsage};

/// Per-model token pricing in dollars per million tokens.
#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub model: &'static str,
    pub input_per_million: f64,
    pub cached_input_per_million: f64,
    pub output_per_million: f64,
}

/// Pricing used for unrecognised models and as the reference for cache savings.
pub const DEFAULT_MODEL: &str = "o4-mini";

/// All known model pricing entries.
static PRICING_TABLE: &[ModelPricing] = &[
    ModelPricing {
        model: "o4-mini",
        input_per_million: 1.10,
        cached_input_per_million: 0.275,
        output_per_million: 4.40,
    },
    ModelPricing {
        model: "gpt-4.1",
        input_per_million: 2.00,
        cached_input_per_million: 0.50,
        output_per_million: 8.00,
    },
    ModelPricing {
        model: "gpt-4.1-mini",
        input_per_million: 0.40,
        cached_input_per_million: 0.10,
        output_per_million: 1.60,
    },
];

/// Map a model identifier onto a pricing family by case-insensitive substring.
/// Order matters: the "-mini" families must be checked before their parents.
fn normalize_model(model: &str) -> &'static str {
    let lower = model.to_lowercase();

    if lower.contains("o4-mini") || lower.contains("o1-mini") {
        "o4-mini"
    } else if lower.contains("gpt-4.1-mini") || lower.contains("gpt-4o-mini") {
        "gpt-4.1-mini"
    } else if lower.contains("gpt-4.1") || lower.contains("gpt-4o") {
        "gpt-4.1"
    } else {
        DEFAULT_MODEL
    }
}

fn default_pricing() -> &'static ModelPricing {
    &PRICING_TABLE[0]
}

/// Look up pricing for a model name, falling back to the default model.
pub fn lookup(model: &str) -> &'static ModelPricing {
    let normalized = normalize_model(model);
    PRICING_TABLE
        .iter()
        .find(|p| p.model == normalized)
        .unwrap_or_else(default_pricing)
}

/// Reference price used to value cached tokens when reporting savings.
pub fn reference_input_per_million() -> f64 {
    default_pricing().input_per_million
}

/// Whether the remote API accepts a `reasoning_effort` parameter for this model.
/// Only the o-series reasoning families do.
pub fn supports_reasoning_effort(model: &str) -> bool {
    let lower = model.to_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    let mut chars = name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('o'), Some('1' | '3' | '4'))
    )
}

/// Calculate cost for one call's token usage.
pub fn calculate_cost(pricing: &ModelPricing, usage: &TokenUsage) -> CostInfo {
    let input_cost = usage.input_tokens() as f64 * pricing.input_per_million / 1_000_000.0;
    let cached_input_cost =
        usage.cached_tokens as f64 * pricing.cached_input_per_million / 1_000_000.0;
    let output_cost = usage.completion_tokens as f64 * pricing.output_per_million / 1_000_000.0;
    CostInfo {
        input_cost,
        cached_input_cost,
        output_cost,
        total_cost: input_cost + cached_input_cost + output_cost,
    }
}
