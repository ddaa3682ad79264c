use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Token counts reported for one (or many accumulated) completion calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Subset of `prompt_tokens` served from the provider's prompt cache.
    #[serde(default)]
    pub cached_tokens: u64,
}

impl TokenUsage {
    /// Prompt tokens billed at the full input rate.
    pub fn input_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_sub(self.cached_tokens)
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
            cached_tokens: self.cached_tokens + other.cached_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Dollar cost of one (or many accumulated) calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostInfo {
    pub input_cost: f64,
    pub cached_input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl Add for CostInfo {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_cost: self.input_cost + other.input_cost,
            cached_input_cost: self.cached_input_cost + other.cached_input_cost,
            output_cost: self.output_cost + other.output_cost,
            total_cost: self.total_cost + other.total_cost,
        }
    }
}

impl AddAssign for CostInfo {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Rounded snapshot of a `CostLedger`, as shown to users and persisted in the
/// project log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Remote API calls only; cache hits are not counted.
    pub total_calls: u64,
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub avg_tokens_per_call: f64,
    pub total_cost: f64,
    pub input_cost: f64,
    pub cached_input_cost: f64,
    pub output_cost: f64,
    pub cache_savings: f64,
}

impl CostSummary {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            cached_tokens: self.cached_tokens,
        }
    }

    pub fn cost(&self) -> CostInfo {
        CostInfo {
            input_cost: self.input_cost,
            cached_input_cost: self.cached_input_cost,
            output_cost: self.output_cost,
            total_cost: self.total_cost,
        }
    }
}
