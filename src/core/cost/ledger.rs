use std::sync::Mutex;

use crate::core::cost::pricing;
use crate::core::models::cost::{CostInfo, CostSummary, TokenUsage};

#[derive(Debug, Default, Clone, Copy)]
struct LedgerState {
    usage: TokenUsage,
    cost: CostInfo,
    calls: u64,
}

/// Running token and cost totals shared by every worker of a batch.
///
/// Totals only ever grow. A ledger may be seeded with a previous session's
/// totals so that resumed runs keep their historical cost.
#[derive(Debug, Default)]
pub struct CostLedger {
    state: Mutex<LedgerState>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one remote call's usage and cost.
    pub fn record(&self, usage: TokenUsage, cost: CostInfo) {
        self.add(1, usage, cost);
    }

    /// Fold in totals from a previous session as if those calls had been
    /// recorded here.
    pub fn seed(&self, previous_calls: u64, previous_usage: TokenUsage, previous_cost: CostInfo) {
        self.add(previous_calls, previous_usage, previous_cost);
    }

    fn add(&self, calls: u64, usage: TokenUsage, cost: CostInfo) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.usage += usage;
        state.cost += cost;
        state.calls += calls;
    }

    fn snapshot(&self) -> LedgerState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn summarize(&self) -> CostSummary {
        let state = self.snapshot();
        let avg = if state.calls > 0 {
            state.usage.total_tokens as f64 / state.calls as f64
        } else {
            0.0
        };
        let cache_savings = if state.usage.cached_tokens > 0 {
            round_to(
                state.usage.cached_tokens as f64 * pricing::reference_input_per_million()
                    / 1_000_000.0
                    - state.cost.cached_input_cost,
                6,
            )
        } else {
            0.0
        };

        CostSummary {
            total_calls: state.calls,
            total_tokens: state.usage.total_tokens,
            prompt_tokens: state.usage.prompt_tokens,
            completion_tokens: state.usage.completion_tokens,
            cached_tokens: state.usage.cached_tokens,
            avg_tokens_per_call: round_to(avg, 1),
            total_cost: round_to(state.cost.total_cost, 6),
            input_cost: round_to(state.cost.input_cost, 6),
            cached_input_cost: round_to(state.cost.cached_input_cost, 6),
            output_cost: round_to(state.cost.output_cost, 6),
            cache_savings,
        }
    }
}
