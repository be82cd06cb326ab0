//! Performance-to-multiplier transfer
//!
//! Scores a state by win rate and average P&L, then maps the score onto the
//! family's bounds: neutral performance lands on the baseline multiplier,
//! better performance moves toward the upper bound, worse toward the lower.

use super::aggregator::{FamilyBaseline, StateAggregate};
use crate::config::GateFamilyConfig;

pub struct MultiplierOptimizer<'a> {
    policy: &'a GateFamilyConfig,
}

impl<'a> MultiplierOptimizer<'a> {
    pub fn new(policy: &'a GateFamilyConfig) -> Self {
        Self { policy }
    }

    /// Win rate relative to neutral, in [-1, 1]
    fn win_rate_component(&self, win_rate: f64) -> f64 {
        let neutral = self.policy.neutral_win_rate;
        let span = neutral.max(1.0 - neutral);
        ((win_rate - neutral) / span).clamp(-1.0, 1.0)
    }

    /// Average P&L in units of the family's typical trade, squashed to (-1, 1)
    fn pnl_component(&self, avg_pnl: f64, baseline: &FamilyBaseline) -> f64 {
        if !baseline.has_pnl_scale() {
            return 0.0;
        }
        (avg_pnl / baseline.pnl_scale).tanh()
    }

    /// Weighted performance score in [-1, 1]
    pub fn score(&self, aggregate: &StateAggregate, baseline: &FamilyBaseline) -> f64 {
        let w_wr = self.policy.win_rate_weight;
        let w_pnl = self.policy.pnl_weight;
        let total = w_wr + w_pnl;
        if total <= 0.0 {
            return 0.0;
        }

        let wr = self.win_rate_component(aggregate.win_rate());
        let pnl = self.pnl_component(aggregate.avg_pnl(), baseline);
        ((w_wr * wr + w_pnl * pnl) / total).clamp(-1.0, 1.0)
    }

    /// Raw target multiplier for a sufficiently sampled state
    pub fn target(&self, aggregate: &StateAggregate, baseline: &FamilyBaseline) -> f64 {
        let score = self.score(aggregate, baseline);
        let base = self.policy.baseline_multiplier;

        let raw = if score >= 0.0 {
            base + score * (self.policy.upper_bound - base)
        } else {
            base + score * (base - self.policy.lower_bound)
        };
        self.policy.clamp(raw)
    }
}
