//! Per-state performance aggregation
//!
//! Groups recomputed from scratch every pass; nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::TradeOutcome;

/// Smallest P&L scale used to normalise per-state P&L
const MIN_PNL_SCALE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sufficiency {
    Sufficient,
    /// Too few trades; the state's stored multiplier is left alone
    InsufficientData,
}

/// Aggregated outcomes for one (family, state)
#[derive(Debug, Clone, PartialEq)]
pub struct StateAggregate {
    pub state: String,
    pub trades: usize,
    pub wins: usize,
    pub sum_pnl: f64,
    pub sum_roi: f64,
    pub sufficiency: Sufficiency,
}

impl StateAggregate {
    fn new(state: &str) -> Self {
        Self {
            state: state.to_string(),
            trades: 0,
            wins: 0,
            sum_pnl: 0.0,
            sum_roi: 0.0,
            sufficiency: Sufficiency::InsufficientData,
        }
    }

    fn record(&mut self, outcome: &TradeOutcome) {
        self.trades += 1;
        if outcome.is_win {
            self.wins += 1;
        }
        self.sum_pnl += outcome.pnl;
        self.sum_roi += outcome.roi;
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }

    pub fn avg_pnl(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.sum_pnl / self.trades as f64
        }
    }

    pub fn avg_roi(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.sum_roi / self.trades as f64
        }
    }

    pub fn is_sufficient(&self) -> bool {
        self.sufficiency == Sufficiency::Sufficient
    }
}

/// Pooled statistics over every tagged trade of a family in the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FamilyBaseline {
    pub trades: usize,
    /// Mean absolute P&L, the unit per-state P&L is measured in
    pub pnl_scale: f64,
}

impl FamilyBaseline {
    pub fn from_pairs(pairs: &[(String, TradeOutcome)]) -> Self {
        if pairs.is_empty() {
            return Self {
                trades: 0,
                pnl_scale: 0.0,
            };
        }
        let n = pairs.len() as f64;
        let sum_abs: f64 = pairs.iter().map(|(_, o)| o.pnl.abs()).sum();

        Self {
            trades: pairs.len(),
            pnl_scale: sum_abs / n,
        }
    }

    pub fn has_pnl_scale(&self) -> bool {
        self.pnl_scale > MIN_PNL_SCALE
    }
}

/// Group outcomes by state label, sorted by label
pub fn aggregate(pairs: &[(String, TradeOutcome)], min_samples: usize) -> Vec<StateAggregate> {
    let mut groups: BTreeMap<&str, StateAggregate> = BTreeMap::new();
    for (state, outcome) in pairs {
        groups
            .entry(state.as_str())
            .or_insert_with(|| StateAggregate::new(state))
            .record(outcome);
    }

    groups
        .into_values()
        .map(|mut group| {
            if group.trades >= min_samples {
                group.sufficiency = Sufficiency::Sufficient;
            }
            group
        })
        .collect()
}
