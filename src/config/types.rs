//! Gate family policy table
//!
//! One entry per gate family. The learner instantiates the same pipeline for
//! every entry, so adding a family is a config change.

use serde::{Deserialize, Serialize};

use crate::errors::{LearnerError, LearnerResult};

/// Learning policy for one gate family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateFamilyConfig {
    /// Family name, as tagged on closed trades (e.g. "streak")
    pub name: String,
    /// Multiplier used when nothing has been learned for a state
    #[serde(default = "default_baseline")]
    pub baseline_multiplier: f64,
    #[serde(default = "default_lower")]
    pub lower_bound: f64,
    #[serde(default = "default_upper")]
    pub upper_bound: f64,
    /// EWMA smoothing factor in (0, 1]
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Trades a state needs before it may move its multiplier
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Weight of the normalized win rate in the performance score
    #[serde(default = "default_win_rate_weight")]
    pub win_rate_weight: f64,
    /// Weight of the normalized average P&L in the performance score
    #[serde(default = "default_pnl_weight")]
    pub pnl_weight: f64,
    /// Win rate treated as neutral performance
    #[serde(default = "default_neutral_win_rate")]
    pub neutral_win_rate: f64,
}

fn default_baseline() -> f64 {
    1.0
}
fn default_lower() -> f64 {
    0.1
}
fn default_upper() -> f64 {
    2.0
}
fn default_alpha() -> f64 {
    0.3
}
fn default_min_samples() -> usize {
    5
}
fn default_win_rate_weight() -> f64 {
    0.6
}
fn default_pnl_weight() -> f64 {
    0.4
}
fn default_neutral_win_rate() -> f64 {
    0.5
}

impl GateFamilyConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            baseline_multiplier: default_baseline(),
            lower_bound: default_lower(),
            upper_bound: default_upper(),
            alpha: default_alpha(),
            min_samples: default_min_samples(),
            win_rate_weight: default_win_rate_weight(),
            pnl_weight: default_pnl_weight(),
            neutral_win_rate: default_neutral_win_rate(),
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower_bound, self.upper_bound)
    }

    pub fn validate(&self) -> LearnerResult<()> {
        let fail = |reason: String| Err(LearnerError::invalid_config(&self.name, reason));

        if self.name.trim().is_empty() {
            return fail("family name is empty".into());
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return fail(format!("family name '{}' is not a safe file stem", self.name));
        }
        let numbers = [
            self.baseline_multiplier,
            self.lower_bound,
            self.upper_bound,
            self.alpha,
            self.win_rate_weight,
            self.pnl_weight,
            self.neutral_win_rate,
        ];
        if numbers.iter().any(|v| !v.is_finite()) {
            return fail("non-finite numeric setting".into());
        }
        if self.lower_bound <= 0.0 || self.lower_bound > self.upper_bound {
            return fail(format!(
                "bounds [{}, {}] must be positive and ordered",
                self.lower_bound, self.upper_bound
            ));
        }
        if self.baseline_multiplier < self.lower_bound
            || self.baseline_multiplier > self.upper_bound
        {
            return fail(format!(
                "baseline {} outside bounds [{}, {}]",
                self.baseline_multiplier, self.lower_bound, self.upper_bound
            ));
        }
        if self.alpha <= 0.0 || self.alpha > 1.0 {
            return fail(format!("alpha {} must lie in (0, 1]", self.alpha));
        }
        if self.min_samples == 0 {
            return fail("min_samples must be at least 1".into());
        }
        if self.win_rate_weight < 0.0
            || self.pnl_weight < 0.0
            || self.win_rate_weight + self.pnl_weight <= 0.0
        {
            return fail("score weights must be non-negative with a positive sum".into());
        }
        if self.neutral_win_rate <= 0.0 || self.neutral_win_rate >= 1.0 {
            return fail(format!(
                "neutral win rate {} must lie in (0, 1)",
                self.neutral_win_rate
            ));
        }
        Ok(())
    }
}

/// The five gates that size or admit entries
pub fn default_families() -> Vec<GateFamilyConfig> {
    [
        "streak",
        "regime",
        "fee_drag",
        "roi_threshold",
        "intelligence_conflict",
    ]
    .iter()
    .map(|name| GateFamilyConfig::new(name))
    .collect()
}
