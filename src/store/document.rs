//! Persisted multiplier documents
//!
//! One document per gate family, mapping state label to its learned value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::GateFamilyConfig;
use crate::errors::{LearnerError, LearnerResult};

/// A learned multiplier for one (family, state)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedMultiplier {
    pub value: f64,
    pub updated_at: DateTime<Utc>,
    /// Trades backing the last update
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierDocument {
    pub family: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Last successful write, `None` for a document never persisted
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub multipliers: BTreeMap<String, LearnedMultiplier>,
}

impl MultiplierDocument {
    pub fn empty(policy: &GateFamilyConfig) -> Self {
        Self {
            family: policy.name.clone(),
            lower_bound: policy.lower_bound,
            upper_bound: policy.upper_bound,
            updated_at: None,
            multipliers: BTreeMap::new(),
        }
    }

    pub fn get(&self, state: &str) -> Option<&LearnedMultiplier> {
        self.multipliers.get(state)
    }

    pub fn len(&self) -> usize {
        self.multipliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.multipliers.is_empty()
    }

    /// Merge freshly smoothed values. States absent from `updates` keep their
    /// stored value. Bounds follow the current policy; stored values are only
    /// moved when a tightened policy leaves them outside it.
    pub fn merge(
        &mut self,
        policy: &GateFamilyConfig,
        updates: impl IntoIterator<Item = (String, LearnedMultiplier)>,
        at: DateTime<Utc>,
    ) {
        self.lower_bound = policy.lower_bound;
        self.upper_bound = policy.upper_bound;
        for learned in self.multipliers.values_mut() {
            learned.value = policy.clamp(learned.value);
        }
        for (state, learned) in updates {
            self.multipliers.insert(state, learned);
        }
        self.updated_at = Some(at);
    }

    pub fn validate(&self) -> LearnerResult<()> {
        let fail = |reason: String| Err(LearnerError::invalid_document(&self.family, reason));

        if self.family.trim().is_empty() {
            return fail("family name is empty".into());
        }
        if !self.lower_bound.is_finite()
            || !self.upper_bound.is_finite()
            || self.lower_bound > self.upper_bound
        {
            return fail(format!(
                "bounds [{}, {}] are not finite and ordered",
                self.lower_bound, self.upper_bound
            ));
        }
        for (state, learned) in &self.multipliers {
            if state.trim().is_empty() {
                return fail("empty state label".into());
            }
            if !learned.value.is_finite() {
                return fail(format!("state {} has non-finite value", state));
            }
            if learned.value < self.lower_bound || learned.value > self.upper_bound {
                return fail(format!(
                    "state {} value {} outside [{}, {}]",
                    state, learned.value, self.lower_bound, self.upper_bound
                ));
            }
        }
        Ok(())
    }
}
