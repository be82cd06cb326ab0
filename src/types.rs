//! Core types shared by the history store, the learner and the gates
//!
//! Closed trades, their outcomes and the lookback window a pass reads.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Gate family name -> state label observed at entry
pub type GateStates = BTreeMap<String, String>;

/// Separator between `family=state` pairs in the flat tag encoding
const TAG_SEPARATOR: char = ';';

/// A position that has been closed. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: String,
    pub symbol: String,
    /// Strategy tag that opened the position
    pub strategy: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Realized P&L in quote currency
    pub pnl: f64,
    /// Realized return on the position (0.05 = +5%)
    pub roi: f64,
    /// Categorical state each gate was in when the trade was admitted
    #[serde(default)]
    pub gate_states: GateStates,
}

impl ClosedTrade {
    pub fn state_for(&self, family: &str) -> Option<&str> {
        self.gate_states.get(family).map(String::as_str)
    }

    pub fn outcome(&self) -> TradeOutcome {
        TradeOutcome {
            pnl: self.pnl,
            roi: self.roi,
            is_win: self.pnl > 0.0,
        }
    }
}

/// The slice of a closed trade the aggregator consumes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    pub pnl: f64,
    pub roi: f64,
    pub is_win: bool,
}

/// Trailing span of history a learning pass considers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    /// Window of `lookback` ending at `end`. A lookback reaching past the
    /// earliest representable instant starts there instead.
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            start: end
                .checked_sub_signed(lookback)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }

    /// Inclusive on both ends
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Encode gate states as `family=state;family=state`
pub fn encode_gate_states(states: &GateStates) -> String {
    states
        .iter()
        .map(|(family, state)| format!("{}={}", family, state))
        .collect::<Vec<_>>()
        .join(&TAG_SEPARATOR.to_string())
}

/// Parse the flat tag encoding. Empty input is a trade with no gate tags.
pub fn parse_gate_states(raw: &str) -> Result<GateStates, String> {
    let mut states = GateStates::new();
    for pair in raw.split(TAG_SEPARATOR) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (family, state) = pair
            .split_once('=')
            .ok_or_else(|| format!("gate tag '{}' is missing '='", pair))?;
        let family = family.trim();
        if family.is_empty() {
            return Err(format!("gate tag '{}' has no family name", pair));
        }
        if states
            .insert(family.to_string(), state.trim().to_string())
            .is_some()
        {
            return Err(format!("gate family '{}' tagged twice", family));
        }
    }
    Ok(states)
}
