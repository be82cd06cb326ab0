//! Gate state extraction
//!
//! Pulls the `(state, outcome)` pairs for one gate family out of a batch of
//! closed trades. Untagged trades are excluded rather than pooled into an
//! "unknown" state.

use tracing::debug;

use crate::errors::LearnerError;
use crate::types::{ClosedTrade, TradeOutcome};

/// Longest state label accepted from a trade tag
pub const MAX_STATE_LABEL_LEN: usize = 64;

#[derive(Debug, Default)]
pub struct Extraction {
    pub pairs: Vec<(String, TradeOutcome)>,
    /// Trades without a tag for the family
    pub untagged: usize,
    /// Trades skipped for malformed tagging or outcome values
    pub corrupt: Vec<LearnerError>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn check_label(label: &str) -> Result<(), String> {
    if label.trim().is_empty() {
        return Err("blank state label".into());
    }
    if label.chars().count() > MAX_STATE_LABEL_LEN {
        return Err(format!("state label longer than {} chars", MAX_STATE_LABEL_LEN));
    }
    if label.chars().any(char::is_control) {
        return Err("state label contains control characters".into());
    }
    Ok(())
}

pub fn extract(trades: &[ClosedTrade], family: &str) -> Extraction {
    let mut out = Extraction::default();

    for trade in trades {
        let Some(label) = trade.state_for(family) else {
            out.untagged += 1;
            continue;
        };
        if let Err(reason) = check_label(label) {
            out.corrupt.push(LearnerError::corrupt(
                &trade.trade_id,
                format!("{}: {}", family, reason),
            ));
            continue;
        }
        if !trade.pnl.is_finite() || !trade.roi.is_finite() {
            out.corrupt
                .push(LearnerError::corrupt(&trade.trade_id, "non-finite pnl or roi"));
            continue;
        }
        out.pairs.push((label.trim().to_string(), trade.outcome()));
    }

    debug!(
        family,
        tagged = out.pairs.len(),
        untagged = out.untagged,
        corrupt = out.corrupt.len(),
        "Extracted gate states"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GateStates;
    use chrono::Utc;

    fn trade(id: &str, tags: &[(&str, &str)], pnl: f64) -> ClosedTrade {
        let now = Utc::now();
        ClosedTrade {
            trade_id: id.into(),
            symbol: "SOL".into(),
            strategy: "mean_reversion".into(),
            entry_time: now,
            exit_time: now,
            pnl,
            roi: pnl / 100.0,
            gate_states: tags
                .iter()
                .map(|(f, s)| (f.to_string(), s.to_string()))
                .collect::<GateStates>(),
        }
    }

    #[test]
    fn test_extract_skips_untagged() {
        let trades = vec![
            trade("a", &[("streak", "loss_streak_3")], -1.0),
            trade("b", &[("regime", "match")], 2.0),
            trade("c", &[("streak", "win_streak_1"), ("regime", "mismatch")], 0.5),
        ];

        let out = extract(&trades, "streak");
        assert_eq!(out.untagged, 1);
        assert!(out.corrupt.is_empty());
        let labels: Vec<_> = out.pairs.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(labels, vec!["loss_streak_3", "win_streak_1"]);
        assert!(!out.pairs[0].1.is_win);
        assert!(out.pairs[1].1.is_win);
    }

    #[test]
    fn test_extract_counts_corrupt_individually() {
        let long = "x".repeat(MAX_STATE_LABEL_LEN + 1);
        let trades = vec![
            trade("blank", &[("streak", "  ")], 1.0),
            trade("long", &[("streak", long.as_str())], 1.0),
            trade("ctrl", &[("streak", "loss\u{7}")], 1.0),
            trade("nan", &[("streak", "loss_streak_1")], f64::NAN),
            trade("ok", &[("streak", "loss_streak_1")], 1.0),
        ];

        let out = extract(&trades, "streak");
        assert_eq!(out.corrupt.len(), 4);
        assert_eq!(out.pairs.len(), 1);
        assert!(out
            .corrupt
            .iter()
            .all(|e| matches!(e, LearnerError::CorruptRecord { .. })));
    }

    #[test]
    fn test_extract_empty() {
        let out = extract(&[], "regime");
        assert!(out.is_empty());
        assert_eq!(out.untagged, 0);
    }
}
