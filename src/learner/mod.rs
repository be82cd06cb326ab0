//! Sizing multiplier learner
//!
//! One parameterized pipeline run per configured gate family:
//! extract gate states -> aggregate per state -> optimize a raw target ->
//! EWMA against the stored value -> merge and persist the family document.
//!
//! Failures are isolated per family. A run always completes and reports
//! what happened to each family in its [`RunSummary`].

pub mod aggregator;
pub mod extractor;
pub mod optimizer;
pub mod smoothing;

pub use aggregator::{aggregate, FamilyBaseline, StateAggregate, Sufficiency};
pub use extractor::{extract, Extraction};
pub use optimizer::MultiplierOptimizer;
pub use smoothing::smooth;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::GateFamilyConfig;
use crate::errors::{LearnerError, LearnerResult};
use crate::history::TradeHistory;
use crate::store::{DocumentStore, LearnedMultiplier, MultiplierDocument};
use crate::types::{ClosedTrade, LookbackWindow};

/// Bounded retry for trade history reads and document writes
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: std::time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: std::time::Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FamilyStatus {
    Succeeded,
    /// No usable trades for the family; its document was not touched
    DataUnavailable { reason: String },
    /// Every write attempt failed; this pass's updates were dropped
    StoreWriteFailed { attempts: u32, reason: String },
    /// Any other isolated failure, e.g. an unreadable stored document
    Failed { reason: String },
}

/// One state's movement in a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub state: String,
    pub sample_size: usize,
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub avg_roi: f64,
    pub previous: f64,
    pub raw_target: f64,
    pub smoothed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyReport {
    pub family: String,
    pub status: FamilyStatus,
    pub trades_considered: usize,
    pub untagged_trades: usize,
    pub corrupt_records: usize,
    /// Ids of the trades counted in `corrupt_records`
    #[serde(default)]
    pub corrupt_trade_ids: Vec<String>,
    /// States persisted this pass (zero unless the write succeeded)
    pub states_updated: usize,
    pub states_skipped: usize,
    pub updates: Vec<StateUpdate>,
}

impl FamilyReport {
    fn new(family: &str) -> Self {
        Self {
            family: family.to_string(),
            status: FamilyStatus::Succeeded,
            trades_considered: 0,
            untagged_trades: 0,
            corrupt_records: 0,
            corrupt_trade_ids: Vec::new(),
            states_updated: 0,
            states_skipped: 0,
            updates: Vec::new(),
        }
    }

    fn unavailable(family: &str, reason: impl Into<String>) -> Self {
        let mut report = Self::new(family);
        report.status = FamilyStatus::DataUnavailable {
            reason: reason.into(),
        };
        report
    }

    pub fn succeeded(&self) -> bool {
        self.status == FamilyStatus::Succeeded
    }
}

/// Structured outcome of a learning run, consumed by logging and reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub lookback_secs: i64,
    pub families_attempted: usize,
    pub families_succeeded: usize,
    pub families_failed: usize,
    pub families_unavailable: usize,
    pub states_updated: usize,
    pub states_skipped: usize,
    /// Distinct corrupt trades across all families, plus unreadable history rows
    pub corrupt_records: usize,
    /// Set when the trade history could not be read after every attempt
    #[serde(default)]
    pub history_error: Option<String>,
    pub families: Vec<FamilyReport>,
}

impl RunSummary {
    pub fn begin(started_at: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: None,
            lookback_secs: lookback.num_seconds(),
            families_attempted: 0,
            families_succeeded: 0,
            families_failed: 0,
            families_unavailable: 0,
            states_updated: 0,
            states_skipped: 0,
            corrupt_records: 0,
            history_error: None,
            families: Vec::new(),
        }
    }

    fn record(&mut self, report: FamilyReport) {
        self.families_attempted += 1;
        match report.status {
            FamilyStatus::Succeeded => self.families_succeeded += 1,
            FamilyStatus::DataUnavailable { .. } => self.families_unavailable += 1,
            FamilyStatus::StoreWriteFailed { .. } | FamilyStatus::Failed { .. } => {
                self.families_failed += 1
            }
        }
        self.states_updated += report.states_updated;
        self.states_skipped += report.states_skipped;
        self.families.push(report);
    }

    pub fn family(&self, name: &str) -> Option<&FamilyReport> {
        self.families.iter().find(|f| f.family == name)
    }

    pub fn failed_families(&self) -> Vec<&str> {
        self.families
            .iter()
            .filter(|f| {
                matches!(
                    f.status,
                    FamilyStatus::StoreWriteFailed { .. } | FamilyStatus::Failed { .. }
                )
            })
            .map(|f| f.family.as_str())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.families_failed == 0 && self.history_error.is_none()
    }

    pub fn digest(&self) -> String {
        format!(
            "run={} families={}/{} ok failed={} no_data={} states_updated={} states_skipped={} corrupt={}",
            &self.run_id[..8.min(self.run_id.len())],
            self.families_succeeded,
            self.families_attempted,
            self.families_failed,
            self.families_unavailable,
            self.states_updated,
            self.states_skipped,
            self.corrupt_records
        )
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

pub struct MultiplierLearner {
    history: Arc<dyn TradeHistory>,
    store: Arc<dyn DocumentStore>,
    families: Vec<GateFamilyConfig>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl MultiplierLearner {
    pub fn new(
        history: Arc<dyn TradeHistory>,
        store: Arc<dyn DocumentStore>,
        families: Vec<GateFamilyConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            history,
            store,
            families,
            retry: RetryPolicy::default(),
            clock,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            attempts: retry.attempts.max(1),
            backoff: retry.backoff,
        };
        self
    }

    pub fn families(&self) -> &[GateFamilyConfig] {
        &self.families
    }

    /// Full learning pass over the trailing `lookback` window
    pub fn run(&self, lookback: Duration) -> RunSummary {
        let started = self.clock.now();
        let window = LookbackWindow::ending_at(started, lookback);
        let mut summary = RunSummary::begin(started, lookback);

        info!(
            run_id = %summary.run_id,
            window = %window,
            families = self.families.len(),
            "🧠 Starting multiplier learning pass"
        );

        let batch = self.retrying("load trade history", || self.history.load_window(&window));
        let mut history_corrupt = 0;
        match &batch {
            Ok(batch) => {
                history_corrupt = batch.corrupt_rows;
                info!(
                    trades = batch.trades.len(),
                    corrupt_rows = batch.corrupt_rows,
                    "Trade history loaded"
                );
            }
            Err((attempts, e)) => {
                error!(
                    attempts,
                    error = %e,
                    "Trade history unavailable, every family is a no-op"
                );
                summary.history_error = Some(format!("after {} attempt(s): {}", attempts, e));
            }
        }

        for policy in &self.families {
            let report = match &batch {
                Ok(batch) => self.learn_family(policy, &batch.trades, started),
                Err((_, e)) => FamilyReport::unavailable(&policy.name, e.to_string()),
            };
            summary.record(report);
        }

        // A trade tagged in several families is counted once
        let distinct_corrupt = summary
            .families
            .iter()
            .flat_map(|f| f.corrupt_trade_ids.iter().map(String::as_str))
            .collect::<BTreeSet<_>>()
            .len();
        summary.corrupt_records = distinct_corrupt + history_corrupt;
        summary.finished_at = Some(self.clock.now());

        if summary.is_clean() {
            info!(summary = %summary.digest(), "✅ Learning pass complete");
        } else {
            warn!(
                summary = %summary.digest(),
                failed = ?summary.failed_families(),
                "Learning pass complete with failures"
            );
        }
        summary
    }

    /// Run the pipeline for one family against an already loaded batch
    pub fn learn_family(
        &self,
        policy: &GateFamilyConfig,
        trades: &[ClosedTrade],
        now: DateTime<Utc>,
    ) -> FamilyReport {
        let family = policy.name.as_str();
        let extraction = extract(trades, family);

        let mut report = FamilyReport::new(family);
        report.untagged_trades = extraction.untagged;
        report.corrupt_records = extraction.corrupt.len();
        for e in &extraction.corrupt {
            warn!(family, error = %e, "Skipping corrupt trade");
            if let LearnerError::CorruptRecord { trade_id, .. } = e {
                report.corrupt_trade_ids.push(trade_id.clone());
            }
        }

        if extraction.is_empty() {
            let reason = LearnerError::data_unavailable(family, "no tagged trades in window");
            info!(family, "No data for gate family, leaving multipliers untouched");
            report.status = FamilyStatus::DataUnavailable {
                reason: reason.to_string(),
            };
            return report;
        }
        report.trades_considered = extraction.pairs.len();

        let mut doc = match self.store.load(policy) {
            Ok(doc) => doc,
            Err(e) => {
                error!(family, error = %e, "Cannot load multiplier document");
                report.status = FamilyStatus::Failed {
                    reason: e.to_string(),
                };
                return report;
            }
        };

        let baseline = FamilyBaseline::from_pairs(&extraction.pairs);
        let groups = aggregate(&extraction.pairs, policy.min_samples);
        let optimizer = MultiplierOptimizer::new(policy);
        let mut learned = Vec::new();

        for group in &groups {
            if !group.is_sufficient() {
                debug!(
                    family,
                    state = %group.state,
                    trades = group.trades,
                    min_samples = policy.min_samples,
                    "insufficient_data"
                );
                report.states_skipped += 1;
                continue;
            }

            let previous = doc
                .get(&group.state)
                .map(|m| policy.clamp(m.value))
                .unwrap_or(policy.baseline_multiplier);
            let raw_target = optimizer.target(group, &baseline);
            let smoothed = smooth(raw_target, previous, policy);

            debug!(
                family,
                state = %group.state,
                trades = group.trades,
                win_rate = group.win_rate(),
                avg_pnl = group.avg_pnl(),
                previous,
                raw_target,
                smoothed,
                "State multiplier learned"
            );

            report.updates.push(StateUpdate {
                state: group.state.clone(),
                sample_size: group.trades,
                win_rate: group.win_rate(),
                avg_pnl: group.avg_pnl(),
                avg_roi: group.avg_roi(),
                previous,
                raw_target,
                smoothed,
            });
            learned.push((
                group.state.clone(),
                LearnedMultiplier {
                    value: smoothed,
                    updated_at: now,
                    sample_size: group.trades,
                },
            ));
        }

        if learned.is_empty() {
            info!(
                family,
                skipped = report.states_skipped,
                "No state had enough trades, nothing to write"
            );
            return report;
        }

        doc.merge(policy, learned, now);
        match self.save_with_retry(&doc) {
            Ok(()) => {
                report.states_updated = report.updates.len();
                info!(
                    family,
                    updated = report.states_updated,
                    skipped = report.states_skipped,
                    "Gate family multipliers updated"
                );
            }
            Err(e) => {
                error!(family, error = %e, "Dropping this pass's updates");
                let (attempts, reason) = match e {
                    LearnerError::StoreWrite {
                        attempts, reason, ..
                    } => (attempts, reason),
                    other => (self.retry.attempts, other.to_string()),
                };
                report.status = FamilyStatus::StoreWriteFailed { attempts, reason };
            }
        }
        report
    }

    fn save_with_retry(&self, doc: &MultiplierDocument) -> LearnerResult<()> {
        let operation = format!("save {} multipliers", doc.family);
        self.retrying(&operation, || self.store.save(doc))
            .map_err(|(attempts, e)| LearnerError::StoreWrite {
                family: doc.family.clone(),
                attempts,
                reason: e.to_string(),
            })
    }

    /// Run `op` up to `retry.attempts` times with a fixed backoff between
    /// attempts. Errors that cannot succeed on another attempt return at once.
    /// On failure, returns the number of attempts made and the last error.
    fn retrying<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> LearnerResult<T>,
    ) -> Result<T, (u32, LearnerError)> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(operation, attempt, attempts, error = %e, "Attempt failed");
                    if attempt >= attempts || !e.is_retryable() {
                        return Err((attempt, e));
                    }
                    if !self.retry.backoff.is_zero() {
                        std::thread::sleep(self.retry.backoff);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
