//! Trade history store
//!
//! Durable record of closed trades. The learner only ever reads from it.

mod csv_store;

pub use csv_store::{CsvTradeHistory, TradeRow};

use std::sync::RwLock;

use crate::errors::LearnerResult;
use crate::types::{ClosedTrade, LookbackWindow};

/// Closed trades read for one window
#[derive(Debug, Clone, Default)]
pub struct HistoryBatch {
    pub trades: Vec<ClosedTrade>,
    /// Rows that could not be turned into a `ClosedTrade` and were skipped
    pub corrupt_rows: usize,
}

impl HistoryBatch {
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

/// Read contract: query by time window
pub trait TradeHistory: Send + Sync {
    /// Trades whose exit time falls inside `window`, oldest first
    fn load_window(&self, window: &LookbackWindow) -> LearnerResult<HistoryBatch>;
}

/// History held in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryTradeHistory {
    trades: RwLock<Vec<ClosedTrade>>,
}

impl InMemoryTradeHistory {
    pub fn new(trades: Vec<ClosedTrade>) -> Self {
        Self {
            trades: RwLock::new(trades),
        }
    }

    pub fn push(&self, trade: ClosedTrade) {
        if let Ok(mut trades) = self.trades.write() {
            trades.push(trade);
        }
    }
}

impl TradeHistory for InMemoryTradeHistory {
    fn load_window(&self, window: &LookbackWindow) -> LearnerResult<HistoryBatch> {
        let trades = self.trades.read().unwrap_or_else(|e| e.into_inner());
        let mut selected: Vec<ClosedTrade> = trades
            .iter()
            .filter(|t| window.contains(t.exit_time))
            .cloned()
            .collect();
        selected.sort_by_key(|t| t.exit_time);
        Ok(HistoryBatch {
            trades: selected,
            corrupt_rows: 0,
        })
    }
}
