//! CSV-backed trade history
//!
//! One file per exit day: `<data_dir>/trades/closed_trades_YYYY-MM-DD.csv`.
//! Gate states are flattened to `family=state;family=state` in a single column.

use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::{HistoryBatch, TradeHistory};
use crate::errors::{LearnerError, LearnerResult};
use crate::types::{encode_gate_states, parse_gate_states, ClosedTrade, LookbackWindow};

/// Flat CSV row for a closed trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    pub trade_id: String,
    pub symbol: String,
    pub strategy: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl: f64,
    pub roi: f64,
    #[serde(default)]
    pub gate_states: String,
}

impl From<&ClosedTrade> for TradeRow {
    fn from(trade: &ClosedTrade) -> Self {
        Self {
            trade_id: trade.trade_id.clone(),
            symbol: trade.symbol.clone(),
            strategy: trade.strategy.clone(),
            entry_time: trade.entry_time,
            exit_time: trade.exit_time,
            pnl: trade.pnl,
            roi: trade.roi,
            gate_states: encode_gate_states(&trade.gate_states),
        }
    }
}

impl TryFrom<TradeRow> for ClosedTrade {
    type Error = LearnerError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        if row.trade_id.trim().is_empty() {
            return Err(LearnerError::corrupt("<blank>", "empty trade id"));
        }
        if row.exit_time < row.entry_time {
            return Err(LearnerError::corrupt(&row.trade_id, "exit before entry"));
        }
        let gate_states = parse_gate_states(&row.gate_states)
            .map_err(|reason| LearnerError::corrupt(&row.trade_id, reason))?;

        Ok(ClosedTrade {
            trade_id: row.trade_id,
            symbol: row.symbol,
            strategy: row.strategy,
            entry_time: row.entry_time,
            exit_time: row.exit_time,
            pnl: row.pnl,
            roi: row.roi,
            gate_states,
        })
    }
}

pub struct CsvTradeHistory {
    trades_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvTradeHistory {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            trades_dir: data_dir.as_ref().join("trades"),
            write_lock: Mutex::new(()),
        }
    }

    fn day_file(&self, day: NaiveDate) -> PathBuf {
        self.trades_dir
            .join(format!("closed_trades_{}.csv", day.format("%Y-%m-%d")))
    }

    /// Exit day encoded in a `closed_trades_YYYY-MM-DD.csv` file name
    fn day_of(file_name: &str) -> Option<NaiveDate> {
        let stem = file_name
            .strip_prefix("closed_trades_")?
            .strip_suffix(".csv")?;
        NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
    }

    /// Append a closed trade to its exit day's file
    pub fn record(&self, trade: &ClosedTrade) -> LearnerResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        fs::create_dir_all(&self.trades_dir)?;

        let path = self.day_file(trade.exit_time.date_naive());
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);
        writer.serialize(TradeRow::from(trade))?;
        writer.flush()?;
        Ok(())
    }

    fn read_day(
        &self,
        path: &Path,
        window: &LookbackWindow,
        batch: &mut HistoryBatch,
    ) -> LearnerResult<()> {
        let file = fs::File::open(path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        for (line, result) in reader.deserialize::<TradeRow>().enumerate() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        line = line + 2,
                        error = %e,
                        "Skipping unreadable trade row"
                    );
                    batch.corrupt_rows += 1;
                    continue;
                }
            };
            if !window.contains(row.exit_time) {
                continue;
            }
            match ClosedTrade::try_from(row) {
                Ok(trade) => batch.trades.push(trade),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping corrupt trade row");
                    batch.corrupt_rows += 1;
                }
            }
        }
        Ok(())
    }
}

impl TradeHistory for CsvTradeHistory {
    fn load_window(&self, window: &LookbackWindow) -> LearnerResult<HistoryBatch> {
        let mut batch = HistoryBatch::default();

        if !self.trades_dir.exists() {
            warn!(dir = %self.trades_dir.display(), "Trade history directory missing");
            return Ok(batch);
        }

        let first_day = window.start.date_naive();
        let last_day = window.end.date_naive();
        let mut day_files: Vec<(NaiveDate, PathBuf)> = fs::read_dir(&self.trades_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let day = Self::day_of(&entry.file_name().to_string_lossy())?;
                Some((day, entry.path()))
            })
            .filter(|(day, _)| *day >= first_day && *day <= last_day)
            .collect();
        day_files.sort();

        for (_, path) in &day_files {
            self.read_day(path, window, &mut batch)?;
        }

        batch.trades.sort_by_key(|t| t.exit_time);
        debug!(
            trades = batch.trades.len(),
            corrupt = batch.corrupt_rows,
            window = %window,
            "Loaded trade history"
        );
        Ok(batch)
    }
}
