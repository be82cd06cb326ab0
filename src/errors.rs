//! Error taxonomy for the learning pipeline
//!
//! Failures are isolated per gate family: none of these abort a whole run.
//! An insufficient sample is not an error, see [`crate::learner::Sufficiency`].

use thiserror::Error;

pub type LearnerResult<T> = std::result::Result<T, LearnerError>;

#[derive(Debug, Error)]
pub enum LearnerError {
    /// Trade store unreachable, or nothing usable in the lookback window.
    #[error("trade data unavailable for {family}: {reason}")]
    DataUnavailable { family: String, reason: String },

    /// Persistence rejected the document after every attempt.
    #[error("store write failed for {family} after {attempts} attempt(s): {reason}")]
    StoreWrite {
        family: String,
        attempts: u32,
        reason: String,
    },

    /// A single trade with malformed gate tagging or outcome values.
    #[error("corrupt trade record {trade_id}: {reason}")]
    CorruptRecord { trade_id: String, reason: String },

    /// A multiplier document that breaks its own invariants.
    #[error("invalid multiplier document for {family}: {reason}")]
    InvalidDocument { family: String, reason: String },

    #[error("invalid gate family config {family}: {reason}")]
    InvalidConfig { family: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl LearnerError {
    pub fn data_unavailable(family: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            family: family.to_string(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(trade_id: &str, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            trade_id: trade_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_document(family: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            family: family.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(family: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            family: family.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether another attempt at the same operation could succeed.
    /// Documents and records that break their invariants fail the same way
    /// every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidDocument { .. } | Self::InvalidConfig { .. } | Self::CorruptRecord { .. }
        )
    }
}
