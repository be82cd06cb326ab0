//! Configuration management for the gate learner
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;

use crate::store::DEFAULT_CACHE_TTL_SECS;

/// Longest trailing window a pass may look back over (ten years)
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub learner: LearnerConfig,
    pub history: HistoryConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    /// Gate families learned on every pass
    #[serde(default = "default_families")]
    pub families: Vec<GateFamilyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LearnerConfig {
    /// Trailing window of closed trades per pass, in days
    pub lookback_days: i64,
    /// UTC hour at which the nightly pass runs in daemon mode
    pub run_at_utc_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Directory holding trades/closed_trades_YYYY-MM-DD.csv
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one multiplier document per family
    pub dir: String,
    /// Reader cache TTL in seconds
    pub cache_ttl_secs: i64,
    /// Attempts per document write before the family is dropped for the pass
    pub write_attempts: u32,
    /// Fixed delay between write attempts in milliseconds
    pub write_backoff_ms: u64,
    /// Run summaries kept in the run log
    pub run_log_keep: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Learner defaults
            .set_default("learner.lookback_days", 7)?
            .set_default("learner.run_at_utc_hour", 2)?
            // History defaults
            .set_default("history.data_dir", "./data")?
            // Store defaults
            .set_default("store.dir", "./data/multipliers")?
            .set_default("store.cache_ttl_secs", DEFAULT_CACHE_TTL_SECS)?
            .set_default("store.write_attempts", 3)?
            .set_default("store.write_backoff_ms", 250)?
            .set_default("store.run_log_keep", 100)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (GATE_LEARNER__*)
            .add_source(
                Environment::with_prefix("GATE_LEARNER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject configs the learner cannot run safely
    pub fn validate(&self) -> Result<()> {
        if self.learner.lookback_days <= 0 || self.learner.lookback_days > MAX_LOOKBACK_DAYS {
            bail!(
                "learner.lookback_days must be between 1 and {}, got {}",
                MAX_LOOKBACK_DAYS,
                self.learner.lookback_days
            );
        }
        if self.learner.run_at_utc_hour > 23 {
            bail!("learner.run_at_utc_hour must be 0-23");
        }
        if self.store.write_attempts == 0 {
            bail!("store.write_attempts must be at least 1");
        }
        if self.store.cache_ttl_secs <= 0 {
            bail!("store.cache_ttl_secs must be positive");
        }
        if self.families.is_empty() {
            bail!("no gate families configured");
        }

        let mut seen = HashSet::new();
        for family in &self.families {
            family
                .validate()
                .with_context(|| format!("gate family '{}'", family.name))?;
            if !seen.insert(family.name.as_str()) {
                bail!("gate family '{}' configured twice", family.name);
            }
        }
        Ok(())
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.learner.lookback_days)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.store.cache_ttl_secs)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "lookback={}d families={:?} store={} history={} attempts={}",
            self.learner.lookback_days,
            self.families.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            self.store.dir,
            self.history.data_dir,
            self.store.write_attempts
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
