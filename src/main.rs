//! gate-learner
//!
//! Usage:
//!   gate-learner                      run one learning pass and exit
//!   gate-learner --daemon             run nightly at learner.run_at_utc_hour
//!   gate-learner --lookback-days N    override the lookback window

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gate_learner::clock::SystemClock;
use gate_learner::config::{AppConfig, MAX_LOOKBACK_DAYS};
use gate_learner::history::CsvTradeHistory;
use gate_learner::learner::{MultiplierLearner, RetryPolicy};
use gate_learner::scheduler;
use gate_learner::store::{JsonFileStore, RunLog};

struct CliArgs {
    daemon: bool,
    lookback_days: Option<i64>,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = CliArgs {
        daemon: false,
        lookback_days: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--daemon" => args.daemon = true,
            "--lookback-days" => {
                let value = iter.next().context("--lookback-days needs a value")?;
                let days: i64 = value
                    .parse()
                    .with_context(|| format!("invalid --lookback-days '{}'", value))?;
                if days <= 0 || days > MAX_LOOKBACK_DAYS {
                    bail!("--lookback-days must be between 1 and {}", MAX_LOOKBACK_DAYS);
                }
                args.lookback_days = Some(days);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(args)
}

fn init_logging(cfg: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    if cfg.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let mut cfg = AppConfig::load()?;
    if let Some(days) = args.lookback_days {
        cfg.learner.lookback_days = days;
        cfg.validate()?;
    }
    init_logging(&cfg);
    info!(config = %cfg.digest(), "Gate learner starting");

    let learner = Arc::new(
        MultiplierLearner::new(
            Arc::new(CsvTradeHistory::new(&cfg.history.data_dir)),
            Arc::new(JsonFileStore::new(&cfg.store.dir)),
            cfg.families.clone(),
            Arc::new(SystemClock),
        )
        .with_retry(RetryPolicy {
            attempts: cfg.store.write_attempts,
            backoff: std::time::Duration::from_millis(cfg.store.write_backoff_ms),
        }),
    );
    let run_log = Arc::new(RunLog::new(&cfg.store.dir, cfg.store.run_log_keep));

    if !args.daemon {
        let summary = scheduler::run_once(learner, run_log, cfg.lookback()).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        if !summary.is_clean() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler::run_nightly(
        learner,
        run_log,
        cfg.lookback(),
        cfg.learner.run_at_utc_hour,
        shutdown_rx,
    )
    .await
}
