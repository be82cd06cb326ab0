//! Nightly trigger for the learning pass

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::learner::{MultiplierLearner, RunSummary};
use crate::store::RunLog;

/// Next time strictly after `now` at `hour:00` UTC
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Run one pass off the async runtime and append it to the run log
pub async fn run_once(
    learner: Arc<MultiplierLearner>,
    run_log: Arc<RunLog>,
    lookback: Duration,
) -> anyhow::Result<RunSummary> {
    let summary = tokio::task::spawn_blocking(move || {
        let summary = learner.run(lookback);
        if let Err(e) = run_log.append(&summary) {
            error!(error = %e, "Failed to append run log");
        }
        summary
    })
    .await?;
    Ok(summary)
}

/// Run nightly at `hour` UTC until `shutdown` flips to true
pub async fn run_nightly(
    learner: Arc<MultiplierLearner>,
    run_log: Arc<RunLog>,
    lookback: Duration,
    hour: u32,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        let now = Utc::now();
        let next = next_run_after(now, hour);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "⏰ Next learning pass scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                run_once(Arc::clone(&learner), Arc::clone(&run_log), lookback).await?;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Scheduler stopping");
                    return Ok(());
                }
            }
        }
    }
}
