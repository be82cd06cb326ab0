//! History of learning run summaries, newest last

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::write_atomic;
use crate::errors::LearnerResult;
use crate::learner::RunSummary;

pub struct RunLog {
    path: PathBuf,
    keep: usize,
}

impl RunLog {
    pub fn new(dir: impl AsRef<Path>, keep: usize) -> Self {
        Self {
            path: dir.as_ref().join("learner_runs.json"),
            keep: keep.max(1),
        }
    }

    pub fn append(&self, summary: &RunSummary) -> LearnerResult<()> {
        let mut history = self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Run log unreadable, starting a new one");
            Vec::new()
        });

        history.push(summary.clone());
        if history.len() > self.keep {
            let excess = history.len() - self.keep;
            history.drain(..excess);
        }

        let json = serde_json::to_string_pretty(&history)?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn load(&self) -> LearnerResult<Vec<RunSummary>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
