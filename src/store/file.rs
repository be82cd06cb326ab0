//! JSON file store: `<dir>/<family>_multipliers.json`

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{write_atomic, DocumentStore, MultiplierDocument};
use crate::config::GateFamilyConfig;
use crate::errors::{LearnerError, LearnerResult};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, family: &str) -> PathBuf {
        self.dir.join(format!("{}_multipliers.json", family))
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self, policy: &GateFamilyConfig) -> LearnerResult<MultiplierDocument> {
        let path = self.path_for(&policy.name);
        if !path.exists() {
            debug!(family = %policy.name, "No multiplier document yet, starting empty");
            return Ok(MultiplierDocument::empty(policy));
        }

        let json = fs::read_to_string(&path)?;
        let doc: MultiplierDocument = serde_json::from_str(&json)?;
        if doc.family != policy.name {
            return Err(LearnerError::invalid_document(
                &policy.name,
                format!("{} holds family '{}'", path.display(), doc.family),
            ));
        }
        doc.validate()?;
        Ok(doc)
    }

    fn save(&self, doc: &MultiplierDocument) -> LearnerResult<()> {
        doc.validate()?;
        let json = serde_json::to_string_pretty(doc)?;
        let path = self.path_for(&doc.family);
        write_atomic(&path, json.as_bytes())?;
        info!(
            family = %doc.family,
            states = doc.len(),
            "💾 Multipliers saved to {}",
            path.display()
        );
        Ok(())
    }
}
