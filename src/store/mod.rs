//! Multiplier store
//!
//! Write side used by the nightly learner, read side used by live gates.
//! Documents are replaced atomically so a reader sees either the previous
//! document or the new one, never a partial write.

mod cache;
mod document;
mod file;
mod run_log;

pub use cache::{GateMultipliers, MultiplierCache, MultiplierLookup, DEFAULT_CACHE_TTL_SECS};
pub use document::{LearnedMultiplier, MultiplierDocument};
pub use file::JsonFileStore;
pub use run_log::RunLog;

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::GateFamilyConfig;
use crate::errors::LearnerResult;

/// Durable key-value persistence, one document per gate family
#[cfg_attr(test, mockall::automock)]
pub trait DocumentStore: Send + Sync {
    /// Load the family's document. A family never written yields an empty
    /// document, not an error.
    fn load(&self, policy: &GateFamilyConfig) -> LearnerResult<MultiplierDocument>;

    /// Replace the family's document as a whole
    fn save(&self, doc: &MultiplierDocument) -> LearnerResult<()>;
}

/// Write `bytes` to a uniquely named temp file beside `path`, then rename it
/// over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> LearnerResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    Ok(result?)
}
