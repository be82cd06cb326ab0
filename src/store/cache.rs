//! Read side for live gates
//!
//! Gates ask for a multiplier at trade-entry time. Documents are cached per
//! family and reloaded once older than the TTL; staleness up to the TTL is
//! accepted since there is no cross-process invalidation.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use super::{DocumentStore, MultiplierDocument};
use crate::clock::Clock;
use crate::config::GateFamilyConfig;
use crate::errors::LearnerResult;

/// Default reader cache TTL
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

/// Multiplier used for families the reader has no policy for
const UNKNOWN_FAMILY_MULTIPLIER: f64 = 1.0;

/// Result of a gate lookup. `is_learned == false` means `value` is the
/// family's hard-coded default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierLookup {
    pub value: f64,
    pub is_learned: bool,
}

#[derive(Debug, Clone)]
struct CachedDocument {
    doc: Arc<MultiplierDocument>,
    loaded_at: DateTime<Utc>,
}

/// Per-family document cache with a fixed TTL
pub struct MultiplierCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CachedDocument>>,
}

impl MultiplierCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh cached document, if any
    pub fn get(&self, family: &str) -> Option<Arc<MultiplierDocument>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(family)
            .filter(|cached| now - cached.loaded_at < self.ttl)
            .map(|cached| Arc::clone(&cached.doc))
    }

    pub fn insert(&self, doc: MultiplierDocument) -> Arc<MultiplierDocument> {
        let doc = Arc::new(doc);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            doc.family.clone(),
            CachedDocument {
                doc: Arc::clone(&doc),
                loaded_at: self.clock.now(),
            },
        );
        doc
    }

    /// Fresh cached document, or the result of `load` which is cached on success
    pub fn get_or_load<F>(&self, family: &str, load: F) -> LearnerResult<Arc<MultiplierDocument>>
    where
        F: FnOnce() -> LearnerResult<MultiplierDocument>,
    {
        if let Some(doc) = self.get(family) {
            return Ok(doc);
        }
        let doc = load()?;
        debug!(family, states = doc.len(), "Multiplier document (re)loaded");
        Ok(self.insert(doc))
    }

    pub fn invalidate(&self, family: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(family);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

/// Multiplier lookups for live gate evaluation
pub struct GateMultipliers {
    store: Arc<dyn DocumentStore>,
    policies: HashMap<String, GateFamilyConfig>,
    cache: MultiplierCache,
}

impl GateMultipliers {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        families: &[GateFamilyConfig],
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policies: families
                .iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect(),
            cache: MultiplierCache::new(ttl, clock),
        }
    }

    pub fn cache(&self) -> &MultiplierCache {
        &self.cache
    }

    pub fn get(&self, family: &str, state: &str) -> MultiplierLookup {
        let Some(policy) = self.policies.get(family) else {
            debug!(family, "Unknown gate family, using neutral multiplier");
            return MultiplierLookup {
                value: UNKNOWN_FAMILY_MULTIPLIER,
                is_learned: false,
            };
        };
        let fallback = MultiplierLookup {
            value: policy.baseline_multiplier,
            is_learned: false,
        };

        let doc = match self.cache.get_or_load(family, || self.store.load(policy)) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(family, error = %e, "Multiplier document unreadable, using default");
                return fallback;
            }
        };

        match doc.get(state) {
            Some(learned) => MultiplierLookup {
                value: policy.clamp(learned.value),
                is_learned: true,
            },
            None => fallback,
        }
    }

    /// Multiplier value only, falling back to the family default
    pub fn get_multiplier(&self, family: &str, state: &str) -> f64 {
        self.get(family, state).value
    }
}
