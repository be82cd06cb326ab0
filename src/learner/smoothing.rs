//! EWMA smoothing between the stored multiplier and a fresh raw target

use crate::config::GateFamilyConfig;

/// `alpha * raw + (1 - alpha) * previous`, written so that `raw == previous`
/// returns `previous` exactly. Clamped to the family's bounds.
pub fn smooth(raw_target: f64, previous: f64, policy: &GateFamilyConfig) -> f64 {
    let next = previous + policy.alpha * (raw_target - previous);
    policy.clamp(next)
}
