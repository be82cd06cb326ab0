//! Gate Learner Library
//!
//! Turns closed-trade outcomes into bounded, smoothed multipliers that
//! trade-entry gates consult before admitting or sizing a position.

pub mod clock;
pub mod config;
pub mod errors;
pub mod history;
pub mod learner;
pub mod scheduler;
pub mod store;
pub mod types;
