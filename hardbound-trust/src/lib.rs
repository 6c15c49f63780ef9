//! Per-member trust vector: decay, velocity caps, witnessing, wake
//! recalibration, activity-quality adjustment (spec §4.4).
//!
//! Pure functions only — state lives on the member (owned by
//! `hardbound-team`), the engine here never performs I/O.

pub mod engine;
pub mod types;

pub use engine::{apply_decay, apply_outcome, effective_action_count, wake_recalibrate, witness};
pub use types::{
    ActivityWindow, Dimension, Outcome, ScoredAction, TrustVector, VelocityCounters, WitnessLog, BASELINE,
};
