//! Per-team metabolic heartbeat chain (spec §4.2): block production,
//! transaction pooling, and the metabolic state machine.

pub mod engine;
pub mod types;

pub use engine::HeartbeatLedger;
pub use types::{Block, ChainVerification, MetabolicHealth, MetabolicTransition, Transaction};
