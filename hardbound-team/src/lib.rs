//! The `Team` aggregate: the only path by which member state changes (spec
//! §3.1, §4.6). Owns its own audit ledger session, heartbeat chain, and
//! policy, and composes `hardbound-trust` for every trust mutation.

pub mod engine;
pub mod sybil;
pub mod types;

pub use engine::Team;
pub use types::{
    HealthReport, Member, SybilCluster, SybilReport, SybilRisk, TeamConfig, TrustStats, WitnessStats,
};
