//! Versioned rule set mapping action type to permission/cost/approval
//! requirements (spec §4.5).

pub mod engine;
pub mod types;

pub use engine::{default_rules, PolicyStore};
pub use types::{ApprovalMode, Policy, PolicyRule};
