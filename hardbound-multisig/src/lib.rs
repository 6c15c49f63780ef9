//! Multi-sig proposal state machine for critical team actions (spec §4.8):
//! quorum, trust-weighted voting, conflict-of-interest detection, veto.

pub mod engine;
pub mod types;

pub use engine::{default_quorum, MultiSigManager, CONFLICT_OF_INTEREST_MULTIPLIER, VETO_TRUST_THRESHOLD};
pub use types::{CriticalAction, Proposal, ProposalStatus, QuorumRequirement, Vote};
