//! Multi-federation trust bootstrap, reputation aggregation, and the
//! read-only advanced network defenses built on top of a federation
//! registry (spec §4.10, §4.11).

pub mod defenses;
pub mod federation;
pub mod reputation;
pub mod types;

pub use defenses::DefenseLedger;
pub use federation::MultiFederationRegistry;
pub use reputation::ReputationAggregator;
pub use types::{
    BridgeNode, BridgeType, CascadeSimulation, CrossFederationProposal, FailureType,
    FederationApproval, FederationProfile, FederationProposalStatus, FederationRelationship,
    FederationStatus, IncidentType, InterFederationTrust, PartitionRisk, QuarantineRecord,
    RecoveryStatus, ReputationEvent, ReputationScore, ReputationTier, ResilienceReport,
    SecurityIncident,
};
