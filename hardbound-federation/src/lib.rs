//! Cross-team discovery, witnessing, and collusion-resistant federation
//! registry (spec §4.9).

pub mod engine;
pub mod types;

pub use engine::{FederationRegistry, MAX_RECIPROCITY_RATIO, MIN_WITNESS_SCORE, RECIPROCITY_WINDOW};
pub use types::{
    ApprovalCycle, ApprovalReciprocityReport, ApprovalReciprocitySummary, ApprovalTiming,
    CollusionReport, CrossTeamApproval, CrossTeamProposal, CrossTeamRejection, CrossTeamStatus,
    CycleReport, FederatedTeam, FederationStatus, LineageReport, MultiTeamCreator,
    ReciprocityReport, SameCreatorWitnessPair, SignedPattern, TemporalAnalysis,
    TemporalAnalysisReport, VotingMode, WitnessOutcome, WitnessRecord,
};
