//! Multi-federation trust, reputation, and advanced-defense data model
//! (spec §4.10, §4.11).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship a source federation declares toward a target (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationRelationship {
    None,
    Peer,
    Parent,
    Child,
    Trusted,
    Allied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationStatus {
    Active,
    Suspended,
    Dissolved,
}

/// A federation's profile one level up from [`hardbound_federation::FederatedTeam`]
/// (spec §4.10 "federation profiles mirror team profiles").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationProfile {
    pub federation_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub status: FederationStatus,
    pub min_team_count: u64,
    pub requires_external_witness: bool,
    pub reputation_score: f64,
    pub active_team_count: u64,
    pub proposal_count: u64,
    pub success_rate: f64,
}

impl FederationProfile {
    pub fn new(federation_id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            federation_id: federation_id.into(),
            name: name.into(),
            created_at: now,
            status: FederationStatus::Active,
            min_team_count: 3,
            requires_external_witness: true,
            reputation_score: 0.5,
            active_team_count: 0,
            proposal_count: 0,
            success_rate: 0.5,
        }
    }
}

/// Directed trust edge between two federations, subject to bootstrap limits
/// (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterFederationTrust {
    pub source_federation_id: String,
    pub target_federation_id: String,
    pub relationship: FederationRelationship,
    pub established_at: DateTime<Utc>,
    pub trust_score: f64,
    pub witness_allowed: bool,
    pub last_interaction: Option<DateTime<Utc>>,
    pub successful_interactions: u64,
    pub failed_interactions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationProposalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationApproval {
    pub approving_teams: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A proposal spanning multiple federations (spec §4.10), with the same
/// veto/weighted state machine as a team [`hardbound_federation::CrossTeamProposal`]
/// generalized one level up, plus severity auto-escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossFederationProposal {
    pub proposal_id: String,
    pub proposing_federation_id: String,
    pub proposing_team_id: String,
    pub affected_federation_ids: Vec<String>,
    pub action_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub status: FederationProposalStatus,
    pub federation_approvals: BTreeMap<String, FederationApproval>,
    pub requires_external_witness: bool,
    pub external_witnesses: Vec<String>,
    /// Effective severity, after auto-escalation per [`crate::federation::action_severity`].
    pub severity: f64,
    /// Effective minimum approval ratio, after auto-escalation.
    pub min_approval_ratio: f64,
}

impl CrossFederationProposal {
    pub fn all_approved(&self) -> bool {
        self.affected_federation_ids
            .iter()
            .all(|f| self.federation_approvals.contains_key(f))
    }

    pub fn has_external_witness(&self) -> bool {
        !self.external_witnesses.is_empty()
    }
}

/// Audit entry recorded when a proposal's declared severity is overridden
/// by the classifier (spec §8 Scenario F: a low-reputation proposer's
/// explicit "low" severity is overridden to "critical").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityOverrideRecord {
    pub proposal_id: String,
    pub requested_severity: f64,
    pub effective_severity: f64,
    pub reason: String,
    pub risk_level: String,
    pub recorded_at: DateTime<Utc>,
}

/// Reputation tier bucket (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationTier {
    Unknown,
    Emerging,
    Established,
    Trusted,
    Exemplary,
}

/// Comprehensive reputation score for a federation (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationScore {
    pub federation_id: String,
    pub global_reputation: f64,
    pub tier: ReputationTier,
    pub incoming_trust_sum: f64,
    pub incoming_trust_count: usize,
    pub presence_weighted_trust: f64,
    pub outgoing_trust_sum: f64,
    pub trust_ratio: f64,
    pub network_centrality: f64,
    pub reputation_age_days: i64,
    pub recent_activity_score: f64,
    pub confidence: f64,
    pub sample_size: usize,
    pub computed_at: DateTime<Utc>,
}

/// An event that feeds the recent-activity component of reputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub federation_id: String,
    pub event_type: String,
    pub magnitude: f64,
    pub source_federation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Overall partition risk classification (spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRisk {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeType {
    Minor,
    Major,
    Critical,
}

/// A federation whose removal would disconnect parts of the trust network
/// (spec §4.11 "bridge scoring via centrality thresholds and alternate-path counts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeNode {
    pub federation_id: String,
    pub bridge_type: BridgeType,
    pub centrality_score: f64,
    pub alternate_paths: usize,
    pub redundancy_score: f64,
}

/// Network-wide resilience snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceReport {
    pub risk_level: PartitionRisk,
    pub bridges: Vec<BridgeNode>,
    pub average_redundancy: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Economic,
    Trust,
    Reputation,
    Availability,
    Governance,
    Security,
}

/// Result of propagating a simulated failure through the trust graph
/// (spec §4.11, damping `0.8^round`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeSimulation {
    pub origin_federation: String,
    pub failure_type: FailureType,
    pub initial_severity: f64,
    pub propagation_rounds: u32,
    pub affected_federations: BTreeMap<String, f64>,
    pub total_network_damage: f64,
    pub propagation_path: Vec<(String, String, f64)>,
    pub recommendations: Vec<String>,
}

/// Federation recovery lifecycle (spec §4.11, exact transitions per
/// `federation_recovery.py`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Active,
    UnderReview,
    Quarantined,
    Recovering,
    Recovered,
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    TrustManipulation,
    SybilAttack,
    GovernanceAbuse,
    DataBreach,
    KeyCompromise,
    Inactivity,
    ProtocolViolation,
    MaliciousActivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIncident {
    pub incident_id: String,
    pub federation_id: String,
    pub incident_type: IncidentType,
    pub severity: f64,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub reported_by: String,
    pub resolved: bool,
}

/// Preserved trust state taken at quarantine time, restored at half-strength
/// on recovery (spec §4.11, `federation_recovery.py::complete_recovery`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub federation_id: String,
    pub quarantine_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub incident_id: String,
    pub outgoing_trust_snapshot: Vec<(String, f64)>,
    pub incoming_trust_snapshot: Vec<(String, f64)>,
    pub recovery_requirements: Vec<String>,
}
