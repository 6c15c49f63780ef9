//! Federation registry data model (spec §4.9): team discovery, witnessing,
//! cross-team proposals, and the signed pattern envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A team's standing in the federation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationStatus {
    Active,
    Suspended,
    Revoked,
}

/// A team's public profile in the federation registry (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedTeam {
    pub team_id: String,
    pub name: String,
    pub registered_at: DateTime<Utc>,
    pub status: FederationStatus,

    pub domains: Vec<String>,
    pub capabilities: Vec<String>,

    pub admin_lct: String,
    pub member_count: u64,

    /// LCT of the entity that created this team, for lineage analysis.
    pub creator_lct: String,

    /// Bayesian-smoothed witness reputation in `[0, 1]`.
    pub witness_score: f64,
    pub witness_count: u64,
    pub witness_successes: u64,
    pub witness_failures: u64,
}

impl FederatedTeam {
    pub fn new(team_id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            team_id: team_id.into(),
            name: name.into(),
            registered_at: now,
            status: FederationStatus::Active,
            domains: Vec::new(),
            capabilities: vec!["external_witnessing".to_string()],
            admin_lct: String::new(),
            member_count: 0,
            creator_lct: String::new(),
            witness_score: 1.0,
            witness_count: 0,
            witness_successes: 0,
            witness_failures: 0,
        }
    }
}

/// Outcome of a witnessed proposal, used to update a witness team's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WitnessOutcome {
    Succeeded,
    Failed,
    Reversed,
}

/// One cross-team witnessing event (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessRecord {
    pub witness_team_id: String,
    pub proposal_team_id: String,
    pub witness_lct: String,
    pub proposal_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: Option<WitnessOutcome>,
}

/// Reciprocity metrics between two teams' witnessing history (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReciprocityReport {
    pub team_a: String,
    pub team_b: String,
    pub a_witnesses_b: usize,
    pub b_witnesses_a: usize,
    pub a_total_witnessing: usize,
    pub b_total_witnessing: usize,
    pub reciprocity_ratio: f64,
    pub is_suspicious: bool,
    pub pair_total: usize,
}

/// Overall collusion assessment across the witness graph (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollusionReport {
    pub total_teams: usize,
    pub pairs_analyzed: usize,
    pub flagged_pairs: Vec<ReciprocityReport>,
    pub collusion_ratio: f64,
    pub lineage: LineageReport,
    pub health: String,
}

/// One creator LCT that has registered more than one team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTeamCreator {
    pub creator_lct: String,
    pub team_count: usize,
    pub team_ids: Vec<String>,
}

/// A pair of same-creator teams observed witnessing for each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SameCreatorWitnessPair {
    pub creator_lct: String,
    pub team_a: String,
    pub team_b: String,
    pub witness_events: usize,
    pub reciprocity_ratio: f64,
}

/// Team-creation lineage analysis (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageReport {
    pub multi_team_creators: Vec<MultiTeamCreator>,
    pub same_creator_witness_pairs: Vec<SameCreatorWitnessPair>,
    pub health: String,
}

/// Voting mode for a cross-team proposal (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingMode {
    /// A single rejection blocks the proposal outright.
    Veto,
    /// Reputation-weighted approval ratio against `approval_threshold`.
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossTeamStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossTeamApproval {
    pub approver_lct: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossTeamRejection {
    pub rejector_lct: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// A proposal requiring approval from multiple federation teams (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossTeamProposal {
    pub proposal_id: String,
    pub proposing_team_id: String,
    pub proposer_lct: String,
    pub action_type: String,
    pub description: String,
    pub target_team_ids: Vec<String>,
    pub required_approvals: usize,
    pub parameters: Value,

    pub status: CrossTeamStatus,
    pub approvals: BTreeMap<String, CrossTeamApproval>,
    pub rejections: BTreeMap<String, CrossTeamRejection>,

    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,

    pub require_outsider: bool,
    pub outsider_team_ids: Vec<String>,
    pub has_outsider_approval: bool,

    pub voting_mode: VotingMode,
    pub approval_threshold: f64,
    pub weighted_approval: f64,
    pub weighted_rejection: f64,
}

impl CrossTeamProposal {
    pub fn is_target(&self, team_id: &str) -> bool {
        self.target_team_ids.iter().any(|t| t == team_id)
    }
}

/// Per-approval timing used by [`analyze_approval_timing`](crate::engine::FederationRegistry::analyze_approval_timing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTiming {
    pub team_id: String,
    pub seconds: f64,
}

/// Timing analysis for a single cross-team proposal (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAnalysis {
    pub proposal_id: String,
    pub approval_count: usize,
    pub fastest_approval_seconds: Option<f64>,
    pub average_approval_seconds: Option<f64>,
    pub approval_times: Vec<ApprovalTiming>,
    pub is_suspicious: bool,
    pub reason: String,
}

/// Sweep across all approved cross-team proposals (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAnalysisReport {
    pub total_proposals: usize,
    pub flagged_count: usize,
    pub normal_count: usize,
    pub flagged_proposals: Vec<TemporalAnalysis>,
    pub health: String,
}

/// One detected cycle in the cross-team approval graph (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalCycle {
    pub cycle: Vec<String>,
    pub length: usize,
    pub total_approvals: u64,
    pub avg_per_edge: f64,
    pub balance_ratio: f64,
    pub is_suspicious: bool,
    pub edge_weights: Vec<u64>,
}

/// Cross-team approval-graph cycle sweep (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub total_cycles: usize,
    pub suspicious_cycles: usize,
    pub cycles: Vec<ApprovalCycle>,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub health: String,
}

/// Pairwise approval-reciprocity analysis (spec §4.9, distinct from witness
/// reciprocity: this graphs who approves whose *cross-team proposals*).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalReciprocityReport {
    pub team_a: String,
    pub team_b: String,
    pub a_approves_b: u64,
    pub b_approves_a: u64,
    pub a_total_approvals: u64,
    pub b_total_approvals: u64,
    pub pair_total: u64,
    pub reciprocity_ratio: f64,
    pub a_concentration: f64,
    pub b_concentration: f64,
    pub is_suspicious: bool,
}

/// Federation-wide sweep of [`ApprovalReciprocityReport`]s (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalReciprocitySummary {
    pub total_teams: usize,
    pub pairs_analyzed: usize,
    pub flagged_pairs: Vec<ApprovalReciprocityReport>,
    pub collusion_ratio: f64,
    pub health: String,
}

/// A tamper-evident HMAC-SHA256 seal over a federation analysis result
/// (spec §6 "signed pattern envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPattern {
    pub pattern_type: String,
    pub data: Value,
    pub signer_lct: String,
    pub signed_at: DateTime<Utc>,
    pub signature: String,
    pub algorithm: String,
}
