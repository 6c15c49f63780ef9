//! Multi-sig proposal data model (spec §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions gated by multi-sig approval rather than single-party policy
/// (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalAction {
    AdminTransfer,
    PolicyChange,
    SecretRotation,
    MemberRemoval,
    BudgetAllocation,
    TeamDissolution,
}

impl CriticalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriticalAction::AdminTransfer => "admin_transfer",
            CriticalAction::PolicyChange => "policy_change",
            CriticalAction::SecretRotation => "secret_rotation",
            CriticalAction::MemberRemoval => "member_removal",
            CriticalAction::BudgetAllocation => "budget_allocation",
            CriticalAction::TeamDissolution => "team_dissolution",
        }
    }

    /// Actions only the team admin may propose (spec §4.8).
    pub fn admin_only_to_propose(&self) -> bool {
        matches!(self, CriticalAction::TeamDissolution | CriticalAction::AdminTransfer)
    }
}

/// One action's quorum requirement (spec §4.8 table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuorumRequirement {
    pub min_approvals: u32,
    pub trust_threshold: f64,
    pub trust_weighted_quorum: f64,
    pub expiry_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Executed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter_lct: String,
    pub approve: bool,
    pub trust_score: f64,
    pub timestamp: DateTime<Utc>,
    pub comment: String,
}

/// A multi-sig proposal for a critical action (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub team_id: String,
    pub action: CriticalAction,
    pub proposer_lct: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    pub action_data: Value,
    pub description: String,

    pub status: ProposalStatus,
    pub votes: Vec<Vote>,

    pub min_approvals: u32,
    pub trust_threshold: f64,
    pub trust_weighted_quorum: f64,

    /// Members flagged by conflict-of-interest detection (spec §4.8): the
    /// `action_data.recipient` field and any `action_data.beneficiaries`
    /// list, intersected with current team membership. A non-empty list
    /// multiplies both quorum requirements by 1.5.
    pub beneficiaries: Vec<String>,

    /// Set when a trust ≥ 0.85 member casts a vetoing rejection (spec
    /// §4.8): the proposal finalizes to `rejected` regardless of the
    /// approval tally.
    pub vetoed_by: Option<String>,

    pub executed_at: Option<DateTime<Utc>>,
    pub executed_by: Option<String>,
    pub execution_result: Value,
}

impl Proposal {
    pub fn approval_count(&self) -> u32 {
        self.votes.iter().filter(|v| v.approve).count() as u32
    }

    pub fn rejection_count(&self) -> u32 {
        self.votes.iter().filter(|v| !v.approve).count() as u32
    }

    pub fn trust_weighted_approvals(&self) -> f64 {
        self.votes.iter().filter(|v| v.approve).map(|v| v.trust_score).sum()
    }

    pub fn has_voted(&self, lct: &str) -> bool {
        self.votes.iter().any(|v| v.voter_lct == lct)
    }

    pub fn is_beneficiary(&self, lct: &str) -> bool {
        self.beneficiaries.iter().any(|b| b == lct)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// `(reached, reason)` — both the flat count and the trust-weighted sum
    /// must clear the bar (spec §4.8).
    pub fn check_quorum(&self) -> (bool, String) {
        let approvals = self.approval_count();
        if approvals < self.min_approvals {
            return (
                false,
                format!("need {} approvals, have {approvals}", self.min_approvals),
            );
        }
        let weighted = self.trust_weighted_approvals();
        if weighted < self.trust_weighted_quorum {
            return (
                false,
                format!(
                    "need trust-weighted quorum {:.2}, have {weighted:.2}",
                    self.trust_weighted_quorum
                ),
            );
        }
        (true, "quorum reached".to_string())
    }
}
