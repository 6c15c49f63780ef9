//! `MultiSigManager`: proposal lifecycle for critical team actions (spec §4.8).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hardbound_core::{GovernanceError, Result};
use hardbound_ledger::AuditStatus;
use hardbound_team::Team;
use serde_json::Value;
use tracing::info;

use crate::types::{CriticalAction, Proposal, ProposalStatus, QuorumRequirement, Vote};

/// The spec's default quorum table (spec §4.8): minimum approvals,
/// per-voter trust floor, trust-weighted quorum sum, and expiry window.
pub fn default_quorum(action: CriticalAction) -> QuorumRequirement {
    match action {
        CriticalAction::AdminTransfer => QuorumRequirement {
            min_approvals: 3,
            trust_threshold: 0.7,
            trust_weighted_quorum: 2.0,
            expiry_hours: 48,
        },
        CriticalAction::PolicyChange => QuorumRequirement {
            min_approvals: 2,
            trust_threshold: 0.6,
            trust_weighted_quorum: 1.5,
            expiry_hours: 24,
        },
        CriticalAction::SecretRotation => QuorumRequirement {
            min_approvals: 2,
            trust_threshold: 0.7,
            trust_weighted_quorum: 1.5,
            expiry_hours: 12,
        },
        CriticalAction::MemberRemoval => QuorumRequirement {
            min_approvals: 2,
            trust_threshold: 0.6,
            trust_weighted_quorum: 1.5,
            expiry_hours: 24,
        },
        CriticalAction::BudgetAllocation => QuorumRequirement {
            min_approvals: 2,
            trust_threshold: 0.5,
            trust_weighted_quorum: 1.0,
            expiry_hours: 24,
        },
        CriticalAction::TeamDissolution => QuorumRequirement {
            min_approvals: 4,
            trust_threshold: 0.8,
            trust_weighted_quorum: 3.0,
            expiry_hours: 72,
        },
    }
}

/// Trust score at/above which a rejection vote vetoes a proposal outright
/// (spec §4.8).
pub const VETO_TRUST_THRESHOLD: f64 = 0.85;

/// Quorum multiplier applied once a conflict of interest is detected
/// (spec §4.8 Scenario D).
pub const CONFLICT_OF_INTEREST_MULTIPLIER: f64 = 1.5;

/// Proposal lifecycle manager for one team's critical actions. All critical
/// operations flow through here: create, vote (with quorum/veto checks),
/// execute (spec §4.8).
pub struct MultiSigManager<'a> {
    team: &'a Team,
    proposals: DashMap<String, Proposal>,
}

fn extract_beneficiaries(action_data: &Value, team: &Team) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    if let Some(recipient) = action_data.get("recipient").and_then(Value::as_str) {
        candidates.push(recipient.to_string());
    }
    if let Some(list) = action_data.get("beneficiaries").and_then(Value::as_array) {
        for v in list {
            if let Some(lct) = v.as_str() {
                candidates.push(lct.to_string());
            }
        }
    }
    candidates.retain(|lct| team.get_member(lct).is_some());
    candidates.sort();
    candidates.dedup();
    candidates
}

impl<'a> MultiSigManager<'a> {
    pub fn new(team: &'a Team) -> Self {
        Self {
            team,
            proposals: DashMap::new(),
        }
    }

    /// Create a new proposal. Validates the proposer, runs conflict-of-
    /// interest detection, and scales the quorum on any detected conflict
    /// (spec §4.8).
    pub async fn create_proposal(
        &self,
        proposer_lct: &str,
        action: CriticalAction,
        action_data: Value,
        description: &str,
    ) -> Result<Proposal> {
        let is_admin = self.team.is_admin(proposer_lct).await;
        let member = self.team.get_member(proposer_lct);
        if !is_admin && member.is_none() {
            return Err(GovernanceError::permission_denied(
                "proposer must be admin or team member",
            ));
        }
        if action.admin_only_to_propose() && !is_admin {
            return Err(GovernanceError::permission_denied(format!(
                "only admin can propose {}",
                action.as_str()
            )));
        }

        let beneficiaries = extract_beneficiaries(&action_data, self.team);
        let mut quorum = default_quorum(action);
        if !beneficiaries.is_empty() {
            quorum.min_approvals =
                ((quorum.min_approvals as f64) * CONFLICT_OF_INTEREST_MULTIPLIER).ceil() as u32;
            quorum.trust_weighted_quorum *= CONFLICT_OF_INTEREST_MULTIPLIER;
        }

        let now = Utc::now();
        let seed = format!("proposal:{}:{}:{}", self.team.team_id, action.as_str(), now.to_rfc3339());
        let hash = hardbound_core::hash::hex_sha256(seed.as_bytes());
        let proposal_id = format!("msig:{}", &hash[..12]);
        let expires_at = now + Duration::hours(quorum.expiry_hours);

        let proposal = Proposal {
            proposal_id: proposal_id.clone(),
            team_id: self.team.team_id.clone(),
            action,
            proposer_lct: proposer_lct.to_string(),
            created_at: now,
            expires_at,
            action_data,
            description: description.to_string(),
            status: ProposalStatus::Pending,
            votes: Vec::new(),
            min_approvals: quorum.min_approvals,
            trust_threshold: quorum.trust_threshold,
            trust_weighted_quorum: quorum.trust_weighted_quorum,
            beneficiaries: beneficiaries.clone(),
            vetoed_by: None,
            executed_at: None,
            executed_by: None,
            execution_result: Value::Null,
        };

        self.proposals.insert(proposal_id.clone(), proposal.clone());

        self.team
            .record_external_audit(
                "multisig_proposal_created",
                Some(proposal_id.clone()),
                serde_json::json!({
                    "action": action.as_str(),
                    "proposer": proposer_lct,
                    "description": description,
                    "beneficiaries": beneficiaries,
                    "min_approvals": quorum.min_approvals,
                    "trust_weighted_quorum": quorum.trust_weighted_quorum,
                    "expires_at": expires_at,
                }),
            )
            .await?;
        info!(proposal = %proposal_id, action = action.as_str(), "multisig proposal created");
        Ok(proposal)
    }

    /// Cast a vote. Enforces pending/non-expired state, voter eligibility,
    /// trust floor, no double-voting, no self-approval, and no beneficiary
    /// voting; applies veto on a high-trust rejection (spec §4.8).
    pub async fn vote(&self, proposal_id: &str, voter_lct: &str, approve: bool, comment: &str) -> Result<Proposal> {
        let now = Utc::now();
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("proposal", proposal_id))?;

        if entry.status != ProposalStatus::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }
        if entry.is_expired(now) {
            entry.status = ProposalStatus::Expired;
            return Err(GovernanceError::invalid_state("not expired", "expired"));
        }

        let is_admin = self.team.is_admin(voter_lct).await;
        let member = self.team.get_member(voter_lct);
        if !is_admin && member.is_none() {
            return Err(GovernanceError::permission_denied("voter must be admin or team member"));
        }
        if voter_lct == entry.proposer_lct {
            return Err(GovernanceError::permission_denied("cannot vote on your own proposal"));
        }
        if entry.is_beneficiary(voter_lct) {
            return Err(GovernanceError::permission_denied(
                "beneficiaries of a proposal may not vote on it",
            ));
        }
        if entry.has_voted(voter_lct) {
            return Err(GovernanceError::invalid_state("no existing vote", "already voted"));
        }

        let trust_score = self
            .team
            .get_member_trust_score(voter_lct)
            .await
            .unwrap_or(0.0);
        if trust_score < entry.trust_threshold {
            return Err(GovernanceError::insufficient(
                "trust",
                entry.trust_threshold.to_string(),
                format!("{trust_score:.2}"),
            ));
        }

        entry.votes.push(Vote {
            voter_lct: voter_lct.to_string(),
            approve,
            trust_score,
            timestamp: now,
            comment: comment.to_string(),
        });

        if !approve && trust_score >= VETO_TRUST_THRESHOLD {
            entry.status = ProposalStatus::Rejected;
            entry.vetoed_by = Some(voter_lct.to_string());
        } else {
            let (reached, _) = entry.check_quorum();
            if reached {
                entry.status = ProposalStatus::Approved;
            }
            let member_count = self.team.member_count().max(1);
            if entry.rejection_count() as usize > member_count / 2 {
                entry.status = ProposalStatus::Rejected;
            }
        }

        let snapshot = entry.clone();
        drop(entry);

        self.team
            .record_external_audit(
                "multisig_vote",
                Some(proposal_id.to_string()),
                serde_json::json!({
                    "voter": voter_lct,
                    "approve": approve,
                    "trust_score": trust_score,
                    "comment": comment,
                    "status": snapshot.status,
                    "approval_count": snapshot.approval_count(),
                    "trust_weighted": snapshot.trust_weighted_approvals(),
                    "vetoed_by": snapshot.vetoed_by,
                }),
            )
            .await?;
        Ok(snapshot)
    }

    /// Execute an approved proposal. The actual mutation (admin transfer,
    /// member removal, ...) is the caller's responsibility via `callback`;
    /// this only gates on approval, records the result, and flips state
    /// (spec §4.8).
    pub async fn execute_proposal<F>(&self, proposal_id: &str, executor_lct: &str, callback: F) -> Result<Proposal>
    where
        F: FnOnce(CriticalAction, &Value) -> std::result::Result<Value, String>,
    {
        let is_admin = self.team.is_admin(executor_lct).await;
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("proposal", proposal_id))?;

        if entry.status != ProposalStatus::Approved {
            return Err(GovernanceError::invalid_state("approved", format!("{:?}", entry.status)));
        }
        if !is_admin {
            return Err(GovernanceError::permission_denied("only admin can execute proposals"));
        }

        let now = Utc::now();
        match callback(entry.action, &entry.action_data) {
            Ok(result) => {
                entry.status = ProposalStatus::Executed;
                entry.execution_result = result;
            }
            Err(error) => {
                entry.status = ProposalStatus::Failed;
                entry.execution_result = serde_json::json!({ "error": error });
            }
        }
        entry.executed_at = Some(now);
        entry.executed_by = Some(executor_lct.to_string());

        let snapshot = entry.clone();
        drop(entry);

        self.team
            .record_external_audit(
                "multisig_executed",
                Some(proposal_id.to_string()),
                serde_json::json!({
                    "executor": executor_lct,
                    "status": snapshot.status,
                    "action": snapshot.action.as_str(),
                    "result": snapshot.execution_result,
                }),
            )
            .await?;
        Ok(snapshot)
    }

    pub fn get_proposal(&self, proposal_id: &str) -> Option<Proposal> {
        self.proposals.get(proposal_id).map(|p| p.clone())
    }

    /// Pending proposals, lazily expiring any whose deadline has passed.
    pub fn get_pending_proposals(&self) -> Vec<Proposal> {
        let now = Utc::now();
        let mut pending = Vec::new();
        for mut entry in self.proposals.iter_mut() {
            if entry.status == ProposalStatus::Pending && entry.is_expired(now) {
                entry.status = ProposalStatus::Expired;
            }
            if entry.status == ProposalStatus::Pending {
                pending.push(entry.clone());
            }
        }
        pending
    }

    pub fn get_proposal_history(&self, limit: usize) -> Vec<Proposal> {
        let mut all: Vec<Proposal> = self.proposals.iter().map(|e| e.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardbound_core::{Lct, Role};
    use hardbound_team::TeamConfig;

    async fn make_team_with_members(n: usize, trust: f64) -> (Team, Vec<String>) {
        let team = Team::create(TeamConfig::new("msig-test")).await.unwrap();
        let mut lcts = Vec::new();
        for i in 0..n {
            let lct = Lct::new_unchecked(format!("web4:soft:member:m{i}"));
            team.add_member(lct.clone(), Role::Developer, Some(100.0)).await.unwrap();
            if trust > 0.5 {
                team.update_member_trust(lct.as_str(), hardbound_trust::Outcome::Success, (trust - 0.5) * 2.0)
                    .await
                    .unwrap();
            }
            lcts.push(lct.as_str().to_string());
        }
        team.set_admin(Lct::new_unchecked("web4:soft:admin:a0")).await.unwrap();
        (team, lcts)
    }

    #[tokio::test]
    async fn budget_allocation_reaches_quorum_on_two_approvals() {
        let (team, members) = make_team_with_members(3, 0.6).await;
        let manager = MultiSigManager::new(&team);
        let proposal = manager
            .create_proposal(
                &members[0],
                CriticalAction::BudgetAllocation,
                serde_json::json!({ "amount": 10.0 }),
                "fund the thing",
            )
            .await
            .unwrap();

        manager.vote(&proposal.proposal_id, &members[1], true, "").await.unwrap();
        let updated = manager.vote(&proposal.proposal_id, &members[2], true, "").await.unwrap();
        assert_eq!(updated.status, ProposalStatus::Approved);
    }

    #[tokio::test]
    async fn conflict_of_interest_raises_quorum_and_blocks_beneficiary_votes() {
        let (team, members) = make_team_with_members(4, 0.8).await;
        let manager = MultiSigManager::new(&team);
        let proposal = manager
            .create_proposal(
                &members[0],
                CriticalAction::BudgetAllocation,
                serde_json::json!({ "recipient": members[0], "beneficiaries": [members[0], members[1]] }),
                "ring allocation",
            )
            .await
            .unwrap();

        assert_eq!(proposal.min_approvals, 3);
        assert!((proposal.trust_weighted_quorum - 1.5).abs() < 1e-9);

        let blocked = manager.vote(&proposal.proposal_id, &members[1], true, "").await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn high_trust_rejection_vetoes_regardless_of_approvals() {
        let (team, members) = make_team_with_members(4, 0.8).await;
        let manager = MultiSigManager::new(&team);
        // Boost member 3 above veto threshold.
        team.update_member_trust(&members[3], hardbound_trust::Outcome::Success, 0.3)
            .await
            .unwrap();

        let proposal = manager
            .create_proposal(
                &members[0],
                CriticalAction::PolicyChange,
                serde_json::json!({}),
                "tighten policy",
            )
            .await
            .unwrap();

        manager.vote(&proposal.proposal_id, &members[1], true, "").await.unwrap();
        let vetoed = manager.vote(&proposal.proposal_id, &members[3], false, "no").await.unwrap();
        assert_eq!(vetoed.status, ProposalStatus::Rejected);
        assert_eq!(vetoed.vetoed_by.as_deref(), Some(members[3].as_str()));
    }
}
