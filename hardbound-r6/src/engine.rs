//! `R6Workflow`: request/approve/execute lifecycle for governed actions
//! (spec §4.7), with optional delegation to a linked multi-sig proposal.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use hardbound_core::{GovernanceError, Result};
use hardbound_policy::{ApprovalMode, Policy};
use hardbound_team::Team;
use hardbound_trust::Outcome;
use serde_json::Value;
use tracing::{info, warn};

use crate::types::{R6Request, R6Response, R6Status, DEFAULT_EXPIRY_HOURS};

/// Maps an R6 `action_type` to the `CriticalAction` it delegates to when
/// the policy rule's approval mode is `multi_sig` (spec §4.7, `r6.py`'s
/// `MULTISIG_ACTION_MAP`).
fn critical_action_for(action_type: &str) -> Option<hardbound_multisig::CriticalAction> {
    use hardbound_multisig::CriticalAction::*;
    match action_type {
        "admin_transfer" => Some(AdminTransfer),
        "policy_change" => Some(PolicyChange),
        "secret_rotation" => Some(SecretRotation),
        "member_removal" => Some(MemberRemoval),
        "budget_allocation" => Some(BudgetAllocation),
        "team_dissolution" => Some(TeamDissolution),
        _ => None,
    }
}

/// Per-team R6 request lifecycle manager. Completed requests stay in the
/// table (status distinguishes them) rather than being deleted, so
/// `get_request_history` has something to return — mirroring how
/// `hardbound_multisig::MultiSigManager` keeps terminal proposals around.
pub struct R6Workflow<'a> {
    team: &'a Team,
    multisig: Option<&'a hardbound_multisig::MultiSigManager<'a>>,
    requests: DashMap<String, R6Request>,
}

impl<'a> R6Workflow<'a> {
    pub fn new(team: &'a Team, multisig: Option<&'a hardbound_multisig::MultiSigManager<'a>>) -> Self {
        Self {
            team,
            multisig,
            requests: DashMap::new(),
        }
    }

    /// Create a new R6 request: validates membership and permission against
    /// the given policy, then — if the matched rule is multi-sig and the
    /// action type maps to a `CriticalAction` — spawns and links a proposal
    /// (spec §4.7).
    #[allow(clippy::too_many_arguments)]
    pub async fn create_request(
        &self,
        policy: &Policy,
        requester_lct: &str,
        action_type: &str,
        description: &str,
        target: &str,
        parameters: Option<Value>,
        reference_type: &str,
        reference_id: &str,
        reference_data: Option<Value>,
    ) -> Result<R6Request> {
        let member = self
            .team
            .get_member(requester_lct)
            .ok_or_else(|| GovernanceError::not_found("member", requester_lct))?;

        let rule = policy
            .get_rule(action_type)
            .ok_or_else(|| GovernanceError::validation("action_type", format!("no policy rule for '{action_type}'")))?
            .clone();

        let trust_score = self.team.get_member_trust_score(requester_lct).await.unwrap_or(0.0);
        let atp_available = self.team.get_member_atp(requester_lct);

        let (permitted, reason, _) =
            policy.check_permission(action_type, member.role, trust_score, atp_available);
        if !permitted {
            return Err(GovernanceError::permission_denied(reason));
        }

        let now = Utc::now();
        let seed = format!("{}:{}:{}", self.team.team_id, requester_lct, now.to_rfc3339());
        let hash = hardbound_core::hash::hex_sha256(seed.as_bytes());
        let r6_id = format!("r6:{}", &hash[..12]);

        let mut request = R6Request {
            r6_id: r6_id.clone(),
            team_id: self.team.team_id.clone(),
            requester_lct: requester_lct.to_string(),
            created_at: now,
            expires_at: now + Duration::hours(DEFAULT_EXPIRY_HOURS),
            action_type: action_type.to_string(),
            policy_version: policy.version,
            requester_role: member.role.as_str().to_string(),
            requester_trust: trust_score,
            description: description.to_string(),
            target: target.to_string(),
            parameters: parameters.clone().unwrap_or(Value::Object(Default::default())),
            reference_type: reference_type.to_string(),
            reference_id: reference_id.to_string(),
            reference_data: reference_data.unwrap_or(Value::Object(Default::default())),
            atp_cost: rule.atp_cost,
            status: R6Status::Pending,
            approvals: Vec::new(),
            rejections: Vec::new(),
            linked_proposal_id: None,
        };

        if rule.approval == ApprovalMode::MultiSig {
            if let (Some(multisig), Some(critical_action)) =
                (self.multisig, critical_action_for(action_type))
            {
                match multisig
                    .create_proposal(
                        requester_lct,
                        critical_action,
                        parameters.unwrap_or(Value::Object(Default::default())),
                        &format!("[R6:{r6_id}] {description}"),
                    )
                    .await
                {
                    Ok(proposal) => request.linked_proposal_id = Some(proposal.proposal_id),
                    Err(err) => warn!(r6_id, %err, "linked multi-sig proposal creation failed; R6 request still valid"),
                }
            }
        }

        self.requests.insert(r6_id.clone(), request.clone());

        self.team
            .record_external_audit(
                "r6_created",
                Some(r6_id.clone()),
                serde_json::to_value(&request)
                    .map_err(|e| GovernanceError::validation("r6_request", e.to_string()))?,
            )
            .await?;
        self.team
            .submit_external_transaction(
                "r6_created",
                requester_lct,
                serde_json::json!({
                    "r6_id": r6_id,
                    "action_type": action_type,
                    "atp_cost": rule.atp_cost,
                }),
                None,
                0.0,
            )
            .await?;

        info!(r6_id, action_type, requester = requester_lct, "R6 request created");
        Ok(request)
    }

    /// Approve a request. Admin/peer rules flip status directly; multi-sig
    /// rules relay the vote to the linked proposal and mirror its status
    /// (spec §4.7).
    pub async fn approve_request(&self, policy: &Policy, r6_id: &str, approver_lct: &str) -> Result<R6Request> {
        let mut entry = self
            .requests
            .get_mut(r6_id)
            .ok_or_else(|| GovernanceError::not_found("r6_request", r6_id))?;

        if entry.status != R6Status::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }

        let rule = policy
            .get_rule(&entry.action_type)
            .ok_or_else(|| GovernanceError::validation("action_type", "no policy rule for this request"))?
            .clone();

        match rule.approval {
            ApprovalMode::Admin => {
                if !self.team.is_admin(approver_lct).await {
                    return Err(GovernanceError::permission_denied("only admin can approve this request"));
                }
            }
            ApprovalMode::Peer => {
                if self.team.get_member(approver_lct).is_none() {
                    return Err(GovernanceError::permission_denied("approver must be a team member"));
                }
                if approver_lct == entry.requester_lct {
                    return Err(GovernanceError::permission_denied("cannot self-approve"));
                }
            }
            ApprovalMode::MultiSig => {
                if self.team.get_member(approver_lct).is_none() {
                    return Err(GovernanceError::permission_denied("approver must be a team member"));
                }
            }
            ApprovalMode::None => {}
        }

        if !entry.approvals.iter().any(|a| a == approver_lct) {
            entry.approvals.push(approver_lct.to_string());
        }

        if let (Some(proposal_id), Some(multisig)) = (entry.linked_proposal_id.clone(), self.multisig) {
            let _ = multisig.vote(&proposal_id, approver_lct, true, "").await;
            if let Some(proposal) = multisig.get_proposal(&proposal_id) {
                if proposal.status == hardbound_multisig::ProposalStatus::Approved {
                    entry.status = R6Status::Approved;
                }
            }
        } else {
            match rule.approval {
                ApprovalMode::None => entry.status = R6Status::Approved,
                ApprovalMode::MultiSig => {
                    if entry.approvals.len() as u32 >= rule.approval_count {
                        entry.status = R6Status::Approved;
                    }
                }
                ApprovalMode::Admin | ApprovalMode::Peer => entry.status = R6Status::Approved,
            }
        }

        let snapshot = entry.clone();
        drop(entry);

        self.team
            .record_external_audit(
                "r6_approved",
                Some(r6_id.to_string()),
                serde_json::json!({
                    "approver": approver_lct,
                    "status": snapshot.status,
                    "approvals": snapshot.approvals,
                }),
            )
            .await?;
        self.team
            .submit_external_transaction(
                "r6_approved",
                approver_lct,
                serde_json::json!({ "r6_id": r6_id, "status": snapshot.status }),
                Some(snapshot.requester_lct.clone()),
                0.0,
            )
            .await?;

        Ok(snapshot)
    }

    /// Reject a request: small reliability penalty to the requester, audit
    /// recorded, removed from the pending set (spec §4.7).
    pub async fn reject_request(&self, r6_id: &str, rejector_lct: &str, reason: &str) -> Result<R6Response> {
        let mut entry = self
            .requests
            .get_mut(r6_id)
            .ok_or_else(|| GovernanceError::not_found("r6_request", r6_id))?;
        if entry.status != R6Status::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }

        let is_admin = self.team.is_admin(rejector_lct).await;
        let is_member = self.team.get_member(rejector_lct).is_some();
        if !is_admin && !is_member {
            return Err(GovernanceError::permission_denied("must be admin or team member to reject"));
        }

        entry.status = R6Status::Rejected;
        entry.rejections.push(rejector_lct.to_string());
        let requester = entry.requester_lct.clone();
        drop(entry);

        let before = self.team.get_member_trust_score(&requester).await.unwrap_or(0.0);
        self.team
            .update_member_trust(&requester, Outcome::Failure, 0.05)
            .await?;
        let after = self.team.get_member_trust_score(&requester).await.unwrap_or(before);

        let response = R6Response {
            r6_id: r6_id.to_string(),
            status: R6Status::Rejected,
            closed_at: Utc::now(),
            closed_by: rejector_lct.to_string(),
            result_type: "rejected".to_string(),
            result_data: Value::Null,
            error_message: reason.to_string(),
            atp_consumed: 0.0,
            atp_returned: 0.0,
            trust_delta: after - before,
        };

        self.team
            .record_external_audit(
                "r6_rejected",
                Some(r6_id.to_string()),
                serde_json::json!({ "rejector": rejector_lct, "reason": reason }),
            )
            .await?;
        self.team
            .submit_external_transaction(
                "r6_rejected",
                rejector_lct,
                serde_json::json!({ "r6_id": r6_id, "reason": reason }),
                Some(requester),
                0.0,
            )
            .await?;

        Ok(response)
    }

    /// Record the outcome of an approved request: consumes ATP, updates
    /// trust, rewards a 50% ATP recovery on success (spec §4.7).
    pub async fn execute_request(
        &self,
        r6_id: &str,
        success: bool,
        result_data: Option<Value>,
        error_message: &str,
    ) -> Result<R6Response> {
        let mut entry = self
            .requests
            .get_mut(r6_id)
            .ok_or_else(|| GovernanceError::not_found("r6_request", r6_id))?;
        if entry.status != R6Status::Approved {
            return Err(GovernanceError::invalid_state("approved", format!("{:?}", entry.status)));
        }

        let requester = entry.requester_lct.clone();
        let atp_cost = entry.atp_cost;
        let action_type = entry.action_type.clone();
        drop(entry);

        self.team.consume_member_atp(&requester, atp_cost).await?;

        let before = self.team.get_member_trust_score(&requester).await.unwrap_or(0.0);
        let (status, result_type, atp_returned) = if success {
            self.team.update_member_trust(&requester, Outcome::Success, 0.1).await?;
            self.team
                .reward_member_atp(&requester, Outcome::Success, (atp_cost / 2.0).max(1.0))
                .await?;
            (R6Status::Executed, "success", (atp_cost / 2.0).max(1.0))
        } else {
            self.team.update_member_trust(&requester, Outcome::Failure, 0.1).await?;
            (R6Status::Failed, "error", 0.0)
        };
        let after = self.team.get_member_trust_score(&requester).await.unwrap_or(before);
        let trust_delta = after - before;

        let mut entry = self
            .requests
            .get_mut(r6_id)
            .ok_or_else(|| GovernanceError::not_found("r6_request", r6_id))?;
        entry.status = status;
        let snapshot = entry.clone();
        drop(entry);

        let response = R6Response {
            r6_id: r6_id.to_string(),
            status,
            closed_at: Utc::now(),
            closed_by: requester.clone(),
            result_type: result_type.to_string(),
            result_data: result_data.unwrap_or(Value::Null),
            error_message: if success { String::new() } else { error_message.to_string() },
            atp_consumed: atp_cost,
            atp_returned: if success { atp_returned } else { 0.0 },
            trust_delta,
        };

        self.team
            .record_external_audit(
                "r6_completed",
                Some(r6_id.to_string()),
                serde_json::json!({ "request": snapshot, "response": response }),
            )
            .await?;
        self.team
            .submit_external_transaction(
                "r6_executed",
                &requester,
                serde_json::json!({ "r6_id": r6_id, "action_type": action_type, "success": success }),
                None,
                atp_cost,
            )
            .await?;

        Ok(response)
    }

    /// Prune requests whose expiry has passed, applying a small trust
    /// penalty to each requester (spec §4.7). Returns the expired requests.
    pub async fn cleanup_expired(&self) -> Result<Vec<R6Request>> {
        let now = Utc::now();
        let mut expired = Vec::new();
        for mut entry in self.requests.iter_mut() {
            if entry.status == R6Status::Pending && entry.is_expired(now) {
                entry.status = R6Status::Expired;
                expired.push(entry.clone());
            }
        }
        for request in &expired {
            self.team
                .update_member_trust(&request.requester_lct, Outcome::Failure, 0.02)
                .await?;
            self.team
                .record_external_audit(
                    "r6_expired",
                    Some(request.r6_id.clone()),
                    serde_json::json!({ "requester": request.requester_lct }),
                )
                .await?;
        }
        Ok(expired)
    }

    pub fn get_request(&self, r6_id: &str) -> Option<R6Request> {
        self.requests.get(r6_id).map(|e| e.clone())
    }

    pub fn get_pending_requests(&self) -> Vec<R6Request> {
        self.requests
            .iter()
            .filter(|e| e.status == R6Status::Pending)
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_request_history(&self, limit: usize) -> Vec<R6Request> {
        let mut all: Vec<R6Request> = self.requests.iter().map(|e| e.clone()).collect();
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

    async fn team_with_members(n: usize) -> (Team, Vec<String>) {
        let team = Team::create(TeamConfig::new("r6-test")).await.unwrap();
        let admin = Lct::new_unchecked("web4:soft:admin:a0");
        team.set_admin(admin.clone()).await.unwrap();
        team.add_member(admin.clone(), Role::Admin, Some(100.0)).await.unwrap();
        let mut lcts = vec![admin.as_str().to_string()];
        for i in 1..n {
            let lct = Lct::new_unchecked(format!("web4:soft:member:m{i}"));
            team.add_member(lct.clone(), Role::Developer, Some(100.0)).await.unwrap();
            lcts.push(lct.as_str().to_string());
        }
        (team, lcts)
    }

    #[tokio::test]
    async fn honest_cycle_from_request_to_execution() {
        let (team, members) = team_with_members(2).await;
        let workflow = R6Workflow::new(&team, None);
        let policy = team.get_policy().await;

        let request = workflow
            .create_request(
                &policy,
                &members[1],
                "commit",
                "land the fix",
                "src/lib.rs",
                None,
                "",
                "",
                None,
            )
            .await
            .unwrap();
        assert_eq!(request.status, R6Status::Pending);

        let approved = workflow
            .approve_request(&policy, &request.r6_id, &members[0])
            .await
            .unwrap();
        assert_eq!(approved.status, R6Status::Approved);

        let response = workflow
            .execute_request(&request.r6_id, true, None, "")
            .await
            .unwrap();
        assert_eq!(response.status, R6Status::Executed);
        assert!(response.atp_returned > 0.0);
    }

    #[tokio::test]
    async fn peer_cannot_self_approve() {
        let (team, members) = team_with_members(2).await;
        let workflow = R6Workflow::new(&team, None);
        let policy = team.get_policy().await;

        let request = workflow
            .create_request(&policy, &members[1], "commit", "x", "", None, "", "", None)
            .await
            .unwrap();

        let err = workflow
            .approve_request(&policy, &request.r6_id, &members[1])
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn rejection_penalizes_requester_trust() {
        let (team, members) = team_with_members(2).await;
        let workflow = R6Workflow::new(&team, None);
        let policy = team.get_policy().await;

        let before = team.get_member_trust_score(&members[1]).await.unwrap();
        let request = workflow
            .create_request(&policy, &members[1], "commit", "x", "", None, "", "", None)
            .await
            .unwrap();
        workflow
            .reject_request(&request.r6_id, &members[0], "not ready")
            .await
            .unwrap();
        let after = team.get_member_trust_score(&members[1]).await.unwrap();
        assert!(after < before);
        assert!(workflow.get_request(&request.r6_id).unwrap().status == R6Status::Rejected);
    }

    #[tokio::test]
    async fn multisig_delegated_request_mirrors_proposal_status() {
        let (team, members) = team_with_members(4).await;
        let multisig = hardbound_multisig::MultiSigManager::new(&team);
        let workflow = R6Workflow::new(&team, Some(&multisig));

        let mut policy = policy_with_multisig_budget_allocation(team.get_policy().await);
        policy.version += 1;

        let request = workflow
            .create_request(
                &policy,
                &members[0],
                "budget_allocation",
                "fund tooling",
                "",
                Some(serde_json::json!({ "amount": 5.0 })),
                "",
                "",
                None,
            )
            .await
            .unwrap();
        assert!(request.linked_proposal_id.is_some());

        workflow.approve_request(&policy, &request.r6_id, &members[1]).await.unwrap();
        let second = workflow.approve_request(&policy, &request.r6_id, &members[2]).await.unwrap();
        assert_eq!(second.status, R6Status::Approved);
    }

    fn policy_with_multisig_budget_allocation(mut policy: Policy) -> Policy {
        policy.add_rule(hardbound_policy::PolicyRule {
            action_type: "budget_allocation".to_string(),
            allowed_roles: [Role::Admin, Role::Developer].into_iter().collect(),
            trust_threshold: 0.0,
            atp_cost: 1.0,
            approval: ApprovalMode::MultiSig,
            approval_count: 2,
            description: "budget allocation via multisig".to_string(),
        });
        policy
    }
}
