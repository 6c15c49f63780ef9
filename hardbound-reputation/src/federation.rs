//! Multi-federation registry: inter-federation trust bootstrap limits,
//! cross-federation proposals with severity auto-escalation (spec §4.10).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hardbound_core::GovernanceError;
use hardbound_core::hash::hex_sha256;
use tokio::sync::RwLock;

use crate::types::{
    CrossFederationProposal, FederationApproval, FederationProfile, FederationProposalStatus,
    FederationRelationship, InterFederationTrust, ReputationTier, SeverityOverrideRecord,
};

/// Age-based trust ceiling: a relationship younger than the first breakpoint
/// cannot exceed the paired score, regardless of interaction history
/// (grounded on `multi_federation.py`'s bootstrap-limit table).
const AGE_BOOTSTRAP_LIMITS: &[(i64, f64)] = &[(7, 0.2), (30, 0.4), (90, 0.6), (365, 0.8)];

/// Interaction-count ceiling, the companion cap to [`AGE_BOOTSTRAP_LIMITS`]:
/// a relationship with few recorded interactions is capped even if it is old.
const INTERACTION_BOOTSTRAP_LIMITS: &[(u64, f64)] = &[(5, 0.3), (20, 0.5), (50, 0.7)];

const TRUST_SUCCESS_DELTA: f64 = 0.05;
const TRUST_FAILURE_DELTA: f64 = -0.10;

/// Action-type severity table for cross-federation proposals. No literal
/// table exists in `multi_federation.py` for this; authored here by analogy
/// to the ATP-cost/quorum tiers used elsewhere in this workspace (see
/// DESIGN.md). Each entry gives the base severity in `[0, 1]` and the
/// minimum approval ratio it escalates to.
fn action_severity(action_type: &str) -> (f64, f64) {
    match action_type {
        "federation_dissolution" | "mass_trust_revocation" => (0.9, 0.9),
        "federation_suspension" | "trust_relationship_termination" => (0.7, 0.75),
        "policy_change" | "witness_pool_modification" => (0.5, 0.6),
        "membership_change" | "capability_grant" => (0.3, 0.5),
        _ => (0.2, 0.5),
    }
}

/// A severity above this threshold always requires an external witness,
/// independent of whatever the proposing federation requested.
const SEVERITY_REQUIRES_WITNESS: f64 = 0.7;

/// Severity and minimum approval ratio a proposal is escalated to when a
/// low-reputation federation proposes a high-impact action against a
/// higher-standing target, regardless of its declared severity
/// (spec §8 Scenario F).
const CRITICAL_OVERRIDE_SEVERITY: f64 = 0.95;
const CRITICAL_OVERRIDE_APPROVAL_RATIO: f64 = 0.9;

/// Action types considered high-impact enough to trigger the Scenario F
/// override when proposed by a low-reputation federation.
const HIGH_IMPACT_ACTIONS: &[&str] = &["federation_dissolution", "mass_trust_revocation", "team_dissolution"];

/// Registry of federations and the directed trust edges between them,
/// plus the cross-federation proposal workflow (spec §4.10).
pub struct MultiFederationRegistry {
    profiles: DashMap<String, FederationProfile>,
    trust: DashMap<(String, String), InterFederationTrust>,
    proposals: DashMap<String, CrossFederationProposal>,
    proposal_seq: RwLock<u64>,
    severity_overrides: DashMap<String, SeverityOverrideRecord>,
}

impl MultiFederationRegistry {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            trust: DashMap::new(),
            proposals: DashMap::new(),
            proposal_seq: RwLock::new(0),
            severity_overrides: DashMap::new(),
        }
    }

    pub fn register_federation(&self, federation_id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> FederationProfile {
        let id = federation_id.into();
        let profile = FederationProfile::new(id.clone(), name, now);
        self.profiles.insert(id, profile.clone());
        profile
    }

    pub fn get_federation(&self, federation_id: &str) -> Result<FederationProfile, GovernanceError> {
        self.profiles
            .get(federation_id)
            .map(|p| p.clone())
            .ok_or_else(|| GovernanceError::not_found("federation", federation_id))
    }

    /// The bootstrap ceiling for a relationship of this age and interaction
    /// count: the tighter of the two caps (spec §4.10).
    fn bootstrap_ceiling(age_days: i64, interactions: u64) -> f64 {
        let age_cap = AGE_BOOTSTRAP_LIMITS
            .iter()
            .find(|(days, _)| age_days < *days)
            .map(|(_, cap)| *cap)
            .unwrap_or(1.0);
        let interaction_cap = INTERACTION_BOOTSTRAP_LIMITS
            .iter()
            .find(|(count, _)| interactions < *count)
            .map(|(_, cap)| *cap)
            .unwrap_or(1.0);
        age_cap.min(interaction_cap)
    }

    pub async fn establish_trust(
        &self,
        source: &str,
        target: &str,
        relationship: FederationRelationship,
        now: DateTime<Utc>,
    ) -> Result<InterFederationTrust, GovernanceError> {
        self.get_federation(source)?;
        self.get_federation(target)?;
        if source == target {
            return Err(GovernanceError::validation("target", "a federation cannot establish trust with itself"));
        }
        let key = (source.to_string(), target.to_string());
        if self.trust.contains_key(&key) {
            return Err(GovernanceError::already_exists("inter_federation_trust", format!("{source}->{target}")));
        }
        let ceiling = Self::bootstrap_ceiling(0, 0);
        let record = InterFederationTrust {
            source_federation_id: source.to_string(),
            target_federation_id: target.to_string(),
            relationship,
            established_at: now,
            trust_score: ceiling.min(0.2),
            witness_allowed: false,
            last_interaction: None,
            successful_interactions: 0,
            failed_interactions: 0,
        };
        self.trust.insert(key, record.clone());
        Ok(record)
    }

    pub fn get_trust_relationship(&self, source: &str, target: &str) -> Option<InterFederationTrust> {
        self.trust.get(&(source.to_string(), target.to_string())).map(|r| r.clone())
    }

    /// Age-and-interaction-capped bootstrap status for a relationship, for
    /// callers that want to know how much headroom remains before raising it.
    pub fn get_trust_bootstrap_status(&self, source: &str, target: &str, now: DateTime<Utc>) -> Result<(f64, f64), GovernanceError> {
        let rel = self
            .get_trust_relationship(source, target)
            .ok_or_else(|| GovernanceError::not_found("inter_federation_trust", format!("{source}->{target}")))?;
        let age_days = (now - rel.established_at).num_days().max(0);
        let interactions = rel.successful_interactions + rel.failed_interactions;
        let ceiling = Self::bootstrap_ceiling(age_days, interactions);
        Ok((rel.trust_score, ceiling))
    }

    /// Record the outcome of an inter-federation interaction, adjusting
    /// trust by `+0.05`/`-0.10` and re-clamping against the bootstrap
    /// ceiling for the relationship's current age (spec §4.10).
    pub async fn record_interaction(
        &self,
        source: &str,
        target: &str,
        succeeded: bool,
        now: DateTime<Utc>,
    ) -> Result<InterFederationTrust, GovernanceError> {
        let key = (source.to_string(), target.to_string());
        let mut entry = self
            .trust
            .get_mut(&key)
            .ok_or_else(|| GovernanceError::not_found("inter_federation_trust", format!("{source}->{target}")))?;

        if succeeded {
            entry.successful_interactions += 1;
        } else {
            entry.failed_interactions += 1;
        }
        entry.last_interaction = Some(now);

        let delta = if succeeded { TRUST_SUCCESS_DELTA } else { TRUST_FAILURE_DELTA };
        let age_days = (now - entry.established_at).num_days().max(0);
        let interactions = entry.successful_interactions + entry.failed_interactions;
        let ceiling = Self::bootstrap_ceiling(age_days, interactions);
        entry.trust_score = (entry.trust_score + delta).clamp(0.0, ceiling);
        entry.witness_allowed = entry.trust_score >= 0.5;
        Ok(entry.clone())
    }

    pub fn find_eligible_witness_federations(&self, requester: &str, min_trust: f64) -> Vec<String> {
        self.trust
            .iter()
            .filter(|e| e.key().1 == requester && e.value().witness_allowed && e.value().trust_score >= min_trust)
            .map(|e| e.key().0.clone())
            .collect()
    }

    fn next_proposal_id(seq: u64, now: DateTime<Utc>) -> String {
        let digest = hex_sha256(format!("xfed:{seq}:{now}").as_bytes());
        format!("xfed:{}", &digest[..12])
    }

    /// Create a cross-federation proposal. Severity and minimum approval
    /// ratio are auto-escalated from `action_type` via [`action_severity`];
    /// any severity at or above [`SEVERITY_REQUIRES_WITNESS`] forces
    /// `requires_external_witness = true` regardless of the caller's ask.
    pub async fn create_cross_federation_proposal(
        &self,
        proposing_federation_id: &str,
        proposing_team_id: &str,
        affected_federation_ids: Vec<String>,
        action_type: impl Into<String>,
        description: impl Into<String>,
        requires_external_witness: bool,
        now: DateTime<Utc>,
    ) -> Result<CrossFederationProposal, GovernanceError> {
        self.get_federation(proposing_federation_id)?;
        if affected_federation_ids.is_empty() {
            return Err(GovernanceError::validation("affected_federation_ids", "at least one affected federation is required"));
        }
        for fed in &affected_federation_ids {
            self.get_federation(fed)?;
        }

        let action_type = action_type.into();
        let (severity, min_approval_ratio) = action_severity(&action_type);
        let requires_external_witness = requires_external_witness || severity >= SEVERITY_REQUIRES_WITNESS;

        let mut seq = self.proposal_seq.write().await;
        *seq += 1;
        let proposal_id = Self::next_proposal_id(*seq, now);
        drop(seq);

        let proposal = CrossFederationProposal {
            proposal_id: proposal_id.clone(),
            proposing_federation_id: proposing_federation_id.to_string(),
            proposing_team_id: proposing_team_id.to_string(),
            affected_federation_ids,
            action_type,
            description: description.into(),
            created_at: now,
            status: FederationProposalStatus::Pending,
            federation_approvals: Default::default(),
            requires_external_witness,
            external_witnesses: Vec::new(),
            severity,
            min_approval_ratio,
        };
        self.proposals.insert(proposal_id, proposal.clone());
        Ok(proposal)
    }

    /// As [`create_cross_federation_proposal`](Self::create_cross_federation_proposal),
    /// but the proposer's current reputation tier participates in
    /// classification: a low-reputation federation (`Unknown`/`Emerging`)
    /// proposing a high-impact action against any target is escalated to
    /// critical severity regardless of what it declares, and the override
    /// is recorded (spec §8 Scenario F).
    pub async fn create_cross_federation_proposal_with_reputation(
        &self,
        proposing_federation_id: &str,
        proposing_team_id: &str,
        affected_federation_ids: Vec<String>,
        action_type: impl Into<String>,
        description: impl Into<String>,
        requires_external_witness: bool,
        proposer_tier: ReputationTier,
        now: DateTime<Utc>,
    ) -> Result<CrossFederationProposal, GovernanceError> {
        let action_type = action_type.into();
        let mut proposal = self
            .create_cross_federation_proposal(
                proposing_federation_id,
                proposing_team_id,
                affected_federation_ids,
                action_type.clone(),
                description,
                requires_external_witness,
                now,
            )
            .await?;

        let is_high_impact = HIGH_IMPACT_ACTIONS.contains(&action_type.as_str());
        let is_low_reputation = proposer_tier <= ReputationTier::Emerging;

        if is_high_impact && is_low_reputation && proposal.severity < CRITICAL_OVERRIDE_SEVERITY {
            let requested_severity = proposal.severity;
            proposal.severity = CRITICAL_OVERRIDE_SEVERITY;
            proposal.min_approval_ratio = CRITICAL_OVERRIDE_APPROVAL_RATIO;
            proposal.requires_external_witness = true;
            self.proposals.insert(proposal.proposal_id.clone(), proposal.clone());

            self.severity_overrides.insert(
                proposal.proposal_id.clone(),
                SeverityOverrideRecord {
                    proposal_id: proposal.proposal_id.clone(),
                    requested_severity,
                    effective_severity: proposal.severity,
                    reason: format!("low-reputation federation ({proposer_tier:?}) proposing high-impact action '{action_type}'"),
                    risk_level: "warning".to_string(),
                    recorded_at: now,
                },
            );
        }

        Ok(proposal)
    }

    pub fn get_severity_override(&self, proposal_id: &str) -> Option<SeverityOverrideRecord> {
        self.severity_overrides.get(proposal_id).map(|r| r.clone())
    }

    pub fn get_cross_federation_proposal(&self, proposal_id: &str) -> Result<CrossFederationProposal, GovernanceError> {
        self.proposals
            .get(proposal_id)
            .map(|p| p.clone())
            .ok_or_else(|| GovernanceError::not_found("cross_federation_proposal", proposal_id))
    }

    /// Approve on behalf of `federation_id`. Finalizes to `Approved` once
    /// every affected federation has approved and, for high-severity
    /// proposals, at least one external witness has signed on.
    pub async fn approve_from_federation(
        &self,
        proposal_id: &str,
        federation_id: &str,
        approving_teams: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<CrossFederationProposal, GovernanceError> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("cross_federation_proposal", proposal_id))?;

        if entry.status != FederationProposalStatus::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }
        if !entry.affected_federation_ids.iter().any(|f| f == federation_id) {
            return Err(GovernanceError::permission_denied(format!("{federation_id} is not a party to this proposal")));
        }

        entry.federation_approvals.insert(federation_id.to_string(), FederationApproval { approving_teams, timestamp: now });

        if entry.all_approved() && (!entry.requires_external_witness || entry.has_external_witness()) {
            entry.status = FederationProposalStatus::Approved;
        }
        Ok(entry.clone())
    }

    pub async fn add_external_witness(&self, proposal_id: &str, witness_federation_id: &str, now: DateTime<Utc>) -> Result<CrossFederationProposal, GovernanceError> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("cross_federation_proposal", proposal_id))?;
        if entry.status != FederationProposalStatus::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }
        if entry.affected_federation_ids.iter().any(|f| f == witness_federation_id) || entry.proposing_federation_id == witness_federation_id {
            return Err(GovernanceError::validation("witness_federation_id", "a party to the proposal cannot serve as its external witness"));
        }
        if !entry.external_witnesses.iter().any(|w| w == witness_federation_id) {
            entry.external_witnesses.push(witness_federation_id.to_string());
        }
        if entry.all_approved() && entry.has_external_witness() {
            entry.status = FederationProposalStatus::Approved;
        }
        let _ = now;
        Ok(entry.clone())
    }

    pub async fn reject_cross_federation_proposal(&self, proposal_id: &str) -> Result<CrossFederationProposal, GovernanceError> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("cross_federation_proposal", proposal_id))?;
        if entry.status != FederationProposalStatus::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }
        entry.status = FederationProposalStatus::Rejected;
        Ok(entry.clone())
    }

    pub fn get_pending_proposals(&self) -> Vec<CrossFederationProposal> {
        self.proposals
            .iter()
            .filter(|p| p.status == FederationProposalStatus::Pending)
            .map(|p| p.clone())
            .collect()
    }

    /// Directed reciprocity ratio between two federations' approval history
    /// across all cross-federation proposals each has proposed (mirrors the
    /// team-level approval-reciprocity analysis in `hardbound-federation`,
    /// generalized one level up per spec §4.10).
    pub fn analyze_federation_reciprocity(&self, federation_a: &str, federation_b: &str) -> (u64, u64, f64) {
        let mut a_approves_b = 0u64;
        let mut b_approves_a = 0u64;
        for proposal in self.proposals.iter() {
            if proposal.proposing_federation_id == federation_b && proposal.federation_approvals.contains_key(federation_a) {
                a_approves_b += 1;
            }
            if proposal.proposing_federation_id == federation_a && proposal.federation_approvals.contains_key(federation_b) {
                b_approves_a += 1;
            }
        }
        let total = a_approves_b + b_approves_a;
        let ratio = if total == 0 { 0.0 } else { a_approves_b.min(b_approves_a) as f64 * 2.0 / total as f64 };
        (a_approves_b, b_approves_a, ratio)
    }

    pub fn all_trust_edges(&self) -> Vec<InterFederationTrust> {
        self.trust.iter().map(|e| e.value().clone()).collect()
    }

    pub fn all_federations(&self) -> Vec<FederationProfile> {
        self.profiles.iter().map(|e| e.value().clone()).collect()
    }

    pub fn suspend_federation(&self, federation_id: &str) -> Result<(), GovernanceError> {
        let mut entry = self
            .profiles
            .get_mut(federation_id)
            .ok_or_else(|| GovernanceError::not_found("federation", federation_id))?;
        entry.status = crate::types::FederationStatus::Suspended;
        Ok(())
    }

    /// Reference-age helper for tests and callers without a live clock feed.
    pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
        now - Duration::days(days)
    }
}

impl Default for MultiFederationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(now: DateTime<Utc>) -> MultiFederationRegistry {
        let reg = MultiFederationRegistry::new();
        reg.register_federation("fed-a", "Federation A", now);
        reg.register_federation("fed-b", "Federation B", now);
        reg.register_federation("fed-c", "Federation C", now);
        reg
    }

    #[tokio::test]
    async fn new_trust_relationship_is_bootstrap_capped() {
        let now = Utc::now();
        let reg = registry_with(now);
        let rel = reg.establish_trust("fed-a", "fed-b", FederationRelationship::Peer, now).await.unwrap();
        assert!(rel.trust_score <= 0.2);
    }

    #[tokio::test]
    async fn interaction_ceiling_caps_growth_despite_successes() {
        let now = Utc::now();
        let reg = registry_with(now);
        reg.establish_trust("fed-a", "fed-b", FederationRelationship::Peer, now).await.unwrap();
        for _ in 0..20 {
            reg.record_interaction("fed-a", "fed-b", true, now).await.unwrap();
        }
        let rel = reg.get_trust_relationship("fed-a", "fed-b").unwrap();
        assert!(rel.trust_score <= 0.3 + 1e-9, "interaction cap should bind before age matures: {}", rel.trust_score);
    }

    #[tokio::test]
    async fn high_severity_action_forces_external_witness() {
        let now = Utc::now();
        let reg = registry_with(now);
        let proposal = reg
            .create_cross_federation_proposal("fed-a", "team-1", vec!["fed-b".into()], "federation_dissolution", "dissolve", false, now)
            .await
            .unwrap();
        assert!(proposal.requires_external_witness);
        assert!(proposal.severity >= SEVERITY_REQUIRES_WITNESS);
    }

    #[tokio::test]
    async fn low_reputation_proposer_gets_severity_escalated_to_critical() {
        let now = Utc::now();
        let reg = registry_with(now);
        let proposal = reg
            .create_cross_federation_proposal_with_reputation(
                "fed-a",
                "team-1",
                vec!["fed-b".into()],
                "team_dissolution",
                "dissolve target team",
                false,
                ReputationTier::Emerging,
                now,
            )
            .await
            .unwrap();

        assert!(proposal.severity >= CRITICAL_OVERRIDE_SEVERITY);
        assert!(proposal.min_approval_ratio >= CRITICAL_OVERRIDE_APPROVAL_RATIO);
        assert!(proposal.requires_external_witness);

        let override_record = reg.get_severity_override(&proposal.proposal_id).unwrap();
        assert_eq!(override_record.risk_level, "warning");
        assert!(override_record.requested_severity < override_record.effective_severity);
    }

    #[tokio::test]
    async fn established_reputation_proposer_is_not_escalated() {
        let now = Utc::now();
        let reg = registry_with(now);
        let proposal = reg
            .create_cross_federation_proposal_with_reputation(
                "fed-a",
                "team-1",
                vec!["fed-b".into()],
                "team_dissolution",
                "dissolve target team",
                false,
                ReputationTier::Trusted,
                now,
            )
            .await
            .unwrap();

        assert!(reg.get_severity_override(&proposal.proposal_id).is_none());
    }

    #[tokio::test]
    async fn proposal_approves_only_after_witness_and_all_parties() {
        let now = Utc::now();
        let reg = registry_with(now);
        let proposal = reg
            .create_cross_federation_proposal("fed-a", "team-1", vec!["fed-b".into()], "federation_dissolution", "dissolve", false, now)
            .await
            .unwrap();
        let proposal = reg.approve_from_federation(&proposal.proposal_id, "fed-b", vec!["team-2".into()], now).await.unwrap();
        assert_eq!(proposal.status, FederationProposalStatus::Pending);
        let proposal = reg.add_external_witness(&proposal.proposal_id, "fed-c", now).await.unwrap();
        assert_eq!(proposal.status, FederationProposalStatus::Approved);
    }
}
