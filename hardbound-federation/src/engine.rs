//! `FederationRegistry`: cross-team discovery, witness coordination, and
//! collusion detection (spec §4.9). Unlike `Team`, this registry is not
//! itself hash-chained — it is the "social layer" teams register into, and
//! its own tamper-evidence comes from the signed pattern envelope below.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hardbound_core::{GovernanceError, Result};
use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::types::{
    ApprovalCycle, ApprovalReciprocityReport, ApprovalReciprocitySummary, ApprovalTiming,
    CollusionReport, CrossTeamApproval, CrossTeamProposal, CrossTeamRejection, CrossTeamStatus,
    CycleReport, FederatedTeam, FederationStatus, LineageReport, MultiTeamCreator,
    ReciprocityReport, SameCreatorWitnessPair, SignedPattern, TemporalAnalysis,
    TemporalAnalysisReport, VotingMode, WitnessOutcome, WitnessRecord,
};

/// Minimum witness score to be eligible as an external witness (spec §4.9).
pub const MIN_WITNESS_SCORE: f64 = 0.3;
/// Recent witness events considered per team when checking reciprocity.
pub const RECIPROCITY_WINDOW: usize = 50;
/// Reciprocity ratio above which a witnessing pair is flagged as collusion.
pub const MAX_RECIPROCITY_RATIO: f64 = 0.6;

struct XTeamApprovalRecord {
    proposing_team_id: String,
    approving_team_id: String,
    #[allow(dead_code)]
    proposal_id: String,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
}

/// Registry for cross-team discovery and witness coordination (spec §4.9).
/// `registry_id` is the domain separator baked into every HMAC signing key —
/// the Rust analogue of the Python source's `db_path`.
pub struct FederationRegistry {
    registry_id: String,
    teams: DashMap<String, FederatedTeam>,
    witness_records: RwLock<Vec<WitnessRecord>>,
    proposals: DashMap<String, CrossTeamProposal>,
    approval_records: RwLock<Vec<XTeamApprovalRecord>>,
}

impl FederationRegistry {
    pub fn new(registry_id: impl Into<String>) -> Self {
        Self {
            registry_id: registry_id.into(),
            teams: DashMap::new(),
            witness_records: RwLock::new(Vec::new()),
            proposals: DashMap::new(),
            approval_records: RwLock::new(Vec::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_team(
        &self,
        team_id: &str,
        name: &str,
        domains: Vec<String>,
        capabilities: Option<Vec<String>>,
        admin_lct: &str,
        creator_lct: &str,
        member_count: u64,
    ) -> Result<FederatedTeam> {
        if self.teams.contains_key(team_id) {
            return Err(GovernanceError::already_exists("federated_team", team_id));
        }
        let mut team = FederatedTeam::new(team_id, name, Utc::now());
        team.domains = domains;
        if let Some(caps) = capabilities {
            team.capabilities = caps;
        }
        team.admin_lct = admin_lct.to_string();
        team.creator_lct = creator_lct.to_string();
        team.member_count = member_count;
        self.teams.insert(team_id.to_string(), team.clone());
        info!(team_id, "team registered in federation");
        Ok(team)
    }

    pub fn get_team(&self, team_id: &str) -> Option<FederatedTeam> {
        self.teams.get(team_id).map(|t| t.clone())
    }

    pub fn find_teams(
        &self,
        domain: Option<&str>,
        capability: Option<&str>,
        min_witness_score: Option<f64>,
        exclude_team_id: Option<&str>,
        status: FederationStatus,
        limit: usize,
    ) -> Vec<FederatedTeam> {
        let mut matches: Vec<FederatedTeam> = self
            .teams
            .iter()
            .map(|e| e.clone())
            .filter(|t| t.status == status)
            .filter(|t| exclude_team_id.map(|ex| t.team_id != ex).unwrap_or(true))
            .filter(|t| min_witness_score.map(|m| t.witness_score >= m).unwrap_or(true))
            .filter(|t| domain.map(|d| t.domains.iter().any(|x| x == d)).unwrap_or(true))
            .filter(|t| capability.map(|c| t.capabilities.iter().any(|x| x == c)).unwrap_or(true))
            .collect();
        matches.sort_by(|a, b| b.witness_score.partial_cmp(&a.witness_score).unwrap());
        matches.truncate(limit);
        matches
    }

    /// Qualified external witness candidates: above the score floor, not
    /// sharing the requester's creator, and not in a flagged reciprocity
    /// relationship with it (spec §4.9).
    pub async fn find_witness_pool(
        &self,
        requesting_team_id: &str,
        count: usize,
        min_score: Option<f64>,
    ) -> Vec<FederatedTeam> {
        let effective_min = min_score.unwrap_or(MIN_WITNESS_SCORE);
        let candidates = self.find_teams(
            None,
            Some("external_witnessing"),
            Some(effective_min),
            Some(requesting_team_id),
            FederationStatus::Active,
            count * 2,
        );

        let requesting_creator = self
            .get_team(requesting_team_id)
            .map(|t| t.creator_lct)
            .unwrap_or_default();

        let mut clean = Vec::new();
        for candidate in candidates {
            if !requesting_creator.is_empty() && candidate.creator_lct == requesting_creator {
                continue;
            }
            let reciprocity = self.check_reciprocity(requesting_team_id, &candidate.team_id).await;
            if reciprocity.reciprocity_ratio <= MAX_RECIPROCITY_RATIO {
                clean.push(candidate);
            }
            if clean.len() >= count {
                break;
            }
        }
        clean
    }

    /// Reputation-weighted random witness selection (spec §4.9). An
    /// explicit `seed` makes selection reproducible for tests.
    pub async fn select_witnesses(
        &self,
        requesting_team_id: &str,
        count: usize,
        min_score: Option<f64>,
        seed: Option<u64>,
    ) -> Vec<FederatedTeam> {
        let mut pool = self.find_witness_pool(requesting_team_id, count * 3, min_score).await;
        if pool.is_empty() || pool.len() <= count {
            return pool;
        }

        let mut rng: StdRng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut selected = Vec::new();
        while selected.len() < count && !pool.is_empty() {
            let weights: Vec<f64> = pool.iter().map(|t| t.witness_score.max(0.01)).collect();
            let total: f64 = weights.iter().sum();
            let r: f64 = rng.gen_range(0.0..total);
            let mut cumulative = 0.0;
            let mut pick = pool.len() - 1;
            for (idx, w) in weights.iter().enumerate() {
                cumulative += w;
                if cumulative >= r {
                    pick = idx;
                    break;
                }
            }
            selected.push(pool.remove(pick));
        }
        selected
    }

    pub async fn record_witness_event(
        &self,
        witness_team_id: &str,
        proposal_team_id: &str,
        witness_lct: &str,
        proposal_id: &str,
    ) -> Result<WitnessRecord> {
        if !self.teams.contains_key(witness_team_id) {
            return Err(GovernanceError::not_found("federated_team", witness_team_id));
        }
        let record = WitnessRecord {
            witness_team_id: witness_team_id.to_string(),
            proposal_team_id: proposal_team_id.to_string(),
            witness_lct: witness_lct.to_string(),
            proposal_id: proposal_id.to_string(),
            timestamp: Utc::now(),
            outcome: None,
        };
        self.witness_records.write().await.push(record.clone());
        if let Some(mut team) = self.teams.get_mut(witness_team_id) {
            team.witness_count += 1;
        }
        Ok(record)
    }

    /// Update the outcome of a witnessed proposal and recompute every
    /// involved witness team's Bayesian-smoothed score (spec §4.9: prior of
    /// 5 pseudo-successes out of 5).
    pub async fn update_witness_outcome(&self, proposal_id: &str, outcome: WitnessOutcome) -> usize {
        let mut records = self.witness_records.write().await;
        let mut witness_teams = HashSet::new();
        for record in records.iter_mut().filter(|r| r.proposal_id == proposal_id) {
            record.outcome = Some(outcome);
            witness_teams.insert(record.witness_team_id.clone());
        }
        drop(records);

        for team_id in &witness_teams {
            if let Some(mut team) = self.teams.get_mut(team_id.as_str()) {
                match outcome {
                    WitnessOutcome::Succeeded => team.witness_successes += 1,
                    WitnessOutcome::Failed | WitnessOutcome::Reversed => team.witness_failures += 1,
                }
                let pseudo = 5.0;
                let score = (team.witness_successes as f64 + pseudo)
                    / (team.witness_count as f64 + pseudo);
                team.witness_score = score.clamp(0.0, 1.0);
            }
        }
        witness_teams.len()
    }

    /// Count of `a`'s recent witnessing for `b` and vice versa, within the
    /// last [`RECIPROCITY_WINDOW`] events per team (spec §4.9).
    pub async fn check_reciprocity(&self, team_a: &str, team_b: &str) -> ReciprocityReport {
        let records = self.witness_records.read().await;

        let recent_by = |witness: &str, proposer: &str| -> usize {
            records
                .iter()
                .rev()
                .filter(|r| r.witness_team_id == witness)
                .take(RECIPROCITY_WINDOW)
                .filter(|r| r.proposal_team_id == proposer)
                .count()
        };
        let recent_total = |witness: &str| -> usize {
            records.iter().rev().filter(|r| r.witness_team_id == witness).take(RECIPROCITY_WINDOW).count()
        };

        let a_for_b = recent_by(team_a, team_b);
        let b_for_a = recent_by(team_b, team_a);
        let a_total = recent_total(team_a);
        let b_total = recent_total(team_b);

        let pair_total = a_for_b + b_for_a;
        let total_witnessing = a_total + b_total;
        let reciprocity_ratio = if total_witnessing == 0 {
            0.0
        } else {
            pair_total as f64 / total_witnessing as f64
        };
        let is_suspicious = reciprocity_ratio > MAX_RECIPROCITY_RATIO && pair_total >= 4;

        ReciprocityReport {
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            a_witnesses_b: a_for_b,
            b_witnesses_a: b_for_a,
            a_total_witnessing: a_total,
            b_total_witnessing: b_total,
            reciprocity_ratio,
            is_suspicious,
            pair_total,
        }
    }

    pub async fn get_collusion_report(&self) -> CollusionReport {
        let team_ids: Vec<String> = self
            .teams
            .iter()
            .filter(|t| t.status == FederationStatus::Active)
            .map(|t| t.team_id.clone())
            .collect();

        let mut flagged_pairs = Vec::new();
        let mut pair_count = 0usize;
        for i in 0..team_ids.len() {
            for j in (i + 1)..team_ids.len() {
                pair_count += 1;
                let reciprocity = self.check_reciprocity(&team_ids[i], &team_ids[j]).await;
                if reciprocity.is_suspicious {
                    flagged_pairs.push(reciprocity);
                }
            }
        }

        let lineage = self.get_lineage_report().await;
        let health = if lineage.health == "critical" || flagged_pairs.len() > 2 {
            "critical"
        } else if lineage.health == "warning" || !flagged_pairs.is_empty() {
            "concerning"
        } else {
            "healthy"
        };

        CollusionReport {
            total_teams: team_ids.len(),
            pairs_analyzed: pair_count,
            collusion_ratio: flagged_pairs.len() as f64 / pair_count.max(1) as f64,
            flagged_pairs,
            lineage,
            health: health.to_string(),
        }
    }

    pub fn find_teams_by_creator(&self, creator_lct: &str) -> Vec<FederatedTeam> {
        if creator_lct.is_empty() {
            return Vec::new();
        }
        self.teams
            .iter()
            .filter(|t| t.creator_lct == creator_lct)
            .map(|t| t.clone())
            .collect()
    }

    /// Flags single-LCT team creation (team Sybil attack) and same-creator
    /// teams witnessing for each other (spec §4.9).
    pub async fn get_lineage_report(&self) -> LineageReport {
        let mut by_creator: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for team in self.teams.iter().filter(|t| t.status == FederationStatus::Active) {
            if team.creator_lct.is_empty() {
                continue;
            }
            by_creator.entry(team.creator_lct.clone()).or_default().push(team.team_id.clone());
        }

        let mut multi_team_creators = Vec::new();
        let mut same_creator_witness_pairs = Vec::new();
        for (creator, team_ids) in &by_creator {
            if team_ids.len() <= 1 {
                continue;
            }
            multi_team_creators.push(MultiTeamCreator {
                creator_lct: creator.clone(),
                team_count: team_ids.len(),
                team_ids: team_ids.clone(),
            });
            for i in 0..team_ids.len() {
                for j in (i + 1)..team_ids.len() {
                    let recip = self.check_reciprocity(&team_ids[i], &team_ids[j]).await;
                    if recip.pair_total > 0 {
                        same_creator_witness_pairs.push(SameCreatorWitnessPair {
                            creator_lct: creator.clone(),
                            team_a: team_ids[i].clone(),
                            team_b: team_ids[j].clone(),
                            witness_events: recip.pair_total,
                            reciprocity_ratio: recip.reciprocity_ratio,
                        });
                    }
                }
            }
        }

        let health = if !same_creator_witness_pairs.is_empty() {
            "critical"
        } else if !multi_team_creators.is_empty() {
            "warning"
        } else {
            "healthy"
        };

        LineageReport {
            multi_team_creators,
            same_creator_witness_pairs,
            health: health.to_string(),
        }
    }

    pub fn suspend_team(&self, team_id: &str, reason: &str) -> bool {
        if let Some(mut team) = self.teams.get_mut(team_id) {
            team.status = FederationStatus::Suspended;
            warn!(team_id, reason, "team suspended from federation");
            true
        } else {
            false
        }
    }

    fn signing_key(&self, signer_lct: &str) -> [u8; 32] {
        let material = format!("{signer_lct}:{}", self.registry_id);
        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        hasher.finalize().into()
    }

    /// Seal a federation analysis result under HMAC-SHA256 (spec §6). The
    /// signing key binds to `registry_id` so a signature from one registry
    /// can't be replayed as valid against another.
    pub fn sign_pattern(&self, pattern_type: &str, data: Value, signer_lct: &str) -> SignedPattern {
        let signed_at = Utc::now();
        let canonical = serde_json::json!({
            "type": pattern_type,
            "data": data,
            "signer": signer_lct,
            "timestamp": signed_at.to_rfc3339(),
        });
        let bytes = serde_json::to_vec(&canonical).expect("canonical json never fails to encode");

        let key = self.signing_key(signer_lct);
        let mut mac = Hmac::<Sha256>::new_from_slice(&key).expect("HMAC accepts any key length");
        mac.update(&bytes);
        let signature = hex::encode(mac.finalize().into_bytes());

        SignedPattern {
            pattern_type: pattern_type.to_string(),
            data,
            signer_lct: signer_lct.to_string(),
            signed_at,
            signature,
            algorithm: "hmac-sha256".to_string(),
        }
    }

    /// Verify a [`SignedPattern`] with constant-time comparison (spec §6).
    pub fn verify_pattern_signature(&self, pattern: &SignedPattern) -> bool {
        let canonical = serde_json::json!({
            "type": pattern.pattern_type,
            "data": pattern.data,
            "signer": pattern.signer_lct,
            "timestamp": pattern.signed_at.to_rfc3339(),
        });
        let bytes = match serde_json::to_vec(&canonical) {
            Ok(b) => b,
            Err(_) => return false,
        };

        let key = self.signing_key(&pattern.signer_lct);
        let mut mac = Hmac::<Sha256>::new_from_slice(&key).expect("HMAC accepts any key length");
        mac.update(&bytes);
        let expected = hex::encode(mac.finalize().into_bytes());

        expected.as_bytes().ct_eq(pattern.signature.as_bytes()).into()
    }

    // ------------------------------------------------------------------
    // Cross-team proposals
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn create_cross_team_proposal(
        &self,
        proposing_team_id: &str,
        proposer_lct: &str,
        action_type: &str,
        description: &str,
        target_team_ids: Vec<String>,
        required_approvals: Option<usize>,
        parameters: Option<Value>,
        require_outsider: bool,
        outsider_team_ids: Vec<String>,
        voting_mode: VotingMode,
        approval_threshold: f64,
    ) -> Result<CrossTeamProposal> {
        if voting_mode == VotingMode::Weighted && !(0.0 < approval_threshold && approval_threshold <= 1.0) {
            return Err(GovernanceError::validation(
                "approval_threshold",
                "must be in (0, 1] for weighted voting",
            ));
        }

        let proposing = self
            .teams
            .get(proposing_team_id)
            .filter(|t| t.status == FederationStatus::Active)
            .ok_or_else(|| GovernanceError::validation("proposing_team_id", "not an active federated team"))?;
        drop(proposing);

        for target in &target_team_ids {
            let active = self.teams.get(target).map(|t| t.status == FederationStatus::Active).unwrap_or(false);
            if !active {
                return Err(GovernanceError::validation("target_team_ids", format!("'{target}' not an active team")));
            }
        }

        let required = required_approvals.unwrap_or(target_team_ids.len());
        if required > target_team_ids.len() {
            return Err(GovernanceError::validation(
                "required_approvals",
                "cannot exceed the number of target teams",
            ));
        }

        let now = Utc::now();
        let seed = format!("xteam:{proposing_team_id}:{action_type}:{}", now.to_rfc3339());
        let hash = hardbound_core::hash::hex_sha256(seed.as_bytes());
        let proposal_id = format!("xteam:{}", &hash[..12]);

        let proposal = CrossTeamProposal {
            proposal_id: proposal_id.clone(),
            proposing_team_id: proposing_team_id.to_string(),
            proposer_lct: proposer_lct.to_string(),
            action_type: action_type.to_string(),
            description: description.to_string(),
            target_team_ids,
            required_approvals: required,
            parameters: parameters.unwrap_or(Value::Object(Default::default())),
            status: CrossTeamStatus::Pending,
            approvals: BTreeMap::new(),
            rejections: BTreeMap::new(),
            created_at: now,
            closed_at: None,
            require_outsider,
            outsider_team_ids,
            has_outsider_approval: false,
            voting_mode,
            approval_threshold,
            weighted_approval: 0.0,
            weighted_rejection: 0.0,
        };

        self.proposals.insert(proposal_id, proposal.clone());
        Ok(proposal)
    }

    fn weighted_votes(&self, proposal: &CrossTeamProposal) -> (f64, f64) {
        let mut total_weight = 0.0;
        let mut approval_weight = 0.0;
        let mut rejection_weight = 0.0;
        for team_id in &proposal.target_team_ids {
            let weight = self.teams.get(team_id).map(|t| t.witness_score).unwrap_or(1.0);
            total_weight += weight;
            if proposal.approvals.contains_key(team_id) {
                approval_weight += weight;
            }
            if proposal.rejections.contains_key(team_id) {
                rejection_weight += weight;
            }
        }
        if total_weight == 0.0 {
            (0.0, 0.0)
        } else {
            (approval_weight / total_weight, rejection_weight / total_weight)
        }
    }

    pub async fn approve_cross_team_proposal(
        &self,
        proposal_id: &str,
        approving_team_id: &str,
        approver_lct: &str,
    ) -> Result<CrossTeamProposal> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("cross_team_proposal", proposal_id))?;
        if entry.status != CrossTeamStatus::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }
        if !entry.is_target(approving_team_id) {
            return Err(GovernanceError::permission_denied(format!(
                "'{approving_team_id}' is not a target of this proposal"
            )));
        }
        if entry.approvals.contains_key(approving_team_id) {
            return Err(GovernanceError::already_exists("cross_team_approval", approving_team_id));
        }

        let now = Utc::now();
        entry.approvals.insert(
            approving_team_id.to_string(),
            CrossTeamApproval { approver_lct: approver_lct.to_string(), timestamp: now },
        );

        self.approval_records.write().await.push(XTeamApprovalRecord {
            proposing_team_id: entry.proposing_team_id.clone(),
            approving_team_id: approving_team_id.to_string(),
            proposal_id: proposal_id.to_string(),
            timestamp: now,
        });

        if entry.require_outsider {
            let is_outsider = if !entry.outsider_team_ids.is_empty() {
                entry.outsider_team_ids.iter().any(|t| t == approving_team_id)
            } else {
                !entry.is_target(approving_team_id)
            };
            if is_outsider {
                entry.has_outsider_approval = true;
            }
        }
        let outsider_met = !entry.require_outsider || entry.has_outsider_approval;

        let approvals_met = match entry.voting_mode {
            VotingMode::Weighted => {
                let (approval, rejection) = self.weighted_votes(&entry);
                entry.weighted_approval = approval;
                entry.weighted_rejection = rejection;
                approval >= entry.approval_threshold
            }
            VotingMode::Veto => entry.approvals.len() >= entry.required_approvals,
        };

        if approvals_met && outsider_met {
            entry.status = CrossTeamStatus::Approved;
            entry.closed_at = Some(Utc::now());
        }

        Ok(entry.clone())
    }

    pub async fn reject_cross_team_proposal(
        &self,
        proposal_id: &str,
        rejecting_team_id: &str,
        rejector_lct: &str,
        reason: &str,
    ) -> Result<CrossTeamProposal> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("cross_team_proposal", proposal_id))?;
        if entry.status != CrossTeamStatus::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }
        if !entry.is_target(rejecting_team_id) {
            return Err(GovernanceError::permission_denied(format!(
                "'{rejecting_team_id}' is not a target of this proposal"
            )));
        }

        entry.rejections.insert(
            rejecting_team_id.to_string(),
            CrossTeamRejection {
                rejector_lct: rejector_lct.to_string(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            },
        );

        match entry.voting_mode {
            VotingMode::Veto => {
                entry.status = CrossTeamStatus::Rejected;
                entry.closed_at = Some(Utc::now());
            }
            VotingMode::Weighted => {
                let (approval, rejection) = self.weighted_votes(&entry);
                entry.weighted_approval = approval;
                entry.weighted_rejection = rejection;
                if rejection > 1.0 - entry.approval_threshold {
                    entry.status = CrossTeamStatus::Rejected;
                    entry.closed_at = Some(Utc::now());
                }
            }
        }

        Ok(entry.clone())
    }

    /// Approve on behalf of a neutral third party not among the targets
    /// (spec §4.9 anti-collusion outsider requirement).
    pub fn approve_as_outsider(
        &self,
        proposal_id: &str,
        outsider_team_id: &str,
        approver_lct: &str,
    ) -> Result<CrossTeamProposal> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("cross_team_proposal", proposal_id))?;
        if entry.status != CrossTeamStatus::Pending {
            return Err(GovernanceError::invalid_state("pending", format!("{:?}", entry.status)));
        }
        if !entry.require_outsider {
            return Err(GovernanceError::validation("require_outsider", "this proposal has no outsider requirement"));
        }
        let eligible = if !entry.outsider_team_ids.is_empty() {
            entry.outsider_team_ids.iter().any(|t| t == outsider_team_id)
        } else {
            !entry.is_target(outsider_team_id) && outsider_team_id != entry.proposing_team_id
        };
        if !eligible {
            return Err(GovernanceError::permission_denied(format!("'{outsider_team_id}' is not an eligible outsider")));
        }
        if entry.has_outsider_approval {
            return Err(GovernanceError::invalid_state("no outsider approval yet", "already has one"));
        }

        entry.has_outsider_approval = true;
        let _ = approver_lct;
        if entry.approvals.len() >= entry.required_approvals {
            entry.status = CrossTeamStatus::Approved;
            entry.closed_at = Some(Utc::now());
        }
        Ok(entry.clone())
    }

    pub fn get_cross_team_proposal(&self, proposal_id: &str) -> Option<CrossTeamProposal> {
        self.proposals.get(proposal_id).map(|p| p.clone())
    }

    pub fn get_pending_cross_team_proposals(&self, team_id: &str) -> Vec<CrossTeamProposal> {
        self.proposals
            .iter()
            .filter(|p| p.status == CrossTeamStatus::Pending && p.is_target(team_id))
            .map(|p| p.clone())
            .collect()
    }

    /// Pairwise collusion check over *cross-team approvals* (distinct from
    /// witness reciprocity): flags balanced, high-volume mutual approval
    /// (spec §4.9).
    pub async fn check_approval_reciprocity(&self, team_a: &str, team_b: &str) -> ApprovalReciprocityReport {
        let records = self.approval_records.read().await;

        let count = |proposer: &str, approver: &str| -> u64 {
            records
                .iter()
                .filter(|r| r.proposing_team_id == proposer && r.approving_team_id == approver)
                .count() as u64
        };
        let total_for = |approver: &str| -> u64 {
            records.iter().filter(|r| r.approving_team_id == approver).count() as u64
        };

        let a_approves_b = count(team_b, team_a);
        let b_approves_a = count(team_a, team_b);
        let a_total = total_for(team_a);
        let b_total = total_for(team_b);

        let pair_total = a_approves_b + b_approves_a;
        let reciprocity_ratio = if pair_total == 0 {
            0.0
        } else {
            let min_v = a_approves_b.min(b_approves_a) as f64;
            let max_v = a_approves_b.max(b_approves_a) as f64;
            if max_v > 0.0 { min_v / max_v } else { 0.0 }
        };
        let a_concentration = if a_total > 0 { a_approves_b as f64 / a_total as f64 } else { 0.0 };
        let b_concentration = if b_total > 0 { b_approves_a as f64 / b_total as f64 } else { 0.0 };
        let is_suspicious =
            reciprocity_ratio > 0.7 && pair_total >= 4 && (a_concentration > 0.5 || b_concentration > 0.5);

        ApprovalReciprocityReport {
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            a_approves_b,
            b_approves_a,
            a_total_approvals: a_total,
            b_total_approvals: b_total,
            pair_total,
            reciprocity_ratio,
            a_concentration,
            b_concentration,
            is_suspicious,
        }
    }

    pub async fn get_approval_reciprocity_report(&self) -> ApprovalReciprocitySummary {
        let records = self.approval_records.read().await;
        let mut participants: HashSet<String> = HashSet::new();
        for r in records.iter() {
            participants.insert(r.proposing_team_id.clone());
            participants.insert(r.approving_team_id.clone());
        }
        drop(records);
        let teams: Vec<String> = participants.into_iter().collect();

        if teams.len() < 2 {
            return ApprovalReciprocitySummary {
                total_teams: teams.len(),
                pairs_analyzed: 0,
                flagged_pairs: Vec::new(),
                collusion_ratio: 0.0,
                health: "healthy".to_string(),
            };
        }

        let mut flagged = Vec::new();
        let mut pair_count = 0usize;
        for i in 0..teams.len() {
            for j in (i + 1)..teams.len() {
                pair_count += 1;
                let report = self.check_approval_reciprocity(&teams[i], &teams[j]).await;
                if report.is_suspicious {
                    flagged.push(report);
                }
            }
        }

        let health = if flagged.len() > 2 {
            "critical"
        } else if !flagged.is_empty() {
            "warning"
        } else {
            "healthy"
        };

        ApprovalReciprocitySummary {
            total_teams: teams.len(),
            pairs_analyzed: pair_count,
            collusion_ratio: flagged.len() as f64 / pair_count.max(1) as f64,
            flagged_pairs: flagged,
            health: health.to_string(),
        }
    }

    /// DFS cycle search over the approver→proposer graph (edge direction:
    /// who benefits from whose approval). Chain collusion (A approves B,
    /// B approves C, C approves A) evades pairwise reciprocity because each
    /// edge looks one-directional in isolation (spec §4.9).
    pub async fn detect_approval_cycles(&self, min_cycle_length: usize, min_approvals: u64) -> CycleReport {
        let records = self.approval_records.read().await;
        let mut edge_counts: HashMap<(String, String), u64> = HashMap::new();
        for r in records.iter() {
            *edge_counts.entry((r.approving_team_id.clone(), r.proposing_team_id.clone())).or_insert(0) += 1;
        }
        drop(records);
        edge_counts.retain(|_, count| *count >= min_approvals);

        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        let mut nodes: HashSet<String> = HashSet::new();
        for (approver, proposer) in edge_counts.keys() {
            graph.entry(approver.clone()).or_default().push(proposer.clone());
            nodes.insert(approver.clone());
            nodes.insert(proposer.clone());
        }

        let mut all_cycles: Vec<Vec<String>> = Vec::new();
        let mut seen_edge_sets: HashSet<Vec<(String, String)>> = HashSet::new();

        for start in &nodes {
            let mut stack: Vec<(String, Vec<String>, HashSet<String>)> =
                vec![(start.clone(), vec![start.clone()], HashSet::from([start.clone()]))];
            while let Some((node, path, visited)) = stack.pop() {
                let Some(neighbors) = graph.get(&node) else { continue };
                for neighbor in neighbors {
                    if neighbor == start && path.len() >= min_cycle_length {
                        let mut cycle = path.clone();
                        cycle.push(start.clone());
                        let mut edges: Vec<(String, String)> =
                            (0..cycle.len() - 1).map(|i| (cycle[i].clone(), cycle[i + 1].clone())).collect();
                        edges.sort();
                        if seen_edge_sets.insert(edges) {
                            all_cycles.push(cycle);
                        }
                    } else if !visited.contains(neighbor) {
                        let mut next_path = path.clone();
                        next_path.push(neighbor.clone());
                        let mut next_visited = visited.clone();
                        next_visited.insert(neighbor.clone());
                        stack.push((neighbor.clone(), next_path, next_visited));
                    }
                }
            }
        }

        let mut flagged = Vec::new();
        for cycle in &all_cycles {
            let edge_weights: Vec<u64> = (0..cycle.len() - 1)
                .map(|i| *edge_counts.get(&(cycle[i].clone(), cycle[i + 1].clone())).unwrap_or(&0))
                .collect();
            let total_approvals: u64 = edge_weights.iter().sum();
            let avg_per_edge = total_approvals as f64 / (cycle.len() - 1) as f64;
            let min_w = *edge_weights.iter().min().unwrap_or(&0);
            let max_w = *edge_weights.iter().max().unwrap_or(&0);
            let balance_ratio = if max_w > 0 { min_w as f64 / max_w as f64 } else { 0.0 };
            let is_suspicious = balance_ratio > 0.5 && avg_per_edge >= min_approvals as f64;

            flagged.push(ApprovalCycle {
                cycle: cycle.clone(),
                length: cycle.len() - 1,
                total_approvals,
                avg_per_edge,
                balance_ratio,
                is_suspicious,
                edge_weights,
            });
        }
        flagged.sort_by(|a, b| {
            b.is_suspicious.cmp(&a.is_suspicious).then(b.total_approvals.cmp(&a.total_approvals))
        });

        let suspicious_count = flagged.iter().filter(|c| c.is_suspicious).count();
        let health = if suspicious_count > 2 {
            "critical"
        } else if suspicious_count > 0 {
            "warning"
        } else {
            "healthy"
        };

        CycleReport {
            total_cycles: all_cycles.len(),
            suspicious_cycles: suspicious_count,
            cycles: flagged,
            graph_nodes: nodes.len(),
            graph_edges: edge_counts.len(),
            health: health.to_string(),
        }
    }

    /// Flags approvals that land suspiciously soon after proposal creation
    /// (spec §4.9): any approval under 60s, or an average under 300s with
    /// every approval inside a 600s window.
    pub fn analyze_approval_timing(&self, proposal_id: &str) -> Result<TemporalAnalysis> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or_else(|| GovernanceError::not_found("cross_team_proposal", proposal_id))?;

        if proposal.approvals.is_empty() {
            return Ok(TemporalAnalysis {
                proposal_id: proposal_id.to_string(),
                approval_count: 0,
                fastest_approval_seconds: None,
                average_approval_seconds: None,
                approval_times: Vec::new(),
                is_suspicious: false,
                reason: "no approvals yet".to_string(),
            });
        }

        let approval_times: Vec<ApprovalTiming> = proposal
            .approvals
            .iter()
            .map(|(team_id, approval)| ApprovalTiming {
                team_id: team_id.clone(),
                seconds: (approval.timestamp - proposal.created_at).num_milliseconds() as f64 / 1000.0,
            })
            .collect();

        let fastest = approval_times.iter().map(|t| t.seconds).fold(f64::INFINITY, f64::min);
        let slowest = approval_times.iter().map(|t| t.seconds).fold(f64::NEG_INFINITY, f64::max);
        let average = approval_times.iter().map(|t| t.seconds).sum::<f64>() / approval_times.len() as f64;

        let very_fast = fastest < 60.0;
        let fast_average = average < 300.0;
        let all_fast = slowest < 600.0;
        let is_suspicious = very_fast || (fast_average && all_fast);

        let mut reasons = Vec::new();
        if very_fast {
            reasons.push(format!("approval within {fastest:.0}s"));
        }
        if fast_average {
            reasons.push(format!("average {average:.0}s"));
        }
        if all_fast {
            reasons.push("all approvals within 10 minutes".to_string());
        }

        Ok(TemporalAnalysis {
            proposal_id: proposal_id.to_string(),
            approval_count: approval_times.len(),
            fastest_approval_seconds: Some(fastest),
            average_approval_seconds: Some(average),
            approval_times,
            is_suspicious,
            reason: if reasons.is_empty() { "normal timing".to_string() } else { reasons.join("; ") },
        })
    }

    pub fn get_temporal_analysis_report(&self) -> TemporalAnalysisReport {
        let mut flagged = Vec::new();
        let mut normal_count = 0usize;
        for proposal in self.proposals.iter().filter(|p| p.status == CrossTeamStatus::Approved) {
            if let Ok(analysis) = self.analyze_approval_timing(&proposal.proposal_id) {
                if analysis.is_suspicious {
                    flagged.push(analysis);
                } else {
                    normal_count += 1;
                }
            }
        }
        let total = flagged.len() + normal_count;
        let health = if total == 0 {
            "healthy"
        } else if flagged.len() as f64 / total as f64 > 0.5 {
            "critical"
        } else if !flagged.is_empty() {
            "warning"
        } else {
            "healthy"
        };

        TemporalAnalysisReport {
            total_proposals: total,
            flagged_count: flagged.len(),
            normal_count,
            flagged_proposals: flagged,
            health: health.to_string(),
        }
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(bytes.as_ref().len() * 2);
        for byte in bytes.as_ref() {
            write!(out, "{byte:02x}").expect("writing to a String never fails");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FederationRegistry {
        FederationRegistry::new("/tmp/federation-test.db")
    }

    fn register(reg: &FederationRegistry, id: &str, creator: &str) {
        reg.register_team(id, id, vec![], None, "", creator, 5).unwrap();
    }

    #[tokio::test]
    async fn witness_score_recalculates_with_bayesian_smoothing() {
        let reg = registry();
        register(&reg, "team:a", "");
        register(&reg, "team:b", "");

        reg.record_witness_event("team:b", "team:a", "b:m1", "msig:1").await.unwrap();
        reg.update_witness_outcome("msig:1", WitnessOutcome::Succeeded).await;

        let team_b = reg.get_team("team:b").unwrap();
        assert_eq!(team_b.witness_successes, 1);
        assert!((team_b.witness_score - 6.0 / 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reciprocity_flags_balanced_mutual_witnessing() {
        let reg = registry();
        register(&reg, "team:a", "");
        register(&reg, "team:b", "");

        for i in 0..4 {
            reg.record_witness_event("team:a", "team:b", "a:m", &format!("p{i}")).await.unwrap();
            reg.record_witness_event("team:b", "team:a", "b:m", &format!("q{i}")).await.unwrap();
        }

        let report = reg.check_reciprocity("team:a", "team:b").await;
        assert!(report.is_suspicious);
    }

    #[tokio::test]
    async fn lineage_flags_same_creator_teams() {
        let reg = registry();
        register(&reg, "team:a", "web4:soft:founder:x");
        register(&reg, "team:b", "web4:soft:founder:x");

        reg.record_witness_event("team:a", "team:b", "a:m", "msig:1").await.unwrap();

        let lineage = reg.get_lineage_report().await;
        assert_eq!(lineage.multi_team_creators.len(), 1);
        assert_eq!(lineage.health, "critical");
    }

    #[test]
    fn signed_pattern_round_trips_and_rejects_tampering() {
        let reg = registry();
        let signed = reg.sign_pattern("collusion_report", serde_json::json!({"health": "healthy"}), "federation:system");
        assert!(reg.verify_pattern_signature(&signed));

        let mut tampered = signed.clone();
        tampered.data = serde_json::json!({"health": "critical"});
        assert!(!reg.verify_pattern_signature(&tampered));
    }

    #[tokio::test]
    async fn cross_team_veto_proposal_is_rejected_by_a_single_no() {
        let reg = registry();
        register(&reg, "team:a", "");
        register(&reg, "team:b", "");
        register(&reg, "team:c", "");

        let proposal = reg
            .create_cross_team_proposal(
                "team:a",
                "a:admin",
                "shared_budget",
                "fund the thing",
                vec!["team:b".to_string(), "team:c".to_string()],
                None,
                None,
                false,
                vec![],
                VotingMode::Veto,
                0.5,
            )
            .unwrap();

        let rejected = reg
            .reject_cross_team_proposal(&proposal.proposal_id, "team:b", "b:admin", "not now")
            .await
            .unwrap();
        assert_eq!(rejected.status, CrossTeamStatus::Rejected);
    }

    #[tokio::test]
    async fn weighted_proposal_approves_once_threshold_cleared() {
        let reg = registry();
        register(&reg, "team:a", "");
        register(&reg, "team:b", "");
        register(&reg, "team:c", "");

        let proposal = reg
            .create_cross_team_proposal(
                "team:a",
                "a:admin",
                "shared_budget",
                "fund the thing",
                vec!["team:b".to_string(), "team:c".to_string()],
                None,
                None,
                false,
                vec![],
                VotingMode::Weighted,
                0.5,
            )
            .unwrap();

        let approved = reg
            .approve_cross_team_proposal(&proposal.proposal_id, "team:b", "b:admin")
            .await
            .unwrap();
        assert_eq!(approved.status, CrossTeamStatus::Approved);
    }

    #[tokio::test]
    async fn detects_a_three_team_approval_cycle() {
        let reg = registry();
        register(&reg, "team:a", "");
        register(&reg, "team:b", "");
        register(&reg, "team:c", "");

        for i in 0..2 {
            let p = reg
                .create_cross_team_proposal(
                    "team:a", "a:admin", "x", "x", vec!["team:b".to_string()], None, None, false, vec![],
                    VotingMode::Veto, 0.5,
                )
                .unwrap();
            reg.approve_cross_team_proposal(&p.proposal_id, "team:b", "b:admin").await.ok();
            let _ = i;
        }
        for _ in 0..2 {
            let p = reg
                .create_cross_team_proposal(
                    "team:b", "b:admin", "x", "x", vec!["team:c".to_string()], None, None, false, vec![],
                    VotingMode::Veto, 0.5,
                )
                .unwrap();
            reg.approve_cross_team_proposal(&p.proposal_id, "team:c", "c:admin").await.ok();
        }
        for _ in 0..2 {
            let p = reg
                .create_cross_team_proposal(
                    "team:c", "c:admin", "x", "x", vec!["team:a".to_string()], None, None, false, vec![],
                    VotingMode::Veto, 0.5,
                )
                .unwrap();
            reg.approve_cross_team_proposal(&p.proposal_id, "team:a", "a:admin").await.ok();
        }

        let report = reg.detect_approval_cycles(3, 2).await;
        assert!(report.total_cycles >= 1);
    }
}
