//! `Team`: the aggregate owning every member mutation (spec §4.6). No other
//! layer is permitted to mutate a member directly — all state changes funnel
//! through these methods so every one of them can be audited and, where it
//! touches economic or trust state, heartbeat-recorded.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use dashmap::DashMap;
use hardbound_core::hash::hex_sha256;
use hardbound_core::{GovernanceError, Lct, MetabolicState, Result, Role};
use hardbound_heartbeat::{Block, HeartbeatLedger, MetabolicTransition};
use hardbound_ledger::{AuditStatus, ChainVerification as LedgerChainVerification, Ledger};
use hardbound_policy::{Policy, PolicyStore};
use hardbound_trust::{Outcome, TrustVector};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::sybil;
use crate::types::{HealthReport, Member, TeamConfig, TrustStats, WitnessStats};

/// A team: its members, its own hash-chained audit and heartbeat history,
/// and the policy it currently enforces (spec §3.1).
pub struct Team {
    /// Session key this team's audit trail and heartbeat chain are keyed by.
    pub team_id: String,
    /// This team's own LCT — a team is itself an entity, not just a container.
    pub team_lct: Lct,
    pub config: TeamConfig,
    pub created_at: chrono::DateTime<Utc>,
    admin_lct: RwLock<Option<Lct>>,
    members: DashMap<String, Member>,
    ledger: Ledger,
    heartbeat: HeartbeatLedger,
    policy: Mutex<Policy>,
}

impl Team {
    /// Create a new team and record its genesis audit entry.
    pub async fn create(config: TeamConfig) -> Result<Self> {
        let now = Utc::now();
        let seed = format!("team:{}:{}", config.name, now.to_rfc3339());
        let hash = hex_sha256(seed.as_bytes());
        let short = &hash[..12];
        let team_id = format!("web4:team:{short}");
        let team_lct = Lct::new_unchecked(format!("web4:team:entity:{short}"));

        let ledger = Ledger::new();
        ledger.start_session(&team_id, team_lct.clone(), None, None)?;
        let heartbeat = HeartbeatLedger::new(team_id.clone(), config.initial_atp_reserve);

        let team = Self {
            team_id,
            team_lct,
            config,
            created_at: now,
            admin_lct: RwLock::new(None),
            members: DashMap::new(),
            ledger,
            heartbeat,
            policy: Mutex::new(Policy::new_default()),
        };

        team.ledger
            .record_audit(
                &team.team_id,
                "team_created",
                "team",
                None,
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({ "name": team.config.name })),
            )
            .await?;
        Ok(team)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub async fn admin(&self) -> Option<Lct> {
        self.admin_lct.read().await.clone()
    }

    async fn verify_admin(&self, lct: &Lct) -> bool {
        self.admin_lct.read().await.as_ref() == Some(lct)
    }

    /// Bind (or rebind) the team's admin. Hardware binding and multi-sig
    /// transfer flows live outside this crate (spec §4.6, §6) — this only
    /// records the new admin LCT.
    pub async fn set_admin(&self, lct: Lct) -> Result<()> {
        *self.admin_lct.write().await = Some(lct.clone());
        self.ledger
            .record_audit(
                &self.team_id,
                "admin_set",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                None,
            )
            .await?;
        info!(team_id = %self.team_id, admin = %lct, "admin set");
        Ok(())
    }

    /// Add a member at baseline trust (spec §3.2 baseline = 0.5 on every
    /// dimension). `rejoin_at` is set to now for every add — a fresh join
    /// and a rejoin look identical at this layer, so both start the 72h
    /// witnessing cooldown.
    pub async fn add_member(&self, lct: Lct, role: Role, atp_budget: Option<f64>) -> Result<()> {
        if self.members.contains_key(lct.as_str()) {
            return Err(GovernanceError::already_exists("member", lct.as_str()));
        }
        let now = Utc::now();
        let budget = atp_budget.unwrap_or(self.config.default_member_budget);
        let member = Member::new(lct.clone(), role, budget, now);
        self.members.insert(lct.as_str().to_string(), member);

        self.ledger
            .record_audit(
                &self.team_id,
                "member_added",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({ "role": role, "atp_budget": budget })),
            )
            .await?;
        info!(team_id = %self.team_id, member = %lct, %role, "member added");
        Ok(())
    }

    pub fn get_member(&self, lct: &str) -> Option<Member> {
        self.members.get(lct).map(|entry| entry.value().clone())
    }

    pub fn list_members(&self) -> Vec<Member> {
        self.members.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Change a member's role. Requires the current admin (spec §4.6).
    pub async fn update_member_role(&self, lct: &str, new_role: Role, requester: &Lct) -> Result<Role> {
        if !self.verify_admin(requester).await {
            return Err(GovernanceError::permission_denied(
                "only the team admin may change member roles",
            ));
        }
        let old_role = {
            let mut entry = self
                .members
                .get_mut(lct)
                .ok_or_else(|| GovernanceError::not_found("member", lct))?;
            let old = entry.role;
            entry.role = new_role;
            old
        };

        self.ledger
            .record_audit(
                &self.team_id,
                "role_changed",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({ "from": old_role, "to": new_role })),
            )
            .await?;
        Ok(old_role)
    }

    /// Remove a member, archiving their trust state (the archived `Member`
    /// is returned so callers can restore it on rejoin). Requires admin
    /// authorization unless `via_multisig` names the proposal that approved
    /// it (spec §4.6, §4.8).
    pub async fn remove_member(
        &self,
        lct: &str,
        requester: Option<&Lct>,
        reason: &str,
        via_multisig: Option<&str>,
    ) -> Result<Member> {
        if self.admin_lct.read().await.as_ref().map(|a| a.as_str()) == Some(lct) {
            return Err(GovernanceError::invalid_state(
                "a non-admin member",
                format!("admin '{lct}'; transfer admin via multi-sig before removal"),
            ));
        }

        let authorized = match via_multisig {
            Some(_) => true,
            None => match requester {
                Some(r) => self.verify_admin(r).await,
                None => false,
            },
        };
        if !authorized {
            return Err(GovernanceError::permission_denied(
                "member removal requires admin authorization or an approved multi-sig proposal",
            ));
        }

        let (_, archived) = self
            .members
            .remove(lct)
            .ok_or_else(|| GovernanceError::not_found("member", lct))?;

        self.ledger
            .record_audit(
                &self.team_id,
                "member_removed",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({
                    "reason": reason,
                    "via_multisig": via_multisig,
                    "remaining_members": self.members.len(),
                })),
            )
            .await?;
        info!(team_id = %self.team_id, member = lct, reason, "member removed");
        Ok(archived)
    }

    /// Restore a previously-removed member, carrying over their archived
    /// trust and witness history (spec §3.1 "witness log persists across
    /// remove/re-add") and resetting the 72h witnessing cooldown.
    pub async fn rejoin_member(&self, archived: Member) -> Result<()> {
        if self.members.contains_key(archived.lct_id.as_str()) {
            return Err(GovernanceError::already_exists("member", archived.lct_id.as_str()));
        }
        let now = Utc::now();
        let lct = archived.lct_id.clone();
        let mut member = archived;
        member.rejoin_at = Some(now);
        self.members.insert(lct.as_str().to_string(), member);

        self.ledger
            .record_audit(
                &self.team_id,
                "member_rejoined",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                None,
            )
            .await?;
        Ok(())
    }

    /// Debit ATP from a member's budget and submit a heartbeat transaction
    /// for the spend (spec §4.6: economic mutations submit a heartbeat tx).
    pub async fn consume_member_atp(&self, lct: &str, amount: f64) -> Result<f64> {
        let remaining = {
            let mut entry = self
                .members
                .get_mut(lct)
                .ok_or_else(|| GovernanceError::not_found("member", lct))?;
            let remaining = entry.atp_remaining();
            if amount > remaining {
                return Err(GovernanceError::insufficient(
                    "atp",
                    amount.to_string(),
                    remaining.to_string(),
                ));
            }
            entry.atp_consumed += amount;
            entry.action_count += 1;
            entry.activity_window.record("atp_consumed", amount, Utc::now());
            entry.atp_remaining()
        };

        self.heartbeat
            .submit_transaction(
                "atp_consumed",
                lct,
                serde_json::json!({ "amount": amount }),
                None,
                amount,
            )
            .await?;
        self.ledger
            .record_audit(
                &self.team_id,
                "atp_consumed",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({ "amount": amount, "remaining": remaining })),
            )
            .await?;
        Ok(remaining)
    }

    /// Credit ATP back to a member's budget, scaled by how the work turned
    /// out: full reward on success, half on a partial outcome, none on
    /// failure (spec §4.6, mirroring the 50% cost-recovery rule used for R6
    /// execution rewards — see `DESIGN.md`).
    pub async fn reward_member_atp(&self, lct: &str, outcome: Outcome, base_reward: f64) -> Result<f64> {
        let multiplier = match outcome {
            Outcome::Success => 1.0,
            Outcome::Partial => 0.5,
            Outcome::Failure => 0.0,
        };
        let amount = base_reward * multiplier;

        let new_budget = {
            let mut entry = self
                .members
                .get_mut(lct)
                .ok_or_else(|| GovernanceError::not_found("member", lct))?;
            entry.atp_budget += amount;
            entry.atp_budget
        };

        if amount > 0.0 {
            self.heartbeat
                .submit_transaction(
                    "atp_rewarded",
                    lct,
                    serde_json::json!({ "amount": amount, "outcome": outcome }),
                    None,
                    0.0,
                )
                .await?;
        }
        self.ledger
            .record_audit(
                &self.team_id,
                "atp_rewarded",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({ "amount": amount, "outcome": outcome })),
            )
            .await?;
        Ok(new_budget)
    }

    pub fn get_member_atp(&self, lct: &str) -> f64 {
        self.members.get(lct).map(|m| m.atp_remaining()).unwrap_or(0.0)
    }

    /// Apply decay-then-outcome to a member's trust vector via the trust
    /// engine, then record the mutation (spec §4.6, §4.4).
    pub async fn update_member_trust(&self, lct: &str, outcome: Outcome, magnitude: f64) -> Result<TrustVector> {
        let metabolic_state = self.heartbeat.state().await;
        let now = Utc::now();

        let updated = {
            let mut entry = self
                .members
                .get_mut(lct)
                .ok_or_else(|| GovernanceError::not_found("member", lct))?;
            entry.activity_window.record("trust_update", 0.0, now);
            let effective_count = hardbound_trust::effective_action_count(&entry.activity_window, now);
            let updated = hardbound_trust::apply_outcome(
                entry.trust,
                entry.last_trust_update,
                now,
                effective_count,
                metabolic_state,
                outcome,
                magnitude,
                &mut entry.velocity,
            );
            entry.trust = updated;
            entry.last_trust_update = now;
            entry.action_count += 1;
            updated
        };

        self.heartbeat
            .submit_transaction(
                "trust_update",
                lct,
                serde_json::json!({ "outcome": outcome, "magnitude": magnitude }),
                None,
                0.0,
            )
            .await?;
        self.ledger
            .record_audit(
                &self.team_id,
                "trust_updated",
                "team",
                Some(lct.to_string()),
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({ "outcome": outcome, "magnitude": magnitude })),
            )
            .await?;
        Ok(updated)
    }

    /// One member witnessing another (spec §4.6, §4.4). `witness` need not
    /// itself be a current member (external attestors are allowed), but
    /// `target` must be.
    pub async fn witness_member(&self, witness: &str, target: &str, quality: f64) -> Result<TrustVector> {
        if witness == target {
            return Err(GovernanceError::validation(
                "witness",
                "a member cannot witness themselves",
            ));
        }
        let now = Utc::now();

        let updated = {
            let mut entry = self
                .members
                .get_mut(target)
                .ok_or_else(|| GovernanceError::not_found("member", target))?;
            let rejoin_at = entry.rejoin_at;
            let updated = hardbound_trust::witness(
                entry.trust,
                &mut entry.witness_log,
                witness,
                quality,
                now,
                rejoin_at,
                &mut entry.velocity,
            )
            .map_err(|reason| GovernanceError::validation("witness", reason))?;
            entry.trust = updated;
            entry.last_trust_update = now;
            entry.activity_window.record("witness_received", 0.0, now);
            updated
        };
        if let Some(mut entry) = self.members.get_mut(witness) {
            entry.activity_window.record("witness_given", 0.0, now);
        }

        self.heartbeat
            .submit_transaction(
                "witness",
                witness,
                serde_json::json!({ "target": target, "quality": quality }),
                Some(target.to_string()),
                0.0,
            )
            .await?;
        self.ledger
            .record_audit(
                &self.team_id,
                "witness_attestation",
                "team",
                Some(target.to_string()),
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({ "witness": witness, "quality": quality })),
            )
            .await?;
        Ok(updated)
    }

    /// Transition the team's metabolic state, running wake recalibration
    /// across every member when exiting dormancy (spec §4.2, §4.4, §4.6).
    pub async fn metabolic_transition(
        &self,
        to_state: MetabolicState,
        trigger: &str,
    ) -> Result<MetabolicTransition> {
        let from_state = self.heartbeat.state().await;
        let transition = self.heartbeat.transition_state(to_state, trigger.to_string(), None).await?;

        if from_state.is_dormant() && !to_state.is_dormant() {
            let dormancy_secs = estimate_dormancy_secs(from_state, transition.atp_cost);
            let mut recalibrated_count = 0usize;
            for mut entry in self.members.iter_mut() {
                entry.trust = hardbound_trust::wake_recalibrate(entry.trust, dormancy_secs);
                recalibrated_count += 1;
            }
            if recalibrated_count > 0 {
                self.ledger
                    .record_audit(
                        &self.team_id,
                        "wake_recalibration",
                        "team",
                        None,
                        None,
                        None,
                        AuditStatus::Success,
                        Some(serde_json::json!({
                            "dormancy_secs": dormancy_secs,
                            "members_recalibrated": recalibrated_count,
                        })),
                    )
                    .await?;
            }
        }

        self.ledger
            .record_audit(
                &self.team_id,
                "metabolic_transition",
                "team",
                None,
                None,
                None,
                AuditStatus::Success,
                Some(serde_json::json!({
                    "from": from_state,
                    "to": to_state,
                    "trigger": trigger,
                    "atp_cost": transition.atp_cost,
                })),
            )
            .await?;
        Ok(transition)
    }

    /// Seal pending transactions into a heartbeat block, sentinel-witnessed
    /// by the caller if given, else by the current admin (spec §4.6).
    pub async fn pulse(&self, sentinel: Option<&Lct>) -> Result<Block> {
        let sentinel = match sentinel {
            Some(lct) => Some(lct.to_string()),
            None => self.admin_lct.read().await.as_ref().map(|l| l.to_string()),
        };
        self.heartbeat.heartbeat(sentinel).await
    }

    /// Read the team's current policy.
    pub async fn get_policy(&self) -> Policy {
        self.policy.lock().await.clone()
    }

    /// Replace the team's policy and persist the new version to the ledger
    /// (spec §4.5, §4.6).
    pub async fn set_policy(&self, new_policy: Policy) -> Result<()> {
        {
            let mut guard = self.policy.lock().await;
            *guard = new_policy.clone();
        }
        let store = PolicyStore::new(&self.ledger, &self.team_id);
        store.record_version(&new_policy).await
    }

    pub async fn get_policy_history(&self) -> Result<Vec<Policy>> {
        PolicyStore::new(&self.ledger, &self.team_id).history().await
    }

    pub async fn verify_policy_chain(&self) -> Result<LedgerChainVerification> {
        PolicyStore::new(&self.ledger, &self.team_id).verify_history().await
    }

    pub async fn get_audit_trail(&self) -> Result<Vec<hardbound_ledger::AuditRecord>> {
        self.ledger.get_session_audit_trail(&self.team_id).await
    }

    pub async fn verify_audit_chain(&self) -> Result<LedgerChainVerification> {
        self.ledger.verify_audit_chain(&self.team_id).await
    }

    pub async fn verify_heartbeat_chain(&self) -> Result<hardbound_heartbeat::ChainVerification> {
        self.heartbeat.verify_chain().await
    }

    /// Full health audit: Sybil-cluster analysis, trust-score distribution,
    /// witness statistics, a composite 0-100 score, and remediation
    /// recommendations (spec §4.6, supplemented by `sybil_detection.py`).
    pub async fn audit_health(&self) -> HealthReport {
        let now = Utc::now();
        let metabolic_state = self.heartbeat.state().await;

        let members: Vec<Member> = self.list_members();
        let member_count = members.len();

        let mut member_trusts: BTreeMap<String, TrustVector> = BTreeMap::new();
        let mut decayed_scores: BTreeMap<String, f64> = BTreeMap::new();
        let mut witness_pairs: Vec<(String, String)> = Vec::new();
        let mut witness_health: HashMap<String, WitnessStats> = HashMap::new();

        for member in &members {
            let id = member.lct_id.as_str().to_string();
            member_trusts.insert(id.clone(), member.trust);

            let effective_count = hardbound_trust::effective_action_count(&member.activity_window, now);
            let decayed = hardbound_trust::apply_decay(
                member.trust,
                member.last_trust_update,
                now,
                effective_count,
                metabolic_state,
            );
            decayed_scores.insert(id.clone(), decayed.score());

            let mut total_attestations = 0usize;
            for (witness_lct, timestamps) in &member.witness_log.by_witness {
                total_attestations += timestamps.len();
                for _ in timestamps {
                    witness_pairs.push((witness_lct.clone(), id.clone()));
                }
            }
            witness_health.insert(
                id,
                WitnessStats {
                    total_attestations,
                    unique_witnesses: member.witness_log.by_witness.len(),
                },
            );
        }

        let sybil_report = sybil::analyze_team(
            &self.team_id,
            &member_trusts,
            None,
            if witness_pairs.is_empty() { None } else { Some(&witness_pairs) },
            now,
        );

        let trust = trust_stats(&decayed_scores);

        let mut score: i64 = 100;
        score -= match sybil_report.overall_risk {
            crate::types::SybilRisk::Critical => 40,
            crate::types::SybilRisk::High => 25,
            crate::types::SybilRisk::Moderate => 15,
            crate::types::SybilRisk::Low | crate::types::SybilRisk::None => 0,
        };
        score -= (trust.low_trust_members.len() as i64 * 5).min(20);
        let health_score = score.max(0);

        let mut recommendations = sybil_report.recommendations.clone();
        if trust.low_trust_members.len() > member_count / 3 && member_count > 0 {
            recommendations.push("a large fraction of members are low-trust; review onboarding".to_string());
        }

        HealthReport {
            team_id: self.team_id.clone(),
            member_count,
            timestamp: now,
            sybil: sybil_report,
            trust,
            witness_health,
            health_score,
            recommendations,
        }
    }

    /// `true` if `lct` is the team's current admin.
    pub async fn is_admin(&self, lct: &str) -> bool {
        self.admin_lct.read().await.as_ref().map(|a| a.as_str()) == Some(lct)
    }

    /// Record an audit entry against this team's own session from an
    /// external crate layered on top of `Team` (R6, multi-sig, federation).
    /// Keeps those layers from needing their own ledger session while still
    /// funneling every mutation through the team's hash chain (spec §4.6).
    pub async fn record_external_audit(
        &self,
        action_type: &str,
        target: Option<String>,
        data: serde_json::Value,
    ) -> Result<()> {
        self.ledger
            .record_audit(
                &self.team_id,
                action_type,
                "hardbound",
                target,
                None,
                None,
                AuditStatus::Success,
                Some(data),
            )
            .await?;
        Ok(())
    }

    /// Submit a heartbeat transaction on this team's chain from an external
    /// layer (R6, multi-sig). Never consumes ATP outside `consume_member_atp`
    /// — this just records the event for the next `pulse`.
    pub async fn submit_external_transaction(
        &self,
        tx_type: &str,
        actor_lct: &str,
        data: serde_json::Value,
        target_lct: Option<String>,
        atp_cost: f64,
    ) -> Result<()> {
        self.heartbeat
            .submit_transaction(tx_type, actor_lct, data, target_lct, atp_cost)
            .await?;
        Ok(())
    }

    /// A member's weighted aggregate trust score, decayed to `now` (spec
    /// §4.4, §4.6). Unlike [`Member::trust_score`], which reads the raw
    /// stored vector, this is what policy and R6 checks use.
    pub async fn get_member_trust_score(&self, lct: &str) -> Option<f64> {
        let metabolic_state = self.heartbeat.state().await;
        let now = Utc::now();
        let entry = self.members.get(lct)?;
        let effective_count = hardbound_trust::effective_action_count(&entry.activity_window, now);
        let decayed = hardbound_trust::apply_decay(
            entry.trust,
            entry.last_trust_update,
            now,
            effective_count,
            metabolic_state,
        );
        Some(decayed.score())
    }
}

fn trust_stats(scores: &BTreeMap<String, f64>) -> TrustStats {
    if scores.is_empty() {
        return TrustStats {
            avg: 0.0,
            min: 0.0,
            max: 0.0,
            low_trust_members: Vec::new(),
            high_trust_members: Vec::new(),
        };
    }
    let values: Vec<f64> = scores.values().copied().collect();
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let low_trust_members = scores
        .iter()
        .filter(|(_, &s)| s < 0.3)
        .map(|(id, _)| id.clone())
        .collect();
    let high_trust_members = scores
        .iter()
        .filter(|(_, &s)| s > 0.85)
        .map(|(id, _)| id.clone())
        .collect();
    TrustStats {
        avg,
        min,
        max,
        low_trust_members,
        high_trust_members,
    }
}

/// Recover how long a team spent in a dormant state from the wake penalty
/// charged on exit, inverting `hardbound_heartbeat`'s `wake_penalty` formula.
/// States without a wake-penalty formula (torpor, estivation) fall back to a
/// flat one-day estimate.
fn estimate_dormancy_secs(from_state: MetabolicState, atp_cost: f64) -> f64 {
    match (from_state.min_dwell_secs(), from_state.wake_penalty_atp()) {
        (Some(min_dwell), full_penalty) if full_penalty > 0.0 => {
            let incompleteness = (atp_cost / full_penalty).clamp(0.0, 1.0);
            min_dwell as f64 * (1.0 - incompleteness)
        }
        _ => 86_400.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_lct(n: usize) -> Lct {
        Lct::new_unchecked(format!("web4:soft:member:m{n}"))
    }

    async fn fresh_team() -> Team {
        Team::create(TeamConfig::new("test-team")).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_add_member() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        assert_eq!(team.member_count(), 1);
        let member = team.get_member("web4:soft:member:m1").unwrap();
        assert_eq!(member.atp_budget, team.config.default_member_budget);
        assert!((member.trust_score() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cannot_add_the_same_member_twice() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        let err = team.add_member(member_lct(1), Role::Developer, None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn role_change_requires_admin() {
        let team = fresh_team().await;
        let admin = Lct::new_unchecked("web4:soft:admin:a1");
        team.set_admin(admin.clone()).await.unwrap();
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();

        let not_admin = Lct::new_unchecked("web4:soft:member:m1");
        let err = team
            .update_member_role("web4:soft:member:m1", Role::Reviewer, &not_admin)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::PermissionDenied { .. }));

        let old = team
            .update_member_role("web4:soft:member:m1", Role::Reviewer, &admin)
            .await
            .unwrap();
        assert_eq!(old, Role::Developer);
        assert_eq!(team.get_member("web4:soft:member:m1").unwrap().role, Role::Reviewer);
    }

    #[tokio::test]
    async fn admin_cannot_be_removed_directly() {
        let team = fresh_team().await;
        let admin = Lct::new_unchecked("web4:soft:admin:a1");
        team.set_admin(admin.clone()).await.unwrap();
        team.add_member(admin.clone(), Role::Admin, None).await.unwrap();

        let err = team
            .remove_member(admin.as_str(), Some(&admin), "test", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn atp_cannot_be_overdrawn() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, Some(10.0)).await.unwrap();
        team.consume_member_atp("web4:soft:member:m1", 4.0).await.unwrap();
        let err = team.consume_member_atp("web4:soft:member:m1", 100.0).await.unwrap_err();
        assert!(matches!(err, GovernanceError::InsufficientResource { .. }));
    }

    #[tokio::test]
    async fn reward_scales_with_outcome() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, Some(10.0)).await.unwrap();
        team.reward_member_atp("web4:soft:member:m1", Outcome::Success, 10.0)
            .await
            .unwrap();
        assert_eq!(team.get_member_atp("web4:soft:member:m1"), 20.0);
        team.reward_member_atp("web4:soft:member:m1", Outcome::Failure, 10.0)
            .await
            .unwrap();
        assert_eq!(team.get_member_atp("web4:soft:member:m1"), 20.0);
    }

    #[tokio::test]
    async fn success_outcomes_raise_trust_toward_one() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        let before = team.get_member("web4:soft:member:m1").unwrap().trust_score();
        team.update_member_trust("web4:soft:member:m1", Outcome::Success, 1.0)
            .await
            .unwrap();
        let after = team.get_member("web4:soft:member:m1").unwrap().trust_score();
        assert!(after > before);
    }

    #[tokio::test]
    async fn fresh_join_has_no_witnessing_cooldown() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        team.add_member(member_lct(2), Role::Developer, None).await.unwrap();
        team.witness_member("web4:soft:member:m1", "web4:soft:member:m2", 1.0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn witnessing_is_blocked_during_rejoin_cooldown() {
        let team = fresh_team().await;
        let admin = Lct::new_unchecked("web4:soft:admin:a1");
        team.set_admin(admin.clone()).await.unwrap();
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        team.add_member(member_lct(2), Role::Developer, None).await.unwrap();

        let archived = team
            .remove_member("web4:soft:member:m2", Some(&admin), "testing rejoin", None)
            .await
            .unwrap();
        team.rejoin_member(archived).await.unwrap();

        let err = team
            .witness_member("web4:soft:member:m1", "web4:soft:member:m2", 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn cannot_witness_self() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        let err = team
            .witness_member("web4:soft:member:m1", "web4:soft:member:m1", 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn audit_health_is_clean_for_a_small_diverse_team() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        team.add_member(member_lct(2), Role::Reviewer, None).await.unwrap();
        let report = team.audit_health().await;
        assert_eq!(report.sybil.overall_risk, crate::types::SybilRisk::None);
        assert_eq!(report.member_count, 2);
    }

    #[tokio::test]
    async fn audit_trail_chain_verifies() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        let verification = team.verify_audit_chain().await.unwrap();
        assert!(verification.ok);
    }

    #[tokio::test]
    async fn velocity_cap_defeats_repeated_success_reports() {
        let team = fresh_team().await;
        team.add_member(member_lct(1), Role::Developer, None).await.unwrap();
        for _ in 0..20 {
            team.update_member_trust("web4:soft:member:m1", Outcome::Success, 0.7)
                .await
                .unwrap();
        }
        let member = team.get_member("web4:soft:member:m1").unwrap();
        assert!(
            member.trust.competence
                <= 0.5 + hardbound_trust::Dimension::Competence.daily_velocity_cap() + 1e-6
        );
    }
}
