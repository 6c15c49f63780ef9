//! `Policy`: versioned action-type rule map and permission checks (spec §4.5).

use std::collections::BTreeSet;

use chrono::Utc;
use hardbound_core::{GovernanceError, Result, Role};
use hardbound_ledger::{AuditStatus, Ledger};
use tracing::info;

use crate::types::{ApprovalMode, Policy, PolicyRule};

/// The seed rule table a new team starts with
/// (spec.md §4.9 supplement, `policy.py::DEFAULT_RULES`).
pub fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            action_type: "read".to_string(),
            allowed_roles: BTreeSet::from([
                Role::Admin,
                Role::Developer,
                Role::Reviewer,
                Role::Member,
                Role::Observer,
            ]),
            trust_threshold: 0.0,
            atp_cost: 0.0,
            approval: ApprovalMode::None,
            approval_count: 1,
            description: "Read access - available to all".to_string(),
        },
        PolicyRule {
            action_type: "write".to_string(),
            allowed_roles: BTreeSet::from([Role::Admin, Role::Developer]),
            trust_threshold: 0.5,
            atp_cost: 1.0,
            approval: ApprovalMode::None,
            approval_count: 1,
            description: "Write access - developers and above".to_string(),
        },
        PolicyRule {
            action_type: "commit".to_string(),
            allowed_roles: BTreeSet::from([Role::Admin, Role::Developer]),
            trust_threshold: 0.5,
            atp_cost: 2.0,
            approval: ApprovalMode::Peer,
            approval_count: 1,
            description: "Commit code - requires peer review".to_string(),
        },
        PolicyRule {
            action_type: "deploy".to_string(),
            allowed_roles: BTreeSet::from([Role::Admin, Role::Deployer]),
            trust_threshold: 0.7,
            atp_cost: 5.0,
            approval: ApprovalMode::Admin,
            approval_count: 1,
            description: "Deploy to environment - admin approval required".to_string(),
        },
        PolicyRule {
            action_type: "admin_action".to_string(),
            allowed_roles: BTreeSet::from([Role::Admin]),
            trust_threshold: 0.8,
            atp_cost: 10.0,
            approval: ApprovalMode::None,
            approval_count: 1,
            description: "Administrative actions - admin only".to_string(),
        },
    ]
}

impl Policy {
    /// A fresh policy seeded with the default rule table, version 1.
    pub fn new_default() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        let mut map = std::collections::BTreeMap::new();
        for rule in rules {
            map.insert(rule.action_type.clone(), rule);
        }
        Self {
            version: 1,
            created_at: Utc::now(),
            rules: map,
        }
    }

    pub fn get_rule(&self, action_type: &str) -> Option<&PolicyRule> {
        self.rules.get(action_type)
    }

    /// Add or replace a rule, bumping the version (spec §3.4 "policy
    /// version is strictly increasing on mutation").
    pub fn add_rule(&mut self, rule: PolicyRule) {
        self.rules.insert(rule.action_type.clone(), rule);
        self.version += 1;
    }

    pub fn remove_rule(&mut self, action_type: &str) -> bool {
        let removed = self.rules.remove(action_type).is_some();
        if removed {
            self.version += 1;
        }
        removed
    }

    /// Enforce role membership, trust threshold, and affordability, in that
    /// order (spec §4.5).
    pub fn check_permission(
        &self,
        action_type: &str,
        role: Role,
        trust_score: f64,
        atp_available: f64,
    ) -> (bool, String, Option<&PolicyRule>) {
        let Some(rule) = self.get_rule(action_type) else {
            return (false, format!("no policy rule for action '{action_type}'"), None);
        };

        if !rule.allowed_roles.contains(&role) {
            return (
                false,
                format!("role '{role}' not permitted for '{action_type}'"),
                Some(rule),
            );
        }
        if trust_score < rule.trust_threshold {
            return (
                false,
                format!(
                    "insufficient trust: {trust_score:.2} < {}",
                    rule.trust_threshold
                ),
                Some(rule),
            );
        }
        if atp_available < rule.atp_cost {
            return (
                false,
                format!("insufficient ATP: {atp_available} < {}", rule.atp_cost),
                Some(rule),
            );
        }
        (true, "ok".to_string(), Some(rule))
    }
}

/// Persists versioned policy snapshots into a team's ledger session so
/// policy history is itself hash-chained and verifiable (spec §4.5).
pub struct PolicyStore<'a> {
    ledger: &'a Ledger,
    session_id: String,
}

impl<'a> PolicyStore<'a> {
    pub fn new(ledger: &'a Ledger, session_id: impl Into<String>) -> Self {
        Self {
            ledger,
            session_id: session_id.into(),
        }
    }

    /// Record a policy snapshot as an audit entry carrying the full policy
    /// as its `r6_data` payload.
    pub async fn record_version(&self, policy: &Policy) -> Result<()> {
        let data = serde_json::to_value(policy)
            .map_err(|e| GovernanceError::validation("policy", e.to_string()))?;
        info!(version = policy.version, "policy version recorded");
        self.ledger
            .record_audit(
                &self.session_id,
                "policy.version",
                "policy_store",
                None,
                None,
                None,
                AuditStatus::Success,
                Some(data),
            )
            .await?;
        Ok(())
    }

    /// Reconstruct the full sequence of policy versions that have been
    /// recorded to this session.
    pub async fn history(&self) -> Result<Vec<Policy>> {
        let trail = self.ledger.get_session_audit_trail(&self.session_id).await?;
        let mut versions = Vec::new();
        for record in trail {
            if record.action_type != "policy.version" {
                continue;
            }
            if let Some(data) = record.r6_data {
                if let Ok(policy) = serde_json::from_value::<Policy>(data) {
                    versions.push(policy);
                }
            }
        }
        Ok(versions)
    }

    /// Delegate to the ledger's own chain verification.
    pub async fn verify_history(&self) -> Result<hardbound_ledger::ChainVerification> {
        self.ledger.verify_audit_chain(&self.session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_gates_admin_action_to_admins() {
        let policy = Policy::new_default();
        let (allowed, _, _) = policy.check_permission("admin_action", Role::Developer, 0.9, 100.0);
        assert!(!allowed);
        let (allowed, _, _) = policy.check_permission("admin_action", Role::Admin, 0.9, 100.0);
        assert!(allowed);
    }

    #[test]
    fn trust_threshold_is_enforced() {
        let policy = Policy::new_default();
        let (allowed, reason, _) = policy.check_permission("commit", Role::Developer, 0.2, 100.0);
        assert!(!allowed);
        assert!(reason.contains("trust"));
    }

    #[test]
    fn unknown_action_is_denied_by_default() {
        let policy = Policy::new_default();
        let (allowed, _, rule) = policy.check_permission("teleport", Role::Admin, 1.0, 100.0);
        assert!(!allowed);
        assert!(rule.is_none());
    }

    #[test]
    fn version_increases_strictly_on_mutation() {
        let mut policy = Policy::new_default();
        let v1 = policy.version;
        policy.add_rule(PolicyRule {
            action_type: "custom".to_string(),
            allowed_roles: BTreeSet::from([Role::Admin]),
            trust_threshold: 0.0,
            atp_cost: 0.0,
            approval: ApprovalMode::None,
            approval_count: 1,
            description: String::new(),
        });
        assert!(policy.version > v1);
    }

    #[tokio::test]
    async fn policy_store_round_trips_through_the_ledger() {
        let ledger = Ledger::new();
        ledger
            .start_session("policy-session", hardbound_core::Lct::new_unchecked("web4:soft:admin:a"), None, None)
            .unwrap();
        let store = PolicyStore::new(&ledger, "policy-session");

        let policy = Policy::new_default();
        store.record_version(&policy).await.unwrap();

        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, policy.version);

        let verification = store.verify_history().await.unwrap();
        assert!(verification.ok);
    }
}
