//! Policy data model (spec §3.1, §4.5).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use hardbound_core::Role;
use serde::{Deserialize, Serialize};

/// How an action gets approved before execution (spec §3.1 `PolicyRule`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    None,
    Admin,
    Peer,
    MultiSig,
}

/// One action-type → rule mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub action_type: String,
    pub allowed_roles: BTreeSet<Role>,
    pub trust_threshold: f64,
    pub atp_cost: f64,
    pub approval: ApprovalMode,
    /// Number of approvals required when `approval == MultiSig`.
    pub approval_count: u32,
    pub description: String,
}

/// Versioned, immutable-once-published rule set (spec §3.1 `Policy`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub rules: BTreeMap<String, PolicyRule>,
}
