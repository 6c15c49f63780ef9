//! Audit ledger data model (spec §3.1, §4.1).

use chrono::{DateTime, Utc};
use hardbound_core::Lct;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Pending,
}

/// One entry in a session's hash chain.
///
/// `hash` is always `H(canonical_json(self without hash))`; `previous_hash`
/// equals the prior record's `hash` or the literal `"genesis"` for sequence 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: String,
    pub sequence: u64,
    pub action_type: String,
    pub tool_name: String,
    pub target: Option<String>,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub status: AuditStatus,
    /// Opaque R6 payload, kept as `Value` since its shape is workflow-defined.
    pub r6_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub hash: String,
}

/// A fields-only view of an [`AuditRecord`] used to compute its hash — the
/// `hash` field itself is never part of its own preimage.
#[derive(Serialize)]
pub(crate) struct AuditRecordPreimage<'a> {
    pub session_id: &'a str,
    pub sequence: u64,
    pub action_type: &'a str,
    pub tool_name: &'a str,
    pub target: &'a Option<String>,
    pub input_hash: &'a Option<String>,
    pub output_hash: &'a Option<String>,
    pub status: AuditStatus,
    pub r6_data: &'a Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: &'a str,
}

impl AuditRecord {
    pub(crate) fn preimage(&self) -> AuditRecordPreimage<'_> {
        AuditRecordPreimage {
            session_id: &self.session_id,
            sequence: self.sequence,
            action_type: &self.action_type,
            tool_name: &self.tool_name,
            target: &self.target,
            input_hash: &self.input_hash,
            output_hash: &self.output_hash,
            status: self.status,
            r6_data: &self.r6_data,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
        }
    }
}

/// A session's bookkeeping row: identity, ATP budget, and chain tip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub owner_lct: Lct,
    pub project: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// `None` means unbounded (admin sessions, spec §4.1).
    pub atp_budget: Option<f64>,
    pub atp_consumed: f64,
    pub(crate) records: Vec<AuditRecord>,
}

impl Session {
    pub(crate) fn new(session_id: String, owner_lct: Lct, project: Option<String>, atp_budget: Option<f64>) -> Self {
        Self {
            session_id,
            owner_lct,
            project,
            created_at: Utc::now(),
            ended_at: None,
            atp_budget,
            atp_consumed: 0.0,
            records: Vec::new(),
        }
    }

    pub(crate) fn tip_hash(&self) -> &str {
        self.records
            .last()
            .map(|r| r.hash.as_str())
            .unwrap_or(hardbound_core::hash::GENESIS_HASH)
    }
}

/// Result of [`crate::Ledger::verify_audit_chain`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub ok: bool,
    pub first_error: Option<String>,
}
