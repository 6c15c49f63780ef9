//! R6 request/response data model (spec §4.7): Rules, Role, Request,
//! Reference, Resource are captured at creation; Result closes the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default expiry for an R6 request when the caller doesn't configure one.
pub const DEFAULT_EXPIRY_HOURS: i64 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum R6Status {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
    Cancelled,
    Expired,
}

/// An R6 request: the first five R's (Rules, Role, Request, Reference,
/// Resource) filled in at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct R6Request {
    pub r6_id: String,
    pub team_id: String,
    pub requester_lct: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// R1: Rules — which policy version this request was evaluated under.
    pub action_type: String,
    pub policy_version: u64,

    /// R2: Role — requester's role and trust at request time.
    pub requester_role: String,
    pub requester_trust: f64,

    /// R3: Request — what's being asked for.
    pub description: String,
    pub target: String,
    pub parameters: Value,

    /// R4: Reference — external context (issue, PR, discussion, ...).
    pub reference_type: String,
    pub reference_id: String,
    pub reference_data: Value,

    /// R5: Resource — the ATP cost estimate from the matched policy rule.
    pub atp_cost: f64,

    pub status: R6Status,
    pub approvals: Vec<String>,
    pub rejections: Vec<String>,

    /// Set when this request's approval mode is multi-sig and a proposal
    /// was successfully spawned for it (spec §4.7).
    pub linked_proposal_id: Option<String>,
}

impl R6Request {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// R6 Response: the 6th R (Result), filled in when the request closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct R6Response {
    pub r6_id: String,
    pub status: R6Status,
    pub closed_at: DateTime<Utc>,
    pub closed_by: String,

    pub result_type: String,
    pub result_data: Value,
    pub error_message: String,

    pub atp_consumed: f64,
    pub atp_returned: f64,
    pub trust_delta: f64,
}
