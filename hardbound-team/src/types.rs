//! Team and member data model (spec §3.1, §4.6).

use chrono::{DateTime, Utc};
use hardbound_core::{Lct, Role};
use hardbound_trust::{ActivityWindow, TrustVector, VelocityCounters, WitnessLog};
use serde::{Deserialize, Serialize};

/// Tunable knobs for a team, separate from its runtime state (spec §3.1
/// `Team` "human config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub description: String,
    pub default_member_budget: f64,
    pub action_trust_threshold: f64,
    pub admin_trust_threshold: f64,
    pub heartbeat_min_seconds: u64,
    pub heartbeat_max_seconds: u64,
    pub enable_trust_decay: bool,
    /// ATP the team's heartbeat ledger starts with.
    pub initial_atp_reserve: f64,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-team".to_string(),
            description: String::new(),
            default_member_budget: 100.0,
            action_trust_threshold: 0.5,
            admin_trust_threshold: 0.8,
            heartbeat_min_seconds: 30,
            heartbeat_max_seconds: 3600,
            enable_trust_decay: true,
            initial_atp_reserve: 1000.0,
        }
    }
}

impl TeamConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One team member: identity, role, ATP budget, and trust state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub lct_id: Lct,
    pub role: Role,
    pub atp_budget: f64,
    pub atp_consumed: f64,
    pub joined_at: DateTime<Utc>,
    pub trust: TrustVector,
    pub last_trust_update: DateTime<Utc>,
    pub action_count: u64,
    pub velocity: VelocityCounters,
    pub witness_log: WitnessLog,
    pub activity_window: ActivityWindow,
    /// Set only on rejoin after a prior removal; witnessing within 72h of
    /// this is blocked (spec §4.4 post-rejoin cooldown). `None` for a
    /// member's first-ever join — there is no lapse to guard against yet.
    pub rejoin_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new(lct_id: Lct, role: Role, atp_budget: f64, now: DateTime<Utc>) -> Self {
        Self {
            lct_id,
            role,
            atp_budget,
            atp_consumed: 0.0,
            joined_at: now,
            trust: TrustVector::default(),
            last_trust_update: now,
            action_count: 0,
            velocity: VelocityCounters::default(),
            witness_log: WitnessLog::default(),
            activity_window: ActivityWindow::default(),
            rejoin_at: None,
        }
    }

    pub fn atp_remaining(&self) -> f64 {
        self.atp_budget - self.atp_consumed
    }

    /// Weighted aggregate trust score, no decay applied.
    pub fn trust_score(&self) -> f64 {
        self.trust.score()
    }
}

/// Risk band for a [`SybilCluster`] (spec §4.6 supplement, `sybil_detection.py`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SybilRisk {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl SybilRisk {
    /// Risk band from an aggregate cluster confidence (source's cutoffs:
    /// 0.9/0.7/0.5/0.3).
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            SybilRisk::Critical
        } else if confidence >= 0.7 {
            SybilRisk::High
        } else if confidence >= 0.5 {
            SybilRisk::Moderate
        } else if confidence >= 0.3 {
            SybilRisk::Low
        } else {
            SybilRisk::None
        }
    }
}

/// A pair (or, pre-merge, a group) of members flagged by one or more
/// correlation signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SybilCluster {
    pub members: Vec<String>,
    pub confidence: f64,
    pub signals: Vec<String>,
    pub trust_correlation: f64,
    pub timing_correlation: f64,
    pub witness_concentration: f64,
    pub trust_variance: f64,
}

impl SybilCluster {
    pub fn risk(&self) -> SybilRisk {
        SybilRisk::from_confidence(self.confidence)
    }
}

/// Full Sybil analysis for one team (spec §4.6 `audit_health`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SybilReport {
    pub team_id: String,
    pub analyzed_at: DateTime<Utc>,
    pub member_count: usize,
    pub clusters: Vec<SybilCluster>,
    pub overall_risk: SybilRisk,
    pub recommendations: Vec<String>,
}

/// Trust-score distribution summary for `audit_health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub low_trust_members: Vec<String>,
    pub high_trust_members: Vec<String>,
}

/// Per-member witnessing summary for `audit_health`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WitnessStats {
    pub total_attestations: usize,
    pub unique_witnesses: usize,
}

/// Comprehensive team health report (spec §4.6 `audit_health`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub team_id: String,
    pub member_count: usize,
    pub timestamp: DateTime<Utc>,
    pub sybil: SybilReport,
    pub trust: TrustStats,
    pub witness_health: std::collections::HashMap<String, WitnessStats>,
    pub health_score: i64,
    pub recommendations: Vec<String>,
}
