//! Trust vector data model (spec §3.2, §4.4).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The six trust dimensions, in the order spec §3.2 lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Competence,
    Reliability,
    Consistency,
    Witnesses,
    Lineage,
    Alignment,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Competence,
        Dimension::Reliability,
        Dimension::Consistency,
        Dimension::Witnesses,
        Dimension::Lineage,
        Dimension::Alignment,
    ];

    /// Aggregate weight (spec §3.2) — sums to 1.0 exactly, never renormalized.
    pub fn weight(&self) -> f64 {
        match self {
            Dimension::Competence => 0.25,
            Dimension::Reliability => 0.20,
            Dimension::Consistency => 0.15,
            Dimension::Witnesses => 0.15,
            Dimension::Lineage => 0.15,
            Dimension::Alignment => 0.10,
        }
    }

    /// Per-day decay rate constant (spec §4.4).
    pub fn decay_rate(&self) -> f64 {
        match self {
            Dimension::Competence => 0.02,
            Dimension::Reliability => 0.05,
            Dimension::Consistency => 0.03,
            Dimension::Witnesses => 0.10,
            Dimension::Lineage => 0.01,
            Dimension::Alignment => 0.04,
        }
    }

    /// Maximum positive gain allowed per UTC calendar day (spec §4.4).
    pub fn daily_velocity_cap(&self) -> f64 {
        match self {
            Dimension::Competence => 0.08,
            Dimension::Reliability => 0.10,
            Dimension::Consistency => 0.05,
            Dimension::Witnesses => 0.15,
            Dimension::Lineage => 0.03,
            Dimension::Alignment => 0.06,
        }
    }
}

/// Baseline every dimension decays toward and starts at (spec §3.2).
pub const BASELINE: f64 = 0.5;

/// The six-dimension trust tensor for one member (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustVector {
    pub competence: f64,
    pub reliability: f64,
    pub consistency: f64,
    pub witnesses: f64,
    pub lineage: f64,
    pub alignment: f64,
}

impl Default for TrustVector {
    fn default() -> Self {
        Self {
            competence: BASELINE,
            reliability: BASELINE,
            consistency: BASELINE,
            witnesses: BASELINE,
            lineage: BASELINE,
            alignment: BASELINE,
        }
    }
}

impl TrustVector {
    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Competence => self.competence,
            Dimension::Reliability => self.reliability,
            Dimension::Consistency => self.consistency,
            Dimension::Witnesses => self.witnesses,
            Dimension::Lineage => self.lineage,
            Dimension::Alignment => self.alignment,
        }
    }

    pub fn set(&mut self, dim: Dimension, value: f64) {
        let clamped = value.clamp(0.0, 1.0);
        match dim {
            Dimension::Competence => self.competence = clamped,
            Dimension::Reliability => self.reliability = clamped,
            Dimension::Consistency => self.consistency = clamped,
            Dimension::Witnesses => self.witnesses = clamped,
            Dimension::Lineage => self.lineage = clamped,
            Dimension::Alignment => self.alignment = clamped,
        }
    }

    /// Weighted aggregate score: the number policy thresholds compare against.
    pub fn score(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d) * d.weight()).sum()
    }
}

/// The declared outcome of a member action feeding a trust update (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
}

impl Outcome {
    /// Base delta multiplier before per-dimension relevance and magnitude scaling.
    pub fn base_delta(&self) -> f64 {
        match self {
            Outcome::Success => 0.05,
            Outcome::Failure => -0.10,
            Outcome::Partial => 0.02,
        }
    }
}

/// Per-member, per-UTC-day counters of positive trust gained, enforcing the
/// velocity cap (spec §4.4, §9 open question: keyed on the UTC calendar
/// date string, not a rolling 24h window).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VelocityCounters {
    pub epoch_day: Option<NaiveDate>,
    pub gained: HashMap<Dimension, f64>,
}

impl VelocityCounters {
    /// Roll the counters over if `now` falls on a new UTC calendar date,
    /// then return the remaining positive headroom for `dim` today.
    pub fn headroom(&mut self, dim: Dimension, now: DateTime<Utc>) -> f64 {
        self.roll(now);
        let used = self.gained.get(&dim).copied().unwrap_or(0.0);
        (dim.daily_velocity_cap() - used).max(0.0)
    }

    /// Record `amount` (must be >= 0) of gain applied to `dim` today.
    pub fn record_gain(&mut self, dim: Dimension, amount: f64, now: DateTime<Utc>) {
        self.roll(now);
        *self.gained.entry(dim).or_insert(0.0) += amount.max(0.0);
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.epoch_day != Some(today) {
            self.epoch_day = Some(today);
            self.gained.clear();
        }
    }
}

/// One scored action, feeding activity-quality-adjusted decay (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAction {
    pub action_type: String,
    pub timestamp: DateTime<Utc>,
    pub atp_cost: f64,
}

/// A rolling 30-day window of scored actions, used to discount trivial
/// "heartbeat ping" activity so it cannot preserve trust the way meaningful
/// actions do (spec §4.4 "Activity-quality adjustment").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityWindow {
    pub actions: Vec<ScoredAction>,
}

impl ActivityWindow {
    pub const WINDOW_DAYS: i64 = 30;

    pub fn record(&mut self, action_type: impl Into<String>, atp_cost: f64, now: DateTime<Utc>) {
        self.actions.push(ScoredAction {
            action_type: action_type.into(),
            timestamp: now,
            atp_cost,
        });
        self.prune(now);
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::days(Self::WINDOW_DAYS);
        self.actions.retain(|a| a.timestamp >= cutoff);
    }

    /// Per-action quality weight: trivial pings score near zero, diverse
    /// ATP-costing governance actions score high.
    fn quality_weight(action_type: &str, atp_cost: f64) -> f64 {
        let base = match action_type {
            "heartbeat" | "ping" => 0.02,
            "audit_record" => 0.3,
            "r6_request" | "r6_approve" | "r6_execute" => 0.8,
            "multisig_vote" | "multisig_propose" | "multisig_execute" => 1.0,
            "trust_update" => 0.6,
            "witness" => 0.5,
            _ => 0.4,
        };
        let cost_bonus = (atp_cost / 10.0).min(0.5);
        (base + cost_bonus).min(1.2)
    }

    /// Quality-adjusted effective action count, substituted for a raw count
    /// in the decay computation's activity factor.
    pub fn effective_action_count(&self, now: DateTime<Utc>) -> f64 {
        let cutoff = now - chrono::Duration::days(Self::WINDOW_DAYS);
        self.actions
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .map(|a| Self::quality_weight(&a.action_type, a.atp_cost))
            .sum()
    }

    /// Distinct action types seen in the window — diversity is part of the
    /// quality signal even though it isn't folded into `effective_action_count`.
    pub fn distinct_action_types(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::days(Self::WINDOW_DAYS);
        let mut seen = std::collections::HashSet::new();
        for action in self.actions.iter().filter(|a| a.timestamp >= cutoff) {
            seen.insert(action.action_type.clone());
        }
        seen.len()
    }
}

/// One member's log of who has witnessed them and when (spec §3.1 Member
/// "witness log"). Persists across remove/re-add to close the cycling
/// vector — callers restore it from the archived-trust snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WitnessLog {
    pub by_witness: HashMap<String, Vec<DateTime<Utc>>>,
}

impl WitnessLog {
    pub fn record(&mut self, witness_lct: &str, now: DateTime<Utc>) {
        self.by_witness.entry(witness_lct.to_string()).or_default().push(now);
    }

    /// Number of attestations from `witness_lct` in the last 30 days
    /// (spec §4.4 witnessing diminishing returns).
    pub fn recent_count(&self, witness_lct: &str, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::days(30);
        self.by_witness
            .get(witness_lct)
            .map(|events| events.iter().filter(|t| **t >= cutoff).count())
            .unwrap_or(0)
    }
}
