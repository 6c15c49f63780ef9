//! Heartbeat chain data model (spec §3.1, §4.2).

use chrono::{DateTime, Utc};
use hardbound_core::MetabolicState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A unit of work submitted to a team's pending pool until the next pulse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub tx_type: String,
    pub actor_lct: String,
    pub target_lct: Option<String>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub atp_cost: f64,
}

impl Transaction {
    pub fn create(
        tx_type: impl Into<String>,
        actor_lct: impl Into<String>,
        data: Value,
        target_lct: Option<String>,
        atp_cost: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tx_type: tx_type.into(),
            actor_lct: actor_lct.into(),
            target_lct,
            data,
            timestamp: Utc::now(),
            atp_cost,
        }
    }
}

/// A sealed heartbeat block: one chain per team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub team_id: String,
    pub block_number: u64,
    pub previous_hash: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub metabolic_state: MetabolicState,
    pub actual_interval_secs: f64,
    pub expected_interval_secs: f64,
    pub transactions: Vec<Transaction>,
    pub tx_count: usize,
    pub energy_cost: f64,
    pub sentinel_witness: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct BlockPreimage<'a> {
    pub team_id: &'a str,
    pub block_number: u64,
    pub previous_hash: &'a str,
    pub timestamp: DateTime<Utc>,
    pub metabolic_state: MetabolicState,
    pub actual_interval_secs: f64,
    pub expected_interval_secs: f64,
    pub transactions: &'a [Transaction],
    pub tx_count: usize,
    pub energy_cost: f64,
    pub sentinel_witness: &'a Option<String>,
}

impl Block {
    pub(crate) fn preimage(&self) -> BlockPreimage<'_> {
        BlockPreimage {
            team_id: &self.team_id,
            block_number: self.block_number,
            previous_hash: &self.previous_hash,
            timestamp: self.timestamp,
            metabolic_state: self.metabolic_state,
            actual_interval_secs: self.actual_interval_secs,
            expected_interval_secs: self.expected_interval_secs,
            transactions: &self.transactions,
            tx_count: self.tx_count,
            energy_cost: self.energy_cost,
            sentinel_witness: &self.sentinel_witness,
        }
    }
}

/// A recorded metabolic state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetabolicTransition {
    pub from_state: MetabolicState,
    pub to_state: MetabolicState,
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
    pub atp_cost: f64,
    pub metadata: Value,
}

/// Result of [`crate::HeartbeatLedger::verify_chain`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub ok: bool,
    pub error: Option<String>,
}

/// Output of [`crate::HeartbeatLedger::metabolic_health`]. Read-only —
/// consumers use it for anomaly detection, it never mutates state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetabolicHealth {
    pub state: MetabolicState,
    pub heartbeat_regularity: f64,
    pub energy_efficiency: f64,
    pub transaction_density: f64,
    pub state_stability: f64,
    pub metabolic_reliability: f64,
    pub blocks_analyzed: usize,
}
