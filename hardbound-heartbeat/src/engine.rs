//! `HeartbeatLedger`: one per team, sealing pending transactions into blocks
//! and driving the metabolic state machine (spec §4.2).

use chrono::{DateTime, Utc};
use hardbound_core::hash::{canonical_hash, GENESIS_HASH};
use hardbound_core::{GovernanceError, MetabolicState, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::{Block, ChainVerification, MetabolicHealth, MetabolicTransition, Transaction};

/// ATP burned per second of elapsed time at `active` energy multiplier 1.0.
const BASE_ATP_RATE_PER_SECOND: f64 = 0.01;

struct HeartbeatState {
    team_id: String,
    state: MetabolicState,
    state_entered_at: DateTime<Utc>,
    last_heartbeat_at: DateTime<Utc>,
    last_transaction_at: Option<DateTime<Utc>>,
    in_transition: bool,
    pending: Vec<Transaction>,
    blocks: Vec<Block>,
    transitions: Vec<MetabolicTransition>,
    atp_reserves: f64,
    max_atp: f64,
}

/// A team's metabolic block chain. Every mutating method serializes through
/// a single internal lock, matching the spec's "heartbeats serialize within
/// a team" ordering guarantee (§5).
pub struct HeartbeatLedger {
    inner: Mutex<HeartbeatState>,
}

impl HeartbeatLedger {
    pub fn new(team_id: impl Into<String>, initial_atp_reserve: f64) -> Self {
        let now = Utc::now();
        Self {
            inner: Mutex::new(HeartbeatState {
                team_id: team_id.into(),
                state: MetabolicState::Active,
                state_entered_at: now,
                last_heartbeat_at: now,
                last_transaction_at: None,
                in_transition: false,
                pending: Vec::new(),
                blocks: Vec::new(),
                transitions: Vec::new(),
                atp_reserves: initial_atp_reserve,
                max_atp: initial_atp_reserve,
            }),
        }
    }

    pub async fn state(&self) -> MetabolicState {
        self.inner.lock().await.state
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn atp_reserves(&self) -> f64 {
        self.inner.lock().await.atp_reserves
    }

    /// Submit a transaction to the pending pool. A `rest` team waking on any
    /// transaction is handled inline rather than by re-entering the public
    /// `transition_state` (which would deadlock re-acquiring this lock).
    pub async fn submit_transaction(
        &self,
        tx_type: impl Into<String>,
        actor_lct: impl Into<String>,
        data: Value,
        target_lct: Option<String>,
        atp_cost: f64,
    ) -> Result<Transaction> {
        let mut guard = self.inner.lock().await;
        let tx = Transaction::create(tx_type, actor_lct, data, target_lct, atp_cost);
        guard.pending.push(tx.clone());
        guard.last_transaction_at = Some(Utc::now());

        if !guard.in_transition && guard.state == MetabolicState::Rest {
            let team_id = guard.team_id.clone();
            drop(guard);
            self.transition_state(MetabolicState::Active, "transaction_received", None)
                .await?;
            debug!(team_id, "woke from rest on transaction");
        }
        Ok(tx)
    }

    /// Seal pending transactions into a block and advance the metabolic clock.
    pub async fn heartbeat(&self, sentinel_lct: Option<String>) -> Result<Block> {
        let mut guard = self.inner.lock().await;
        let now = Utc::now();

        let actual_interval = (now - guard.last_heartbeat_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        let expected_interval = guard.state.nominal_interval_secs() as f64;

        let previous_hash = guard
            .blocks
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let block_number = guard.blocks.len() as u64;

        let transactions = std::mem::take(&mut guard.pending);
        let tx_count = transactions.len();
        let tx_energy: f64 = transactions.iter().map(|t| t.atp_cost).sum();
        let energy_cost =
            BASE_ATP_RATE_PER_SECOND * actual_interval * guard.state.energy_multiplier() + tx_energy;

        let mut block = Block {
            team_id: guard.team_id.clone(),
            block_number,
            previous_hash,
            hash: String::new(),
            timestamp: now,
            metabolic_state: guard.state,
            actual_interval_secs: actual_interval,
            expected_interval_secs: expected_interval,
            transactions,
            tx_count,
            energy_cost,
            sentinel_witness: sentinel_lct,
        };
        block.hash = canonical_hash(&block.preimage())?;

        guard.atp_reserves = (guard.atp_reserves - energy_cost).max(0.0);
        guard.last_heartbeat_at = now;
        guard.blocks.push(block.clone());

        debug!(
            team_id = %guard.team_id,
            block_number,
            tx_count,
            energy_cost,
            "heartbeat sealed block"
        );

        let auto_target = auto_transition_target(
            guard.state,
            guard.last_transaction_at,
            guard.state_entered_at,
            now,
            guard.atp_reserves,
            guard.max_atp,
        );
        drop(guard);

        if let Some((target, trigger)) = auto_target {
            self.transition_state(target, trigger, None).await?;
        }

        Ok(block)
    }

    /// Validate and apply a metabolic state transition, charging any wake
    /// penalty and recording it both as a transition entry and a pending
    /// transaction (so it appears in the next sealed block).
    pub async fn transition_state(
        &self,
        to_state: MetabolicState,
        trigger: impl Into<String>,
        metadata: Option<Value>,
    ) -> Result<MetabolicTransition> {
        let trigger = trigger.into();
        let mut guard = self.inner.lock().await;
        if guard.in_transition {
            return Err(GovernanceError::invalid_state(
                "not already transitioning",
                "transition in progress",
            ));
        }

        let from_state = guard.state;
        if !from_state.can_transition_to(to_state) {
            return Err(GovernanceError::invalid_state(
                format!("a valid target of {from_state}"),
                to_state.to_string(),
            ));
        }

        guard.in_transition = true;
        let now = Utc::now();
        let time_in_state = (now - guard.state_entered_at).num_milliseconds().max(0) as f64 / 1000.0;
        let atp_cost = wake_penalty(from_state, time_in_state);

        let block_number = guard.blocks.len() as u64;
        let transition = MetabolicTransition {
            from_state,
            to_state,
            trigger: trigger.clone(),
            timestamp: now,
            block_number,
            atp_cost,
            metadata: metadata.unwrap_or(Value::Null),
        };
        guard.transitions.push(transition.clone());

        let tx = Transaction::create(
            "metabolic_transition",
            guard.team_id.clone(),
            serde_json::json!({ "from": from_state, "to": to_state, "trigger": trigger }),
            None,
            atp_cost,
        );
        guard.pending.push(tx);
        guard.atp_reserves = (guard.atp_reserves - atp_cost).max(0.0);

        guard.state = to_state;
        guard.state_entered_at = now;
        guard.in_transition = false;

        info!(team_id = %guard.team_id, %from_state, %to_state, trigger, atp_cost, "metabolic transition");
        Ok(transition)
    }

    /// Walk the block chain, checking number contiguity and hash linkage.
    pub async fn verify_chain(&self) -> Result<ChainVerification> {
        let guard = self.inner.lock().await;
        let mut expected_previous = GENESIS_HASH.to_string();
        for (index, block) in guard.blocks.iter().enumerate() {
            if block.block_number != index as u64 {
                return Ok(ChainVerification {
                    ok: false,
                    error: Some(format!(
                        "block number gap: expected {index}, found {}",
                        block.block_number
                    )),
                });
            }
            if block.previous_hash != expected_previous {
                return Ok(ChainVerification {
                    ok: false,
                    error: Some(format!("previous_hash mismatch at block {index}")),
                });
            }
            let recomputed = canonical_hash(&block.preimage())?;
            if recomputed != block.hash {
                return Ok(ChainVerification {
                    ok: false,
                    error: Some(format!("hash mismatch at block {index}")),
                });
            }
            expected_previous = block.hash.clone();
        }
        Ok(ChainVerification {
            ok: true,
            error: None,
        })
    }

    /// Composite health score over the last 50 blocks. Pure: never mutates state.
    pub async fn metabolic_health(&self) -> MetabolicHealth {
        let guard = self.inner.lock().await;
        let recent: Vec<&Block> = guard.blocks.iter().rev().take(50).collect();

        if recent.is_empty() {
            return MetabolicHealth {
                state: guard.state,
                heartbeat_regularity: 0.0,
                energy_efficiency: 0.0,
                transaction_density: 0.0,
                state_stability: 0.0,
                metabolic_reliability: 0.0,
                blocks_analyzed: 0,
            };
        }

        let regularity_scores: Vec<f64> = recent
            .iter()
            .filter(|b| b.expected_interval_secs > 0.0)
            .map(|b| {
                let ratio = (b.actual_interval_secs / b.expected_interval_secs).max(0.01);
                (-ratio.ln().abs()).exp()
            })
            .collect();
        let heartbeat_regularity = if regularity_scores.is_empty() {
            0.0
        } else {
            regularity_scores.iter().sum::<f64>() / regularity_scores.len() as f64
        };

        let total_energy: f64 = recent.iter().map(|b| b.energy_cost).sum();
        let total_time: f64 = recent.iter().map(|b| b.actual_interval_secs).sum();
        let expected_energy = total_time * BASE_ATP_RATE_PER_SECOND;
        let energy_efficiency = (expected_energy / total_energy.max(0.001)).min(1.0);

        let total_txns: usize = recent.iter().map(|b| b.tx_count).sum();
        let transaction_density = total_txns as f64 / recent.len() as f64;

        let now = Utc::now();
        let time_in_state = (now - guard.state_entered_at).num_milliseconds().max(0) as f64 / 1000.0;
        let state_stability = (time_in_state / 86_400.0).min(1.0);

        let metabolic_reliability = heartbeat_regularity * 0.35
            + energy_efficiency * 0.25
            + (transaction_density / 10.0).min(1.0) * 0.20
            + state_stability * 0.20;

        MetabolicHealth {
            state: guard.state,
            heartbeat_regularity,
            energy_efficiency,
            transaction_density,
            state_stability,
            metabolic_reliability,
            blocks_analyzed: recent.len(),
        }
    }
}

/// The three fixed auto-transition rules evaluated after every heartbeat
/// (spec §4.2). Checked in the same order the source enumerates them;
/// the first that fires wins.
fn auto_transition_target(
    state: MetabolicState,
    last_transaction_at: Option<DateTime<Utc>>,
    state_entered_at: DateTime<Utc>,
    now: DateTime<Utc>,
    atp_reserves: f64,
    max_atp: f64,
) -> Option<(MetabolicState, &'static str)> {
    let since_activity = |at: Option<DateTime<Utc>>| -> f64 {
        let reference = at.unwrap_or(state_entered_at);
        (now - reference).num_milliseconds().max(0) as f64 / 1000.0
    };

    match state {
        MetabolicState::Active => {
            if since_activity(last_transaction_at) >= 3600.0 {
                return Some((MetabolicState::Rest, "auto:no_transactions"));
            }
            if max_atp > 0.0 && (atp_reserves / max_atp) < 0.10 {
                return Some((MetabolicState::Torpor, "auto:atp_critical"));
            }
            None
        }
        MetabolicState::Rest => {
            if since_activity(last_transaction_at) >= 21_600.0 {
                return Some((MetabolicState::Sleep, "auto:no_activity"));
            }
            None
        }
        MetabolicState::Sleep => {
            if since_activity(last_transaction_at) >= 2_592_000.0 {
                return Some((MetabolicState::Hibernation, "auto:no_activity"));
            }
            None
        }
        _ => None,
    }
}

/// Wake penalty for exiting a dormant state before its minimum dwell.
fn wake_penalty(from_state: MetabolicState, time_in_state_secs: f64) -> f64 {
    let (Some(min_dwell), penalty) = (from_state.min_dwell_secs(), from_state.wake_penalty_atp())
    else {
        return 0.0;
    };
    if time_in_state_secs >= min_dwell as f64 {
        return 0.0;
    }
    let incompleteness = 1.0 - (time_in_state_secs / min_dwell as f64);
    (penalty * incompleteness).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_heartbeats_still_seal_blocks() {
        let ledger = HeartbeatLedger::new("team-1", 1000.0);
        let block = ledger.heartbeat(None).await.unwrap();
        assert_eq!(block.block_number, 0);
        assert_eq!(block.tx_count, 0);
        assert_eq!(block.previous_hash, GENESIS_HASH);
    }

    #[tokio::test]
    async fn chain_links_across_blocks() {
        let ledger = HeartbeatLedger::new("team-2", 1000.0);
        let first = ledger.heartbeat(None).await.unwrap();
        ledger
            .submit_transaction("audit", "web4:soft:member:a", serde_json::json!({}), None, 0.0)
            .await
            .unwrap();
        let second = ledger.heartbeat(None).await.unwrap();
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(second.tx_count, 1);

        let verification = ledger.verify_chain().await.unwrap();
        assert!(verification.ok);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let ledger = HeartbeatLedger::new("team-3", 1000.0);
        let err = ledger
            .transition_state(MetabolicState::Hibernation, "test", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn early_wake_from_sleep_costs_a_penalty() {
        let ledger = HeartbeatLedger::new("team-4", 1000.0);
        ledger
            .transition_state(MetabolicState::Sleep, "test", None)
            .await
            .unwrap();
        let before = ledger.atp_reserves().await;
        ledger
            .transition_state(MetabolicState::Active, "test", None)
            .await
            .unwrap();
        let after = ledger.atp_reserves().await;
        assert!(after < before);
    }
}
