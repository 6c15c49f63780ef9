//! The `Ledger`: one hash chain per session, serialized per-session.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use hardbound_core::hash::{canonical_hash, GENESIS_HASH};
use hardbound_core::{GovernanceError, Lct, Result};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{AuditRecord, AuditStatus, ChainVerification, Session};

/// Append-only, hash-chained audit ledger shared by every session a Team
/// (or workflow bound to a team) opens.
///
/// Mutations within a session serialize via that session's own `Mutex`,
/// using a per-entity `DashMap<Id, Arc<Mutex<_>>>` lock granularity so
/// concurrent sessions never block one another.
#[derive(Default)]
pub struct Ledger {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Open a new session. Fails if `session_id` is already open — reopening
    /// a live session is a programmer error, not a recoverable one (spec §4.1).
    pub fn start_session(
        &self,
        session_id: impl Into<String>,
        owner_lct: Lct,
        project: Option<String>,
        atp_budget: Option<f64>,
    ) -> Result<()> {
        let session_id = session_id.into();
        if self.sessions.contains_key(&session_id) {
            return Err(GovernanceError::already_exists("session", &session_id));
        }
        info!(session_id, owner = %owner_lct, "session opened");
        let session = Session::new(session_id.clone(), owner_lct, project, atp_budget);
        self.sessions
            .insert(session_id, Arc::new(Mutex::new(session)));
        Ok(())
    }

    fn session_handle(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GovernanceError::not_found("session", session_id))
    }

    /// Append a record to `session_id`'s chain. Sequence and hash are
    /// assigned atomically under the session's lock.
    pub async fn record_audit(
        &self,
        session_id: &str,
        action_type: impl Into<String>,
        tool_name: impl Into<String>,
        target: Option<String>,
        input_hash: Option<String>,
        output_hash: Option<String>,
        status: AuditStatus,
        r6_data: Option<Value>,
    ) -> Result<AuditRecord> {
        let handle = self.session_handle(session_id)?;
        let mut session = handle.lock().await;

        let sequence = session.records.len() as u64;
        let previous_hash = session.tip_hash().to_string();

        let mut record = AuditRecord {
            session_id: session_id.to_string(),
            sequence,
            action_type: action_type.into(),
            tool_name: tool_name.into(),
            target,
            input_hash,
            output_hash,
            status,
            r6_data,
            timestamp: Utc::now(),
            previous_hash,
            hash: String::new(),
        };
        record.hash = canonical_hash(&record.preimage())?;

        debug!(session_id, sequence, action = %record.action_type, "audit recorded");
        session.records.push(record.clone());
        Ok(record)
    }

    /// The full ordered chain for a session.
    pub async fn get_session_audit_trail(&self, session_id: &str) -> Result<Vec<AuditRecord>> {
        let handle = self.session_handle(session_id)?;
        let session = handle.lock().await;
        Ok(session.records.clone())
    }

    /// Recompute every hash and check sequence contiguity and hash linkage.
    /// A mismatch is reported, never raised — callers decide how to react.
    pub async fn verify_audit_chain(&self, session_id: &str) -> Result<ChainVerification> {
        let handle = self.session_handle(session_id)?;
        let session = handle.lock().await;

        let mut expected_previous = GENESIS_HASH.to_string();
        for (index, record) in session.records.iter().enumerate() {
            if record.sequence != index as u64 {
                return Ok(ChainVerification {
                    ok: false,
                    first_error: Some(format!(
                        "sequence gap: expected {index}, found {}",
                        record.sequence
                    )),
                });
            }
            if record.previous_hash != expected_previous {
                return Ok(ChainVerification {
                    ok: false,
                    first_error: Some(format!(
                        "previous_hash mismatch at sequence {index}: expected {expected_previous}, found {}",
                        record.previous_hash
                    )),
                });
            }
            let recomputed = canonical_hash(&record.preimage())?;
            if recomputed != record.hash {
                return Ok(ChainVerification {
                    ok: false,
                    first_error: Some(format!(
                        "hash mismatch at sequence {index}: stored {}, recomputed {recomputed}",
                        record.hash
                    )),
                });
            }
            expected_previous = record.hash.clone();
        }
        Ok(ChainVerification {
            ok: true,
            first_error: None,
        })
    }

    /// Debit `amount` ATP from a session's budget. Unbounded (`atp_budget =
    /// None`) sessions always succeed.
    pub async fn consume_atp(&self, session_id: &str, amount: f64) -> Result<f64> {
        let handle = self.session_handle(session_id)?;
        let mut session = handle.lock().await;

        if let Some(budget) = session.atp_budget {
            let remaining = budget - session.atp_consumed;
            if amount > remaining {
                warn!(session_id, amount, remaining, "ATP budget exhausted");
                return Err(GovernanceError::insufficient(
                    "atp",
                    amount.to_string(),
                    remaining.to_string(),
                ));
            }
        }
        session.atp_consumed += amount;
        Ok(session
            .atp_budget
            .map(|b| b - session.atp_consumed)
            .unwrap_or(f64::INFINITY))
    }

    /// Mark a session ended. Idempotent-ish: ending twice just updates the timestamp.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let handle = self.session_handle(session_id)?;
        let mut session = handle.lock().await;
        session.ended_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Lct {
        Lct::new_unchecked("web4:soft:admin:owner")
    }

    #[tokio::test]
    async fn chain_verifies_after_several_records() {
        let ledger = Ledger::new();
        ledger.start_session("s1", owner(), None, Some(100.0)).unwrap();

        for i in 0..5 {
            ledger
                .record_audit(
                    "s1",
                    "member.add",
                    "team",
                    Some(format!("member-{i}")),
                    None,
                    None,
                    AuditStatus::Success,
                    None,
                )
                .await
                .unwrap();
        }

        let verification = ledger.verify_audit_chain("s1").await.unwrap();
        assert!(verification.ok);
        assert!(verification.first_error.is_none());

        let trail = ledger.get_session_audit_trail("s1").await.unwrap();
        assert_eq!(trail.len(), 5);
        assert_eq!(trail[0].previous_hash, GENESIS_HASH);
        assert_eq!(trail[1].previous_hash, trail[0].hash);
    }

    #[tokio::test]
    async fn reopening_a_session_fails() {
        let ledger = Ledger::new();
        ledger.start_session("dup", owner(), None, None).unwrap();
        let err = ledger.start_session("dup", owner(), None, None).unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn atp_budget_is_enforced() {
        let ledger = Ledger::new();
        ledger.start_session("budgeted", owner(), None, Some(10.0)).unwrap();
        assert!(ledger.consume_atp("budgeted", 4.0).await.is_ok());
        let err = ledger.consume_atp("budgeted", 100.0).await.unwrap_err();
        assert!(matches!(err, GovernanceError::InsufficientResource { .. }));
    }

    #[tokio::test]
    async fn tampering_is_detected_on_verify() {
        let ledger = Ledger::new();
        ledger.start_session("tampered", owner(), None, None).unwrap();
        ledger
            .record_audit(
                "tampered",
                "member.add",
                "team",
                None,
                None,
                None,
                AuditStatus::Success,
                None,
            )
            .await
            .unwrap();

        {
            let handle = ledger.session_handle("tampered").unwrap();
            let mut session = handle.lock().await;
            session.records[0].tool_name = "tampered-tool".to_string();
        }

        let verification = ledger.verify_audit_chain("tampered").await.unwrap();
        assert!(!verification.ok);
        assert!(verification.first_error.unwrap().contains("hash mismatch"));
    }
}
