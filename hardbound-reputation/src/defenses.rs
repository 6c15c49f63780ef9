//! Advanced, read-only network defenses: partition-resilience bookkeeping,
//! cascade-failure simulation, and the federation-recovery state machine
//! (spec §4.11). None of these mutate trust or ATP directly — they record
//! signed reports and emit alerts for a human or a higher layer to act on.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hardbound_core::GovernanceError;
use hardbound_core::hash::hex_sha256;

use crate::federation::MultiFederationRegistry;
use crate::types::{
    BridgeNode, BridgeType, CascadeSimulation, FailureType, IncidentType, PartitionRisk,
    QuarantineRecord, RecoveryStatus, ResilienceReport, SecurityIncident,
};

/// Severity at or above which an incident auto-quarantines its federation
/// (grounded on `federation_recovery.py`'s `QUARANTINE_THRESHOLD`).
const QUARANTINE_THRESHOLD: f64 = 0.7;

/// Fraction of pre-quarantine trust restored on successful recovery
/// (`federation_recovery.py::complete_recovery`).
const RECOVERY_TRUST_RESTORE_FACTOR: f64 = 0.5;

/// Round-over-round damping applied to propagated cascade damage
/// (`cascading_failure.py::simulate_cascade`).
const CASCADE_DAMPING: f64 = 0.8;
const CASCADE_MAX_ROUNDS: u32 = 10;
const CASCADE_STOP_THRESHOLD: f64 = 0.1;

/// A node is a "bridge" once its centrality clears this and it has few
/// alternate paths; authored thresholds, consistent with this workspace's
/// tiered-threshold style elsewhere (multisig quorum, reputation tiers).
const BRIDGE_CENTRALITY_MINOR: f64 = 0.3;
const BRIDGE_CENTRALITY_MAJOR: f64 = 0.5;
const BRIDGE_CENTRALITY_CRITICAL: f64 = 0.7;

/// Partition-resilience, cascade-simulation, and recovery bookkeeping for a
/// [`MultiFederationRegistry`]'s trust graph.
pub struct DefenseLedger {
    incidents: DashMap<String, SecurityIncident>,
    quarantines: DashMap<String, QuarantineRecord>,
    recovery_status: DashMap<String, RecoveryStatus>,
    incident_seq: std::sync::atomic::AtomicU64,
}

impl DefenseLedger {
    pub fn new() -> Self {
        Self {
            incidents: DashMap::new(),
            quarantines: DashMap::new(),
            recovery_status: DashMap::new(),
            incident_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn status_of(&self, federation_id: &str) -> RecoveryStatus {
        self.recovery_status.get(federation_id).map(|s| *s).unwrap_or(RecoveryStatus::Active)
    }

    /// Build a plain adjacency table (`HashMap<Id, Vec<Id>>`) over the trust
    /// graph, undirected for reachability purposes — consistent with this
    /// workspace's no-graph-crate design for graph-shaped state.
    fn adjacency(registry: &MultiFederationRegistry) -> HashMap<String, Vec<String>> {
        let mut adj: HashMap<String, Vec<String>> = HashMap::new();
        for federation in registry.all_federations() {
            adj.entry(federation.federation_id).or_default();
        }
        for edge in registry.all_trust_edges() {
            adj.entry(edge.source_federation_id.clone()).or_default().push(edge.target_federation_id.clone());
            adj.entry(edge.target_federation_id.clone()).or_default().push(edge.source_federation_id.clone());
        }
        adj
    }

    fn reachable_from(adj: &HashMap<String, Vec<String>>, start: &str, excluding: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(node) = stack.pop() {
            if node == excluding || !seen.insert(node.clone()) {
                continue;
            }
            if let Some(neighbors) = adj.get(&node) {
                for n in neighbors {
                    if n != excluding && !seen.contains(n) {
                        stack.push(n.clone());
                    }
                }
            }
        }
        seen
    }

    /// Count simple alternate paths (distinct next-hops that still reach the
    /// rest of the network) between all pairs once `federation_id` is removed.
    fn alternate_paths(adj: &HashMap<String, Vec<String>>, federation_id: &str) -> usize {
        let neighbors = adj.get(federation_id).cloned().unwrap_or_default();
        let mut distinct_neighbors: HashSet<String> = neighbors.into_iter().collect();
        distinct_neighbors.remove(federation_id);
        if distinct_neighbors.len() <= 1 {
            return distinct_neighbors.len();
        }
        let sample = distinct_neighbors.iter().next().cloned().unwrap_or_default();
        let reachable = Self::reachable_from(adj, &sample, federation_id);
        distinct_neighbors.iter().filter(|n| reachable.contains(*n) || **n == sample).count()
    }

    fn bridge_type(centrality: f64) -> Option<BridgeType> {
        if centrality >= BRIDGE_CENTRALITY_CRITICAL {
            Some(BridgeType::Critical)
        } else if centrality >= BRIDGE_CENTRALITY_MAJOR {
            Some(BridgeType::Major)
        } else if centrality >= BRIDGE_CENTRALITY_MINOR {
            Some(BridgeType::Minor)
        } else {
            None
        }
    }

    /// Scan the trust graph for bridge nodes whose removal would fragment
    /// the network, classified by centrality and alternate-path count
    /// (spec §4.11).
    pub fn analyze_partition_resilience(&self, registry: &MultiFederationRegistry) -> ResilienceReport {
        let adj = Self::adjacency(registry);
        let n = adj.len().max(1);

        let mut bridges = Vec::new();
        let mut redundancy_sum = 0.0;
        let mut redundancy_count = 0usize;

        for federation_id in adj.keys() {
            let degree = adj.get(federation_id).map(|v| v.len()).unwrap_or(0);
            let centrality = degree as f64 / (2.0 * (n.saturating_sub(1)).max(1) as f64);
            let alt_paths = Self::alternate_paths(&adj, federation_id);
            let redundancy = if degree == 0 { 0.0 } else { (alt_paths as f64 / degree as f64).min(1.0) };
            redundancy_sum += redundancy;
            redundancy_count += 1;

            if let Some(bridge_type) = Self::bridge_type(centrality) {
                if alt_paths <= 1 {
                    bridges.push(BridgeNode {
                        federation_id: federation_id.clone(),
                        bridge_type,
                        centrality_score: centrality,
                        alternate_paths: alt_paths,
                        redundancy_score: redundancy,
                    });
                }
            }
        }
        bridges.sort_by(|a, b| b.centrality_score.partial_cmp(&a.centrality_score).unwrap());

        let critical_count = bridges.iter().filter(|b| b.bridge_type == BridgeType::Critical).count();
        let major_count = bridges.iter().filter(|b| b.bridge_type == BridgeType::Major).count();
        let risk_level = if critical_count > 0 {
            PartitionRisk::High
        } else if major_count > 0 {
            PartitionRisk::Medium
        } else if !bridges.is_empty() {
            PartitionRisk::Low
        } else {
            PartitionRisk::None
        };

        let mut recommendations = Vec::new();
        for bridge in &bridges {
            match bridge.bridge_type {
                BridgeType::Critical => recommendations.push(format!(
                    "{} is a critical bridge with {} alternate path(s); establish redundant trust relationships around it",
                    bridge.federation_id, bridge.alternate_paths
                )),
                BridgeType::Major => recommendations.push(format!(
                    "{} is a major bridge; monitor for isolation risk",
                    bridge.federation_id
                )),
                BridgeType::Minor => {}
            }
        }

        ResilienceReport {
            risk_level,
            bridges,
            average_redundancy: if redundancy_count > 0 { redundancy_sum / redundancy_count as f64 } else { 0.0 },
            recommendations,
        }
    }

    /// Simulate failure propagation from `origin_federation` through the
    /// trust graph, damping propagated damage by `0.8^round`
    /// (`cascading_failure.py::simulate_cascade`). Read-only: produces a
    /// report, never mutates live trust scores.
    pub fn simulate_cascade(
        &self,
        registry: &MultiFederationRegistry,
        origin_federation: &str,
        failure_type: FailureType,
        initial_severity: f64,
    ) -> Result<CascadeSimulation, GovernanceError> {
        registry.get_federation(origin_federation)?;
        let adj = Self::adjacency(registry);
        let trust_by_edge: HashMap<(String, String), f64> = registry
            .all_trust_edges()
            .into_iter()
            .map(|e| ((e.source_federation_id, e.target_federation_id), e.trust_score))
            .collect();

        let mut affected: HashMap<String, f64> = HashMap::new();
        affected.insert(origin_federation.to_string(), initial_severity);
        let mut path = Vec::new();
        let mut frontier = vec![origin_federation.to_string()];
        let mut round = 0u32;
        let mut total_damage = initial_severity;

        while round < CASCADE_MAX_ROUNDS && !frontier.is_empty() {
            let damping = CASCADE_DAMPING.powi(round as i32 + 1);
            let mut next_frontier = Vec::new();

            for node in &frontier {
                let node_damage = *affected.get(node).unwrap_or(&0.0);
                if node_damage < CASCADE_STOP_THRESHOLD {
                    continue;
                }
                if let Some(neighbors) = adj.get(node) {
                    for neighbor in neighbors {
                        let trust = trust_by_edge
                            .get(&(node.clone(), neighbor.clone()))
                            .or_else(|| trust_by_edge.get(&(neighbor.clone(), node.clone())))
                            .copied()
                            .unwrap_or(0.3);
                        let mut propagated = node_damage * trust * damping;

                        if let Some(existing) = affected.get(neighbor) {
                            propagated = (propagated * 0.5).max(0.0);
                            let merged = (existing + propagated).min(1.0);
                            if merged > *existing {
                                affected.insert(neighbor.clone(), merged);
                                total_damage += merged - existing;
                            }
                        } else if propagated >= CASCADE_STOP_THRESHOLD {
                            affected.insert(neighbor.clone(), propagated);
                            total_damage += propagated;
                            next_frontier.push(neighbor.clone());
                        }
                        if propagated >= CASCADE_STOP_THRESHOLD {
                            path.push((node.clone(), neighbor.clone(), propagated));
                        }
                    }
                }
            }

            frontier = next_frontier;
            round += 1;
        }

        let mut recommendations = Vec::new();
        if affected.len() > 1 {
            recommendations.push(format!(
                "{} federation(s) affected beyond the origin; review trust edges along the propagation path",
                affected.len() - 1
            ));
        }
        if total_damage >= 2.0 {
            recommendations.push("total simulated damage is severe; consider pre-emptive quarantine of high-centrality neighbors".to_string());
        }

        Ok(CascadeSimulation {
            origin_federation: origin_federation.to_string(),
            failure_type,
            initial_severity,
            propagation_rounds: round,
            affected_federations: affected.into_iter().collect(),
            total_network_damage: total_damage,
            propagation_path: path,
            recommendations,
        })
    }

    fn next_incident_id(&self) -> String {
        let seq = self.incident_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let digest = hex_sha256(format!("incident:{seq}").as_bytes());
        format!("incident:{}", &digest[..12])
    }

    /// Record a security incident. Severity at or above
    /// [`QUARANTINE_THRESHOLD`] auto-quarantines the federation
    /// (`federation_recovery.py::report_incident`).
    pub fn report_incident(
        &self,
        registry: &MultiFederationRegistry,
        federation_id: &str,
        incident_type: IncidentType,
        severity: f64,
        description: impl Into<String>,
        reported_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<SecurityIncident, GovernanceError> {
        registry.get_federation(federation_id)?;
        let incident_id = self.next_incident_id();
        let incident = SecurityIncident {
            incident_id: incident_id.clone(),
            federation_id: federation_id.to_string(),
            incident_type,
            severity,
            description: description.into(),
            detected_at: now,
            reported_by: reported_by.into(),
            resolved: false,
        };
        self.incidents.insert(incident_id.clone(), incident.clone());

        if severity >= QUARANTINE_THRESHOLD && self.status_of(federation_id) == RecoveryStatus::Active {
            self.quarantine_federation(registry, federation_id, &incident_id, "auto-quarantine: incident severity threshold exceeded")?;
        }
        Ok(incident)
    }

    /// Move a federation into quarantine, snapshotting its trust edges so
    /// [`complete_recovery`](Self::complete_recovery) can restore them at
    /// half strength (`federation_recovery.py::quarantine_federation`).
    pub fn quarantine_federation(
        &self,
        registry: &MultiFederationRegistry,
        federation_id: &str,
        incident_id: &str,
        reason: impl Into<String>,
    ) -> Result<QuarantineRecord, GovernanceError> {
        let profile = registry.get_federation(federation_id)?;
        let status = self.status_of(federation_id);
        if status == RecoveryStatus::Quarantined || status == RecoveryStatus::Revoked {
            return Err(GovernanceError::invalid_state("active or under_review", format!("{status:?}")));
        }

        let edges = registry.all_trust_edges();
        let outgoing_trust_snapshot = edges
            .iter()
            .filter(|e| e.source_federation_id == federation_id)
            .map(|e| (e.target_federation_id.clone(), e.trust_score))
            .collect();
        let incoming_trust_snapshot = edges
            .iter()
            .filter(|e| e.target_federation_id == federation_id)
            .map(|e| (e.source_federation_id.clone(), e.trust_score))
            .collect();

        let quarantine_id = format!("quarantine:{}", &hex_sha256(format!("{federation_id}:{incident_id}").as_bytes())[..12]);
        let record = QuarantineRecord {
            federation_id: federation_id.to_string(),
            quarantine_id: quarantine_id.clone(),
            started_at: Utc::now(),
            ended_at: None,
            reason: reason.into(),
            incident_id: incident_id.to_string(),
            outgoing_trust_snapshot,
            incoming_trust_snapshot,
            recovery_requirements: vec![
                "independent security audit".to_string(),
                "incident root-cause report".to_string(),
                "external witness re-attestation".to_string(),
            ],
        };
        self.quarantines.insert(quarantine_id, record.clone());
        self.recovery_status.insert(federation_id.to_string(), RecoveryStatus::Quarantined);
        let _ = profile;
        Ok(record)
    }

    /// `quarantined -> recovering`, the only legal entry point into recovery.
    pub fn start_recovery(&self, federation_id: &str) -> Result<RecoveryStatus, GovernanceError> {
        let status = self.status_of(federation_id);
        if status != RecoveryStatus::Quarantined {
            return Err(GovernanceError::invalid_state("quarantined", format!("{status:?}")));
        }
        self.recovery_status.insert(federation_id.to_string(), RecoveryStatus::Recovering);
        Ok(RecoveryStatus::Recovering)
    }

    /// `recovering -> recovered`, restoring snapshotted trust at
    /// [`RECOVERY_TRUST_RESTORE_FACTOR`] strength. Returns the restored
    /// edges for the caller to apply through the trust registry — this
    /// ledger never mutates trust itself.
    pub fn complete_recovery(&self, federation_id: &str) -> Result<(RecoveryStatus, Vec<(String, String, f64)>), GovernanceError> {
        let status = self.status_of(federation_id);
        if status != RecoveryStatus::Recovering {
            return Err(GovernanceError::invalid_state("recovering", format!("{status:?}")));
        }
        let quarantine = self
            .quarantines
            .iter()
            .filter(|q| q.federation_id == federation_id && q.ended_at.is_none())
            .max_by_key(|q| q.started_at)
            .map(|q| q.clone());

        let mut restored = Vec::new();
        if let Some(mut record) = quarantine {
            for (target, trust) in &record.outgoing_trust_snapshot {
                restored.push((federation_id.to_string(), target.clone(), trust * RECOVERY_TRUST_RESTORE_FACTOR));
            }
            for (source, trust) in &record.incoming_trust_snapshot {
                restored.push((source.clone(), federation_id.to_string(), trust * RECOVERY_TRUST_RESTORE_FACTOR));
            }
            record.ended_at = Some(Utc::now());
            self.quarantines.insert(record.quarantine_id.clone(), record);
        }

        self.recovery_status.insert(federation_id.to_string(), RecoveryStatus::Recovered);
        Ok((RecoveryStatus::Recovered, restored))
    }

    /// `quarantined -> revoked`, a terminal state reachable directly without
    /// passing through recovery (`federation_recovery.py::revoke_federation`).
    pub fn revoke_federation(&self, federation_id: &str) -> Result<RecoveryStatus, GovernanceError> {
        let status = self.status_of(federation_id);
        if status != RecoveryStatus::Quarantined {
            return Err(GovernanceError::invalid_state("quarantined", format!("{status:?}")));
        }
        self.recovery_status.insert(federation_id.to_string(), RecoveryStatus::Revoked);
        Ok(RecoveryStatus::Revoked)
    }

    pub fn get_recovery_status(&self, federation_id: &str) -> RecoveryStatus {
        self.status_of(federation_id)
    }

    pub fn get_incidents(&self, federation_id: &str) -> Vec<SecurityIncident> {
        self.incidents.iter().filter(|i| i.federation_id == federation_id).map(|i| i.clone()).collect()
    }
}

impl Default for DefenseLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FederationRelationship;

    fn registry_with(now: DateTime<Utc>) -> MultiFederationRegistry {
        let reg = MultiFederationRegistry::new();
        reg.register_federation("fed-a", "A", now);
        reg.register_federation("fed-b", "B", now);
        reg.register_federation("fed-c", "C", now);
        reg
    }

    #[tokio::test]
    async fn bridge_node_found_when_one_federation_connects_two_clusters() {
        let now = Utc::now();
        let reg = registry_with(now);
        reg.register_federation("fed-d", "D", now);
        reg.establish_trust("fed-a", "fed-b", FederationRelationship::Peer, now).await.unwrap();
        reg.establish_trust("fed-a", "fed-c", FederationRelationship::Peer, now).await.unwrap();
        reg.establish_trust("fed-a", "fed-d", FederationRelationship::Peer, now).await.unwrap();

        let ledger = DefenseLedger::new();
        let report = ledger.analyze_partition_resilience(&reg);
        assert!(report.bridges.iter().any(|b| b.federation_id == "fed-a"));
        assert_ne!(report.risk_level, PartitionRisk::None);
    }

    #[tokio::test]
    async fn cascade_damage_decays_across_rounds() {
        let now = Utc::now();
        let reg = registry_with(now);
        reg.establish_trust("fed-a", "fed-b", FederationRelationship::Peer, now).await.unwrap();
        reg.establish_trust("fed-b", "fed-c", FederationRelationship::Peer, now).await.unwrap();

        let ledger = DefenseLedger::new();
        let sim = ledger.simulate_cascade(&reg, "fed-a", FailureType::Trust, 1.0).unwrap();
        assert!(sim.total_network_damage >= 1.0);
        assert!(sim.propagation_rounds <= CASCADE_MAX_ROUNDS);
    }

    #[test]
    fn recovery_transitions_follow_the_exact_state_machine() {
        let now = Utc::now();
        let reg = MultiFederationRegistry::new();
        reg.register_federation("fed-a", "A", now);
        let ledger = DefenseLedger::new();

        let incident = ledger
            .report_incident(&reg, "fed-a", IncidentType::SybilAttack, 0.9, "sybil cluster detected", "witness-1", now)
            .unwrap();
        assert_eq!(ledger.get_recovery_status("fed-a"), RecoveryStatus::Quarantined);

        assert!(ledger.revoke_federation("fed-b").is_err());
        assert!(ledger.complete_recovery("fed-a").is_err());

        ledger.start_recovery("fed-a").unwrap();
        assert_eq!(ledger.get_recovery_status("fed-a"), RecoveryStatus::Recovering);
        assert!(ledger.revoke_federation("fed-a").is_err());

        let (status, _restored) = ledger.complete_recovery("fed-a").unwrap();
        assert_eq!(status, RecoveryStatus::Recovered);
        let _ = incident;
    }

    #[test]
    fn quarantine_can_go_straight_to_revoked() {
        let now = Utc::now();
        let reg = MultiFederationRegistry::new();
        reg.register_federation("fed-a", "A", now);
        let ledger = DefenseLedger::new();
        ledger
            .report_incident(&reg, "fed-a", IncidentType::KeyCompromise, 0.95, "key compromise", "witness-1", now)
            .unwrap();
        let status = ledger.revoke_federation("fed-a").unwrap();
        assert_eq!(status, RecoveryStatus::Revoked);
        assert!(ledger.start_recovery("fed-a").is_err());
    }
}
