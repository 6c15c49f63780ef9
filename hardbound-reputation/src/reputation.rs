//! Reputation aggregator: a single comparable score distilled from trust,
//! network position, and recent activity (spec §4.10).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hardbound_core::GovernanceError;
use tokio::sync::RwLock;

use crate::federation::MultiFederationRegistry;
use crate::types::{ReputationEvent, ReputationScore, ReputationTier};

const WEIGHT_PRESENCE_TRUST: f64 = 0.5;
const WEIGHT_CENTRALITY: f64 = 0.2;
const WEIGHT_TRUST_RATIO: f64 = 0.2;
const WEIGHT_RECENT_ACTIVITY: f64 = 0.1;

/// Sample size below which reputation confidence starts being dampened
/// (grounded on `reputation_aggregation.py`'s sample-size dampening curve).
const FULL_CONFIDENCE_SAMPLE_SIZE: usize = 10;

const CACHE_TTL_SECS: i64 = 300;

struct CachedScore {
    score: ReputationScore,
    computed_at: DateTime<Utc>,
}

/// Computes and caches [`ReputationScore`]s over a [`MultiFederationRegistry`]'s
/// trust graph, invalidating on recorded events (spec §4.10, 5 minute cache).
pub struct ReputationAggregator {
    cache: DashMap<String, CachedScore>,
    events: RwLock<Vec<ReputationEvent>>,
}

impl ReputationAggregator {
    pub fn new() -> Self {
        Self { cache: DashMap::new(), events: RwLock::new(Vec::new()) }
    }

    fn tier_for(score: f64) -> ReputationTier {
        if score >= 0.8 {
            ReputationTier::Exemplary
        } else if score >= 0.6 {
            ReputationTier::Trusted
        } else if score >= 0.4 {
            ReputationTier::Established
        } else if score >= 0.2 {
            ReputationTier::Emerging
        } else {
            ReputationTier::Unknown
        }
    }

    /// Degree centrality over the trust graph, normalized by network size:
    /// `(in_degree + out_degree) / (2 * (n - 1))`. A simplified stand-in for
    /// the original's full network-analysis centrality, consistent with this
    /// workspace's plain-adjacency design for graph-shaped state.
    fn centrality(registry: &MultiFederationRegistry, federation_id: &str) -> f64 {
        let edges = registry.all_trust_edges();
        let n = registry.all_federations().len();
        if n <= 1 {
            return 0.0;
        }
        let in_degree = edges.iter().filter(|e| e.target_federation_id == federation_id).count();
        let out_degree = edges.iter().filter(|e| e.source_federation_id == federation_id).count();
        (in_degree + out_degree) as f64 / (2.0 * (n - 1) as f64)
    }

    async fn recent_activity_score(&self, federation_id: &str, now: DateTime<Utc>) -> f64 {
        let events = self.events.read().await;
        let window_start = now - chrono::Duration::days(30);
        let relevant: Vec<&ReputationEvent> = events
            .iter()
            .filter(|e| e.federation_id == federation_id && e.timestamp >= window_start)
            .collect();
        if relevant.is_empty() {
            return 0.5;
        }
        let sum: f64 = relevant.iter().map(|e| e.magnitude).sum();
        (0.5 + sum / (relevant.len() as f64 * 2.0)).clamp(0.0, 1.0)
    }

    /// Compute (or return cached) reputation for `federation_id`. Cache
    /// entries older than five minutes, or invalidated by a recorded event,
    /// are recomputed (spec §4.10).
    pub async fn calculate_reputation(
        &self,
        registry: &MultiFederationRegistry,
        federation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReputationScore, GovernanceError> {
        registry.get_federation(federation_id)?;

        if let Some(cached) = self.cache.get(federation_id) {
            if (now - cached.computed_at).num_seconds() < CACHE_TTL_SECS {
                return Ok(cached.score.clone());
            }
        }

        let profile = registry.get_federation(federation_id)?;
        let edges = registry.all_trust_edges();

        let incoming: Vec<_> = edges.iter().filter(|e| e.target_federation_id == federation_id).collect();
        let outgoing: Vec<_> = edges.iter().filter(|e| e.source_federation_id == federation_id).collect();

        let incoming_trust_sum: f64 = incoming.iter().map(|e| e.trust_score).sum();
        let incoming_trust_count = incoming.len();
        let outgoing_trust_sum: f64 = outgoing.iter().map(|e| e.trust_score).sum();

        // Presence-weighted trust: the mean incoming trust, weighted down
        // when few federations have weighed in at all.
        let raw_incoming_mean = if incoming_trust_count > 0 { incoming_trust_sum / incoming_trust_count as f64 } else { 0.0 };
        let presence_factor = (incoming_trust_count as f64 / FULL_CONFIDENCE_SAMPLE_SIZE as f64).min(1.0);
        let presence_weighted_trust = raw_incoming_mean * presence_factor;

        let total_trust = incoming_trust_sum + outgoing_trust_sum;
        let trust_ratio = if total_trust > 0.0 { incoming_trust_sum / total_trust } else { 0.5 };

        let centrality = Self::centrality(registry, federation_id);
        let recent_activity = self.recent_activity_score(federation_id, now).await;

        let global_reputation = (presence_weighted_trust * WEIGHT_PRESENCE_TRUST
            + centrality * WEIGHT_CENTRALITY
            + trust_ratio * WEIGHT_TRUST_RATIO
            + recent_activity * WEIGHT_RECENT_ACTIVITY)
            .clamp(0.0, 1.0);

        let sample_size = incoming_trust_count + outgoing.len();
        let confidence = (sample_size as f64 / FULL_CONFIDENCE_SAMPLE_SIZE as f64).min(1.0);

        let score = ReputationScore {
            federation_id: federation_id.to_string(),
            global_reputation,
            tier: Self::tier_for(global_reputation),
            incoming_trust_sum,
            incoming_trust_count,
            presence_weighted_trust,
            outgoing_trust_sum,
            trust_ratio,
            network_centrality: centrality,
            reputation_age_days: (now - profile.created_at).num_days().max(0),
            recent_activity_score: recent_activity,
            confidence,
            sample_size,
            computed_at: now,
        };

        self.cache.insert(federation_id.to_string(), CachedScore { score: score.clone(), computed_at: now });
        Ok(score)
    }

    /// Record an event affecting recent-activity scoring, invalidating any
    /// cached score for the affected federation.
    pub async fn record_event(&self, event: ReputationEvent) {
        self.cache.remove(&event.federation_id);
        self.events.write().await.push(event);
    }

    pub async fn get_reputation_ranking(
        &self,
        registry: &MultiFederationRegistry,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReputationScore>, GovernanceError> {
        let mut scores = Vec::new();
        for federation in registry.all_federations() {
            scores.push(self.calculate_reputation(registry, &federation.federation_id, now).await?);
        }
        scores.sort_by(|a, b| b.global_reputation.partial_cmp(&a.global_reputation).unwrap());
        Ok(scores)
    }

    pub async fn get_tier_distribution(
        &self,
        registry: &MultiFederationRegistry,
        now: DateTime<Utc>,
    ) -> Result<HashMap<ReputationTier, usize>, GovernanceError> {
        let mut counts = HashMap::new();
        for federation in registry.all_federations() {
            let score = self.calculate_reputation(registry, &federation.federation_id, now).await?;
            *counts.entry(score.tier).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub async fn compare_reputations(
        &self,
        registry: &MultiFederationRegistry,
        federation_a: &str,
        federation_b: &str,
        now: DateTime<Utc>,
    ) -> Result<std::cmp::Ordering, GovernanceError> {
        let a = self.calculate_reputation(registry, federation_a, now).await?;
        let b = self.calculate_reputation(registry, federation_b, now).await?;
        Ok(a.global_reputation.partial_cmp(&b.global_reputation).unwrap())
    }

    /// The minimum reputation tier a federation must hold to be granted
    /// `permission`; unrecognized permissions default to requiring at least
    /// `Established` standing.
    pub fn get_reputation_requirements(permission: &str) -> ReputationTier {
        match permission {
            "witness_high_value_proposal" => ReputationTier::Trusted,
            "found_federation_chapter" => ReputationTier::Exemplary,
            "external_witness" => ReputationTier::Established,
            _ => ReputationTier::Established,
        }
    }

    pub async fn check_reputation_permission(
        &self,
        registry: &MultiFederationRegistry,
        federation_id: &str,
        permission: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GovernanceError> {
        let score = self.calculate_reputation(registry, federation_id, now).await?;
        Ok(score.tier >= Self::get_reputation_requirements(permission))
    }
}

impl Default for ReputationAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FederationRelationship;

    #[tokio::test]
    async fn isolated_federation_has_low_reputation() {
        let now = Utc::now();
        let registry = MultiFederationRegistry::new();
        registry.register_federation("fed-a", "A", now);
        let aggregator = ReputationAggregator::new();
        let score = aggregator.calculate_reputation(&registry, "fed-a", now).await.unwrap();
        assert_eq!(score.tier, ReputationTier::Unknown);
        assert_eq!(score.sample_size, 0);
    }

    #[tokio::test]
    async fn well_trusted_federation_outranks_isolated_one() {
        let now = Utc::now();
        let registry = MultiFederationRegistry::new();
        registry.register_federation("fed-a", "A", now);
        registry.register_federation("fed-b", "B", now);
        registry.register_federation("fed-c", "C", now);
        registry.establish_trust("fed-b", "fed-a", FederationRelationship::Peer, now).await.unwrap();
        registry.establish_trust("fed-c", "fed-a", FederationRelationship::Peer, now).await.unwrap();
        for _ in 0..15 {
            registry.record_interaction("fed-b", "fed-a", true, now).await.unwrap();
            registry.record_interaction("fed-c", "fed-a", true, now).await.unwrap();
        }

        let aggregator = ReputationAggregator::new();
        let ranking = aggregator.get_reputation_ranking(&registry, now).await.unwrap();
        assert_eq!(ranking[0].federation_id, "fed-a");
    }

    #[tokio::test]
    async fn cache_is_invalidated_by_recorded_event() {
        let now = Utc::now();
        let registry = MultiFederationRegistry::new();
        registry.register_federation("fed-a", "A", now);
        let aggregator = ReputationAggregator::new();
        let first = aggregator.calculate_reputation(&registry, "fed-a", now).await.unwrap();
        aggregator
            .record_event(ReputationEvent {
                federation_id: "fed-a".to_string(),
                event_type: "incident".to_string(),
                magnitude: -1.0,
                source_federation: None,
                timestamp: now,
            })
            .await;
        assert!(!aggregator.cache.contains_key("fed-a"));
        let second = aggregator.calculate_reputation(&registry, "fed-a", now).await.unwrap();
        assert!(second.recent_activity_score <= first.recent_activity_score);
    }
}
