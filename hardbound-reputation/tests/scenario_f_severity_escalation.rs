//! Integration test for the federation severity-escalation scenario: a
//! low-reputation federation proposing a high-impact action against a
//! higher-standing target has its declared severity overridden to critical.

use chrono::Utc;
use hardbound_reputation::{FederationRelationship, MultiFederationRegistry, ReputationAggregator, ReputationTier};

#[tokio::test]
async fn low_reputation_federation_dissolution_proposal_is_escalated() {
    let now = Utc::now();
    let registry = MultiFederationRegistry::new();
    registry.register_federation("fed-low", "Low Reputation Federation", now);
    registry.register_federation("fed-high", "High Reputation Federation", now);
    registry.register_federation("fed-witness-1", "Witness One", now);
    registry.register_federation("fed-witness-2", "Witness Two", now);

    // Build up fed-high's reputation via several trust edges; fed-low stays isolated.
    for witness in ["fed-witness-1", "fed-witness-2"] {
        registry.establish_trust(witness, "fed-high", FederationRelationship::Peer, now).await.unwrap();
        for _ in 0..15 {
            registry.record_interaction(witness, "fed-high", true, now).await.unwrap();
        }
    }

    let aggregator = ReputationAggregator::new();
    let low_reputation = aggregator.calculate_reputation(&registry, "fed-low", now).await.unwrap();
    let high_reputation = aggregator.calculate_reputation(&registry, "fed-high", now).await.unwrap();
    assert!(low_reputation.global_reputation < high_reputation.global_reputation);
    assert!(low_reputation.tier <= ReputationTier::Emerging);

    let proposal = registry
        .create_cross_federation_proposal_with_reputation(
            "fed-low",
            "team-in-fed-low",
            vec!["fed-high".to_string()],
            "team_dissolution",
            "dissolve a team in the high-reputation federation",
            false,
            low_reputation.tier,
            now,
        )
        .await
        .unwrap();

    assert!(proposal.severity >= 0.9, "severity should be overridden to critical, got {}", proposal.severity);
    assert!(proposal.min_approval_ratio >= 0.9);
    assert!(proposal.requires_external_witness, "critical-tier proposals require an external witness");

    let override_record = registry.get_severity_override(&proposal.proposal_id).expect("severity override should be recorded");
    assert_eq!(override_record.risk_level, "warning");
    assert!(override_record.requested_severity < override_record.effective_severity);
}
