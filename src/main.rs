// hardbound - a trust and governance substrate for federated teams of agents
//
// Main binary entry point. Wires up a single team plus the federation and
// multi-federation layers above it and drives one pass through each so the
// whole stack can be smoke-tested without an embedding application. This
// binary has no command surface of its own (spec §1, §6): real deployments
// embed these crates directly and drive them from their own CLI or service
// loop.

use anyhow::Result;
use chrono::Utc;
use hardbound_core::{Lct, Role};
use hardbound_federation::FederationRegistry;
use hardbound_reputation::{DefenseLedger, FederationRelationship, MultiFederationRegistry, ReputationAggregator};
use hardbound_team::{Team, TeamConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("hardbound=info".parse()?))
        .init();

    info!("starting hardbound governance substrate demo");

    let team = Team::create(TeamConfig::default()).await?;
    info!(team_id = %team.team_id, "team created");

    let admin = Lct::new_unchecked("web4:entity:admin".to_string());
    team.set_admin(admin.clone()).await?;
    team.add_member(admin.clone(), Role::Admin, Some(100.0)).await?;

    let member = Lct::new_unchecked("web4:entity:member-1".to_string());
    team.add_member(member.clone(), Role::Member, Some(50.0)).await?;
    info!(members = team.member_count(), "membership established");

    team.pulse(None).await?;
    let chain = team.verify_audit_chain().await?;
    info!(valid = chain.is_valid, entries = chain.entries_verified, "audit chain verified");

    let federation = FederationRegistry::new("demo-federation");
    federation.register_team(
        &team.team_id,
        "Demo Team",
        vec!["governance".to_string()],
        None,
        admin.as_str(),
        admin.as_str(),
        team.member_count() as u64,
    )?;
    info!("team registered with federation registry");

    let now = Utc::now();
    let multi_federation = MultiFederationRegistry::new();
    multi_federation.register_federation("fed-demo", "Demo Federation", now);
    multi_federation.register_federation("fed-partner", "Partner Federation", now);
    multi_federation.establish_trust("fed-demo", "fed-partner", FederationRelationship::Peer, now).await?;

    let aggregator = ReputationAggregator::new();
    let reputation = aggregator.calculate_reputation(&multi_federation, "fed-demo", now).await?;
    info!(tier = ?reputation.tier, score = reputation.global_reputation, "reputation computed");

    let defenses = DefenseLedger::new();
    let resilience = defenses.analyze_partition_resilience(&multi_federation);
    info!(risk = ?resilience.risk_level, bridges = resilience.bridges.len(), "partition resilience scanned");

    info!("hardbound demo run complete");
    Ok(())
}
