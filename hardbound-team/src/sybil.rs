//! Behavioral-correlation Sybil detection (spec §4.6 supplement, grounded on
//! `sybil_detection.py`). Four independent signals over a team's members —
//! trust-trajectory correlation, action-timing correlation, witness-pair
//! concentration, and trust-variance uniformity — merged into clusters and
//! scored into an overall risk band.
//!
//! Pure functions: no I/O, no team state. `hardbound-team::engine` feeds it
//! a snapshot and records the result.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use hardbound_trust::{Dimension, TrustVector};

use crate::types::{SybilCluster, SybilReport, SybilRisk};

const TRUST_CORRELATION_THRESHOLD: f64 = 0.85;
const TIMING_WINDOW_SECONDS: f64 = 10.0;
const TIMING_CORRELATION_THRESHOLD: f64 = 0.70;
const WITNESS_CONCENTRATION_THRESHOLD: f64 = 0.80;
const TRUST_VARIANCE_THRESHOLD: f64 = 0.002;

/// Run all four signals over `member_trusts` and merge their clusters into
/// one report. `action_timestamps` and `witness_pairs` are optional —
/// omitting them just skips the corresponding signal, same as the source's
/// `None` defaults.
pub fn analyze_team(
    team_id: &str,
    member_trusts: &BTreeMap<String, TrustVector>,
    action_timestamps: Option<&HashMap<String, Vec<DateTime<Utc>>>>,
    witness_pairs: Option<&[(String, String)]>,
    now: DateTime<Utc>,
) -> SybilReport {
    let member_count = member_trusts.len();
    if member_count < 2 {
        return SybilReport {
            team_id: team_id.to_string(),
            analyzed_at: now,
            member_count,
            clusters: Vec::new(),
            overall_risk: SybilRisk::None,
            recommendations: Vec::new(),
        };
    }

    let mut signal_clusters: Vec<Vec<SybilCluster>> = Vec::new();
    signal_clusters.push(detect_trust_correlation(member_trusts));
    if let Some(timestamps) = action_timestamps {
        signal_clusters.push(detect_timing_correlation(timestamps));
    }
    if let Some(pairs) = witness_pairs {
        let all_members: HashSet<String> = member_trusts.keys().cloned().collect();
        signal_clusters.push(detect_witness_concentration(pairs, &all_members));
    }
    signal_clusters.push(detect_trust_variance(member_trusts));

    let clusters = merge_clusters(&signal_clusters);
    let overall_risk = clusters
        .iter()
        .map(|c| c.confidence)
        .fold(0.0_f64, f64::max);
    let overall_risk = SybilRisk::from_confidence(overall_risk);
    let recommendations = generate_recommendations(overall_risk, &clusters);

    SybilReport {
        team_id: team_id.to_string(),
        analyzed_at: now,
        member_count,
        clusters,
        overall_risk,
        recommendations,
    }
}

/// Pairwise Pearson correlation of each member's six-dimension trust vector.
/// A pair moving in lockstep across all dimensions is the signature of a
/// single operator puppeting several LCTs.
fn detect_trust_correlation(member_trusts: &BTreeMap<String, TrustVector>) -> Vec<SybilCluster> {
    let ids: Vec<&String> = member_trusts.keys().collect();
    let mut clusters = Vec::new();

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let a = member_trusts[ids[i]];
            let b = member_trusts[ids[j]];
            let xs: Vec<f64> = Dimension::ALL.iter().map(|d| a.get(*d)).collect();
            let ys: Vec<f64> = Dimension::ALL.iter().map(|d| b.get(*d)).collect();
            let r = pearson_correlation(&xs, &ys);
            if r >= TRUST_CORRELATION_THRESHOLD {
                clusters.push(SybilCluster {
                    members: vec![ids[i].clone(), ids[j].clone()],
                    confidence: (r * 0.5).min(1.0),
                    signals: vec!["trust_trajectory_correlation".to_string()],
                    trust_correlation: r,
                    timing_correlation: 0.0,
                    witness_concentration: 0.0,
                    trust_variance: 0.0,
                });
            }
        }
    }
    clusters
}

/// Pairwise fraction of action timestamps that land within
/// [`TIMING_WINDOW_SECONDS`] of each other — bots firing on the same
/// schedule. Members with fewer than 3 timestamps are skipped (too little
/// signal to distinguish coincidence from correlation).
fn detect_timing_correlation(action_timestamps: &HashMap<String, Vec<DateTime<Utc>>>) -> Vec<SybilCluster> {
    let ids: Vec<&String> = action_timestamps
        .iter()
        .filter(|(_, ts)| ts.len() >= 3)
        .map(|(id, _)| id)
        .collect();
    let mut clusters = Vec::new();

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let a = &action_timestamps[ids[i]];
            let b = &action_timestamps[ids[j]];
            let mut simultaneous = 0usize;
            let mut compared = 0usize;
            for ta in a {
                for tb in b {
                    compared += 1;
                    let delta = (*ta - *tb).num_milliseconds().abs() as f64 / 1000.0;
                    if delta <= TIMING_WINDOW_SECONDS {
                        simultaneous += 1;
                    }
                }
            }
            if compared == 0 {
                continue;
            }
            let ratio = simultaneous as f64 / compared as f64;
            if ratio >= TIMING_CORRELATION_THRESHOLD {
                clusters.push(SybilCluster {
                    members: vec![ids[i].clone(), ids[j].clone()],
                    confidence: (ratio * 0.4).min(1.0),
                    signals: vec!["timing_correlation".to_string()],
                    trust_correlation: 0.0,
                    timing_correlation: ratio,
                    witness_concentration: 0.0,
                    trust_variance: 0.0,
                });
            }
        }
    }
    clusters
}

/// A closed loop: two members witnessing mostly (or only) each other, with
/// enough volume to rule out coincidence.
fn detect_witness_concentration(
    witness_pairs: &[(String, String)],
    all_members: &HashSet<String>,
) -> Vec<SybilCluster> {
    let mut witness_by: HashMap<String, HashMap<String, usize>> = HashMap::new();
    for (witness, target) in witness_pairs {
        *witness_by
            .entry(target.clone())
            .or_default()
            .entry(witness.clone())
            .or_insert(0) += 1;
    }

    let mut clusters = Vec::new();
    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();

    for target in all_members {
        let Some(by_witness) = witness_by.get(target) else {
            continue;
        };
        let total: usize = by_witness.values().sum();
        if total < 3 {
            continue;
        }
        let Some((top_witness, &top_count)) = by_witness.iter().max_by_key(|(_, &c)| c) else {
            continue;
        };
        let concentration = top_count as f64 / total as f64;
        if concentration < WITNESS_CONCENTRATION_THRESHOLD {
            continue;
        }

        let reciprocal_total: usize = witness_by
            .get(top_witness)
            .map(|m| m.values().sum())
            .unwrap_or(0);
        let reciprocal_count = witness_by
            .get(top_witness)
            .and_then(|m| m.get(target))
            .copied()
            .unwrap_or(0);
        let reciprocal_concentration = if reciprocal_total > 0 {
            reciprocal_count as f64 / reciprocal_total as f64
        } else {
            0.0
        };
        if reciprocal_concentration < 0.40 {
            continue;
        }

        let pair_key = {
            let mut pair = [target.clone(), top_witness.clone()];
            pair.sort();
            (pair[0].clone(), pair[1].clone())
        };
        if !seen_pairs.insert(pair_key.clone()) {
            continue;
        }

        let avg_concentration = (concentration + reciprocal_concentration) / 2.0;
        clusters.push(SybilCluster {
            members: vec![pair_key.0, pair_key.1],
            confidence: (avg_concentration * 0.6).min(1.0),
            signals: vec!["witness_concentration".to_string()],
            trust_correlation: 0.0,
            timing_correlation: 0.0,
            witness_concentration: avg_concentration,
            trust_variance: 0.0,
        });
    }
    clusters
}

/// Groups of 3+ members whose weighted trust scores sit within
/// [`TRUST_VARIANCE_THRESHOLD`] of each other — uniform scores a single
/// operator assigns its puppets rather than scores earned independently.
fn detect_trust_variance(member_trusts: &BTreeMap<String, TrustVector>) -> Vec<SybilCluster> {
    let scores: Vec<(String, f64)> = member_trusts
        .iter()
        .map(|(id, t)| (id.clone(), t.score()))
        .collect();

    let mut clusters = Vec::new();
    let mut used = HashSet::new();

    for i in 0..scores.len() {
        if used.contains(&i) {
            continue;
        }
        let mut group = vec![i];
        for j in 0..scores.len() {
            if i == j || used.contains(&j) {
                continue;
            }
            if (scores[i].1 - scores[j].1).abs() < TRUST_VARIANCE_THRESHOLD {
                group.push(j);
            }
        }
        if group.len() < 3 {
            continue;
        }
        for &idx in &group {
            used.insert(idx);
        }
        let values: Vec<f64> = group.iter().map(|&idx| scores[idx].1).collect();
        let var = variance(&values);
        clusters.push(SybilCluster {
            members: group.iter().map(|&idx| scores[idx].0.clone()).collect(),
            confidence: 0.3,
            signals: vec!["trust_variance_uniformity".to_string()],
            trust_correlation: 0.0,
            timing_correlation: 0.0,
            witness_concentration: 0.0,
            trust_variance: var,
        });
    }
    clusters
}

/// Merge per-signal clusters into pairwise aggregates. Two-member clusters
/// accumulate confidence (summed, capped at 1.0) across signals that land on
/// the same pair; clusters wider than two members (only the variance signal
/// produces these) fan out to every contained pair but contribute via max,
/// not sum, so one uniform-trust group doesn't multiply-count itself.
fn merge_clusters(signal_clusters: &[Vec<SybilCluster>]) -> Vec<SybilCluster> {
    let mut pair_signals: BTreeMap<(String, String), SybilCluster> = BTreeMap::new();

    for clusters in signal_clusters {
        for cluster in clusters {
            let mut members = cluster.members.clone();
            members.sort();

            if members.len() == 2 {
                let key = (members[0].clone(), members[1].clone());
                let entry = pair_signals.entry(key.clone()).or_insert_with(|| SybilCluster {
                    members: vec![key.0.clone(), key.1.clone()],
                    ..Default::default()
                });
                entry.confidence = (entry.confidence + cluster.confidence).min(1.0);
                merge_signal_fields(entry, cluster);
                continue;
            }

            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let key = (members[i].clone(), members[j].clone());
                    let entry = pair_signals.entry(key.clone()).or_insert_with(|| SybilCluster {
                        members: vec![key.0.clone(), key.1.clone()],
                        ..Default::default()
                    });
                    entry.confidence = entry.confidence.max(cluster.confidence);
                    merge_signal_fields(entry, cluster);
                }
            }
        }
    }

    pair_signals
        .into_values()
        .filter(|c| c.confidence >= 0.3)
        .collect()
}

fn merge_signal_fields(entry: &mut SybilCluster, cluster: &SybilCluster) {
    for signal in &cluster.signals {
        if !entry.signals.contains(signal) {
            entry.signals.push(signal.clone());
        }
    }
    entry.trust_correlation = entry.trust_correlation.max(cluster.trust_correlation);
    entry.timing_correlation = entry.timing_correlation.max(cluster.timing_correlation);
    entry.witness_concentration = entry.witness_concentration.max(cluster.witness_concentration);
    entry.trust_variance = if entry.trust_variance == 0.0 {
        cluster.trust_variance
    } else {
        entry.trust_variance.min(cluster.trust_variance)
    };
}

fn generate_recommendations(risk: SybilRisk, clusters: &[SybilCluster]) -> Vec<String> {
    let mut recs = Vec::new();
    match risk {
        SybilRisk::Critical => recs.push(
            "critical Sybil risk detected: suspend witnessing privileges for the flagged \
             members pending manual review"
                .to_string(),
        ),
        SybilRisk::High => recs.push(
            "high Sybil risk detected: require multi-sig review before any further trust \
             or ATP changes for the flagged members"
                .to_string(),
        ),
        SybilRisk::Moderate => {
            recs.push("moderate Sybil risk detected: monitor the flagged members' activity".to_string())
        }
        SybilRisk::Low | SybilRisk::None => {}
    }
    for cluster in clusters {
        if cluster.signals.iter().any(|s| s == "witness_concentration") {
            recs.push(format!(
                "members {:?} witness almost exclusively each other; diversify witnessing",
                cluster.members
            ));
        }
        if cluster.signals.iter().any(|s| s == "trust_variance_uniformity") {
            recs.push(format!(
                "members {:?} hold near-identical trust scores; verify independent activity",
                cluster.members
            ));
        }
    }
    recs
}

fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len();
    if n == 0 || n != ys.len() {
        return 0.0;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn fewer_than_two_members_is_always_clean() {
        let mut trusts = BTreeMap::new();
        trusts.insert("a".to_string(), TrustVector::default());
        let report = analyze_team("t1", &trusts, None, None, at(0));
        assert_eq!(report.overall_risk, SybilRisk::None);
        assert!(report.clusters.is_empty());
    }

    #[test]
    fn identical_trust_vectors_trip_correlation_and_variance() {
        let mut trusts = BTreeMap::new();
        for id in ["a", "b", "c"] {
            let mut t = TrustVector::default();
            t.competence = 0.91;
            t.reliability = 0.87;
            trusts.insert(id.to_string(), t);
        }
        let report = analyze_team("t1", &trusts, None, None, at(0));
        assert_eq!(report.overall_risk, SybilRisk::Critical);
        assert!(report
            .clusters
            .iter()
            .any(|c| c.signals.contains(&"trust_variance_uniformity".to_string())));
    }

    #[test]
    fn diverse_trust_is_clean() {
        let mut trusts = BTreeMap::new();
        let mut a = TrustVector::default();
        a.competence = 0.9;
        a.reliability = 0.2;
        a.alignment = 0.6;
        let mut b = TrustVector::default();
        b.competence = 0.1;
        b.reliability = 0.9;
        b.alignment = 0.3;
        let mut c = TrustVector::default();
        c.competence = 0.5;
        c.reliability = 0.5;
        c.alignment = 0.9;
        trusts.insert("a".to_string(), a);
        trusts.insert("b".to_string(), b);
        trusts.insert("c".to_string(), c);
        let report = analyze_team("t1", &trusts, None, None, at(0));
        assert_eq!(report.overall_risk, SybilRisk::None);
    }

    #[test]
    fn mutual_witnessing_loop_is_flagged() {
        let mut trusts = BTreeMap::new();
        trusts.insert("a".to_string(), TrustVector::default());
        trusts.insert("b".to_string(), TrustVector::default());
        let mut members = HashSet::new();
        members.insert("a".to_string());
        members.insert("b".to_string());

        let pairs: Vec<(String, String)> = (0..5)
            .flat_map(|_| vec![("a".to_string(), "b".to_string()), ("b".to_string(), "a".to_string())])
            .collect();

        let report = analyze_team("t1", &trusts, None, Some(&pairs), at(0));
        assert!(report
            .clusters
            .iter()
            .any(|c| c.signals.contains(&"witness_concentration".to_string())));
    }

    #[test]
    fn timing_bots_are_flagged() {
        let mut trusts = BTreeMap::new();
        trusts.insert("a".to_string(), TrustVector::default());
        trusts.insert("b".to_string(), TrustVector::default());
        let mut timestamps = HashMap::new();
        timestamps.insert("a".to_string(), vec![at(0), at(100), at(200), at(300)]);
        timestamps.insert("b".to_string(), vec![at(1), at(101), at(199), at(301)]);

        let report = analyze_team("t1", &trusts, Some(&timestamps), None, at(0));
        assert!(report
            .clusters
            .iter()
            .any(|c| c.signals.contains(&"timing_correlation".to_string())));
    }
}
