//! Pure trust-transition functions (spec §4.4, §9 "separate the pure
//! state-transition functions from the storage adapter"). This module holds
//! no state of its own — every function takes the vectors/counters it needs
//! and returns the updated value, exactly the `(state, event) -> state'`
//! shape spec §9 calls for.

use chrono::{DateTime, Duration, Utc};
use hardbound_core::MetabolicState;

use crate::types::{ActivityWindow, Dimension, Outcome, TrustVector, VelocityCounters, WitnessLog, BASELINE};

/// Decay period length (spec §4.4 default: 1 day).
const DECAY_PERIOD_SECS: f64 = 86_400.0;

/// Activity-factor base and normalization window (spec §4.4).
const ACTIVITY_FACTOR_BASE: f64 = 0.3;
const ACTIVITY_WINDOW_SECS: f64 = 7.0 * 86_400.0;

/// Trust above this value decays at half rate ("sustained bonus", spec §4.4).
const SUSTAINED_THRESHOLD: f64 = 0.8;
const SUSTAINED_FACTOR: f64 = 0.5;

/// Apply time-based decay to every dimension of `trust`, from `last_update`
/// to `now`, given the quality-adjusted effective action count observed
/// over that span (spec §4.4, §8 invariant 5).
///
/// `metabolic_state` gates the metabolic factor; dormant/decaying-frozen
/// states slow or stop decay entirely.
pub fn apply_decay(
    trust: TrustVector,
    last_update: DateTime<Utc>,
    now: DateTime<Utc>,
    effective_action_count: f64,
    metabolic_state: MetabolicState,
) -> TrustVector {
    let delta_secs = (now - last_update).num_milliseconds().max(0) as f64 / 1000.0;
    let periods = delta_secs / DECAY_PERIOD_SECS;
    if periods <= 0.0 {
        return trust;
    }

    let activity_factor = activity_factor(effective_action_count, delta_secs);
    let metabolic_factor = metabolic_state.decay_factor();

    let mut decayed = trust;
    for dim in Dimension::ALL {
        let value = trust.get(dim);
        let mut rate = dim.decay_rate() * activity_factor * metabolic_factor;
        if value > SUSTAINED_THRESHOLD {
            rate *= SUSTAINED_FACTOR;
        }
        let diff = value - BASELINE;
        let decayed_diff = diff * (-rate * periods).exp();
        decayed.set(dim, BASELINE + decayed_diff);
    }
    decayed
}

/// More recent/frequent activity asymptotically slows decay toward
/// `ACTIVITY_FACTOR_BASE`; zero activity decays at the full base rate.
fn activity_factor(effective_action_count: f64, delta_secs: f64) -> f64 {
    if effective_action_count <= 0.0 {
        return 1.0;
    }
    let rate = (effective_action_count / delta_secs.max(1.0)) * ACTIVITY_WINDOW_SECS;
    ACTIVITY_FACTOR_BASE + (1.0 - ACTIVITY_FACTOR_BASE) * (-rate).exp()
}

/// Per-dimension relevance of an outcome update. A success/failure/partial
/// report is primarily about competence and reliability; consistency and
/// alignment move at a damped rate; witnesses and lineage are untouched by
/// outcomes directly (they move only through [`witness`] and team lineage
/// events respectively) — reuses each dimension's aggregate weight (spec
/// §3.2) as its relevance multiplier, since the source leaves "role-
/// appropriate multipliers" unspecified (see `DESIGN.md`).
fn outcome_relevance(dim: Dimension) -> f64 {
    match dim {
        Dimension::Competence => 1.0,
        Dimension::Reliability => 1.0,
        Dimension::Consistency => 0.6,
        Dimension::Alignment => 0.6,
        Dimension::Witnesses => 0.0,
        Dimension::Lineage => 0.0,
    }
}

/// Apply pending decay up to `now`, then a magnitude-scaled outcome delta,
/// capping any positive per-dimension move at the day's remaining velocity
/// headroom. Negative deltas are never capped (spec §4.4).
#[allow(clippy::too_many_arguments)]
pub fn apply_outcome(
    trust: TrustVector,
    last_update: DateTime<Utc>,
    now: DateTime<Utc>,
    effective_action_count: f64,
    metabolic_state: MetabolicState,
    outcome: Outcome,
    magnitude: f64,
    velocity: &mut VelocityCounters,
) -> TrustVector {
    let decayed = apply_decay(trust, last_update, now, effective_action_count, metabolic_state);

    let mut updated = decayed;
    let base = outcome.base_delta() * magnitude;
    for dim in Dimension::ALL {
        let raw_delta = base * outcome_relevance(dim);
        if raw_delta == 0.0 {
            continue;
        }
        let current = decayed.get(dim);
        let applied_delta = if raw_delta > 0.0 {
            let headroom = velocity.headroom(dim, now);
            let capped = raw_delta.min(headroom);
            if capped > 0.0 {
                velocity.record_gain(dim, capped, now);
            }
            capped
        } else {
            raw_delta
        };
        updated.set(dim, current + applied_delta);
    }
    updated
}

/// One member witnessing another (spec §4.4 "Witnessing"). `rejoin_at`, if
/// present, is the target's most recent re-add timestamp; witnessing within
/// 72h of it is blocked (post-rejoin cooldown).
pub fn witness(
    target_trust: TrustVector,
    target_witness_log: &mut WitnessLog,
    witness_lct: &str,
    quality: f64,
    now: DateTime<Utc>,
    rejoin_at: Option<DateTime<Utc>>,
    velocity: &mut VelocityCounters,
) -> Result<TrustVector, &'static str> {
    if let Some(rejoin) = rejoin_at {
        if now - rejoin < Duration::hours(72) {
            return Err("witnessing blocked: target rejoined within the last 72 hours");
        }
    }

    let n = target_witness_log.recent_count(witness_lct, now) as f64;
    let halflife = 3.0;
    let witness_delta = 0.03 * quality * 2f64.powf(-n / halflife);

    let mut updated = target_trust;
    for (dim, fraction) in [
        (Dimension::Witnesses, 1.0),
        (Dimension::Reliability, 0.30),
        (Dimension::Consistency, 0.20),
    ] {
        let raw_delta = witness_delta * fraction;
        let headroom = velocity.headroom(dim, now);
        let capped = raw_delta.max(0.0).min(headroom);
        if capped > 0.0 {
            velocity.record_gain(dim, capped, now);
        }
        updated.set(dim, updated.get(dim) + capped);
    }

    target_witness_log.record(witness_lct, now);
    Ok(updated)
}

/// Pull `trust` toward baseline on exit from a dormant state, proportional
/// to how long the member's team spent dormant (spec §4.4 "Wake
/// recalibration"): uncertainty accrues during sleep, so confidence in any
/// dimension resets partway back toward baseline.
pub fn wake_recalibrate(trust: TrustVector, dormancy_secs: f64) -> TrustVector {
    if dormancy_secs <= 0.0 {
        return trust;
    }
    // Full week of dormancy pulls all the way to baseline; shorter
    // dormancy pulls proportionally less.
    let pull = (dormancy_secs / (7.0 * 86_400.0)).min(1.0);
    let mut recalibrated = trust;
    for dim in Dimension::ALL {
        let value = trust.get(dim);
        recalibrated.set(dim, value + (BASELINE - value) * pull);
    }
    recalibrated
}

/// Substitute for a raw action count in decay math: the quality-adjusted
/// effective count over the window ending at `now` (spec §4.4).
pub fn effective_action_count(window: &ActivityWindow, now: DateTime<Utc>) -> f64 {
    window.effective_action_count(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(days)
    }

    #[test]
    fn decay_pulls_toward_baseline_over_time() {
        let mut trust = TrustVector::default();
        trust.reliability = 0.9;
        let decayed = apply_decay(trust, at(0), at(30), 0.0, MetabolicState::Active);
        assert!(decayed.reliability < 0.9);
        assert!(decayed.reliability > BASELINE);
    }

    #[test]
    fn no_time_elapsed_means_no_decay() {
        let trust = TrustVector::default();
        let decayed = apply_decay(trust, at(0), at(0), 0.0, MetabolicState::Active);
        assert_eq!(decayed, trust);
    }

    #[test]
    fn decay_matches_closed_form_within_tolerance() {
        let mut trust = TrustVector::default();
        trust.lineage = 0.9;
        let lambda = Dimension::Lineage.decay_rate(); // activity=1.0 (no actions), metabolic=1.0 active
        let periods = 5.0;
        let decayed = apply_decay(trust, at(0), at(5), 0.0, MetabolicState::Active);
        let expected = BASELINE + (0.9 - BASELINE) * (-lambda * periods).exp();
        assert!((decayed.lineage - expected).abs() < 1e-9);
    }

    #[test]
    fn dormant_state_freezes_decay() {
        let mut trust = TrustVector::default();
        trust.witnesses = 0.9;
        let decayed = apply_decay(trust, at(0), at(30), 0.0, MetabolicState::Hibernation);
        assert_eq!(decayed.witnesses, 0.9);
    }

    #[test]
    fn velocity_cap_limits_repeated_gains_within_a_day() {
        let mut velocity = VelocityCounters::default();
        let mut trust = TrustVector::default();
        for _ in 0..50 {
            trust = apply_outcome(
                trust,
                at(0),
                at(0),
                0.0,
                MetabolicState::Active,
                Outcome::Success,
                0.7,
                &mut velocity,
            );
        }
        assert!(trust.competence <= BASELINE + Dimension::Competence.daily_velocity_cap() + 1e-9);
        assert!(trust.reliability <= BASELINE + Dimension::Reliability.daily_velocity_cap() + 1e-9);
    }

    #[test]
    fn negative_deltas_are_never_capped() {
        let mut velocity = VelocityCounters::default();
        let mut trust = TrustVector::default();
        for _ in 0..20 {
            trust = apply_outcome(
                trust,
                at(0),
                at(0),
                0.0,
                MetabolicState::Active,
                Outcome::Failure,
                1.0,
                &mut velocity,
            );
        }
        assert!(trust.competence < BASELINE - Dimension::Competence.daily_velocity_cap());
    }

    #[test]
    fn witnessing_has_diminishing_returns_for_same_pair() {
        let mut log = WitnessLog::default();
        let mut velocity = VelocityCounters::default();
        let trust = TrustVector::default();
        let first = witness(trust, &mut log, "w1", 1.0, at(0), None, &mut velocity).unwrap();
        velocity = VelocityCounters::default();
        let second = witness(first, &mut log, "w1", 1.0, at(1), None, &mut velocity).unwrap();
        let first_gain = first.witnesses - BASELINE;
        let second_gain = second.witnesses - first.witnesses;
        assert!(second_gain < first_gain);
    }

    #[test]
    fn witnessing_blocked_during_rejoin_cooldown() {
        let mut log = WitnessLog::default();
        let mut velocity = VelocityCounters::default();
        let trust = TrustVector::default();
        let rejoin = at(0);
        let result = witness(trust, &mut log, "w1", 1.0, rejoin + Duration::hours(1), Some(rejoin), &mut velocity);
        assert!(result.is_err());
    }

    #[test]
    fn wake_recalibration_scales_with_dormancy() {
        let mut trust = TrustVector::default();
        trust.competence = 0.9;
        let short = wake_recalibrate(trust, 3600.0);
        let long = wake_recalibrate(trust, 7.0 * 86_400.0);
        assert!(short.competence > long.competence);
        assert!((long.competence - BASELINE).abs() < 1e-9);
    }

    #[test]
    fn score_uses_fixed_weights_without_renormalizing() {
        let trust = TrustVector::default();
        assert!((trust.score() - BASELINE).abs() < 1e-9);
    }
}
