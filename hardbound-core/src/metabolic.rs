//! Metabolic state table shared by the heartbeat ledger and the trust engine
//! (trust decay's metabolic factor reads the same state enum).
//!
//! Values grounded on `examples/original_source/hardbound/heartbeat_ledger.py`
//! (`ENERGY_MULTIPLIER`, `NOMINAL_INTERVAL`, decay's per-state rate, and
//! `VALID_TRANSITIONS`), matching spec §4.2's state list and interval range.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GovernanceError;

/// A team-wide activity label that scales energy consumption and trust decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetabolicState {
    Active,
    Rest,
    Sleep,
    Hibernation,
    Torpor,
    Estivation,
    Dreaming,
    Molting,
}

impl MetabolicState {
    pub const ALL: [MetabolicState; 8] = [
        MetabolicState::Active,
        MetabolicState::Rest,
        MetabolicState::Sleep,
        MetabolicState::Hibernation,
        MetabolicState::Torpor,
        MetabolicState::Estivation,
        MetabolicState::Dreaming,
        MetabolicState::Molting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetabolicState::Active => "active",
            MetabolicState::Rest => "rest",
            MetabolicState::Sleep => "sleep",
            MetabolicState::Hibernation => "hibernation",
            MetabolicState::Torpor => "torpor",
            MetabolicState::Estivation => "estivation",
            MetabolicState::Dreaming => "dreaming",
            MetabolicState::Molting => "molting",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, GovernanceError> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == raw)
            .ok_or_else(|| {
                GovernanceError::validation("metabolic_state", format!("unknown state '{raw}'"))
            })
    }

    /// Multiplier applied to the base per-second ATP rate while in this state.
    pub fn energy_multiplier(&self) -> f64 {
        match self {
            MetabolicState::Active => 1.0,
            MetabolicState::Rest => 0.4,
            MetabolicState::Sleep => 0.15,
            MetabolicState::Hibernation => 0.05,
            MetabolicState::Torpor => 0.02,
            MetabolicState::Estivation => 0.10,
            MetabolicState::Dreaming => 0.20,
            MetabolicState::Molting => 0.60,
        }
    }

    /// Nominal heartbeat interval in seconds, from 60s (active) to 7200s (torpor).
    pub fn nominal_interval_secs(&self) -> u64 {
        match self {
            MetabolicState::Active => 60,
            MetabolicState::Rest => 300,
            MetabolicState::Sleep => 1800,
            MetabolicState::Hibernation => 3600,
            MetabolicState::Torpor => 7200,
            MetabolicState::Estivation => 1800,
            MetabolicState::Dreaming => 600,
            MetabolicState::Molting => 120,
        }
    }

    /// Trust-decay metabolic factor (spec §4.4): active 1.0, rest 0.9,
    /// sleep 0.1, hibernation/torpor/dreaming 0.0 (frozen/recalibrating),
    /// molting 1.2 (accelerated, reflecting structural vulnerability).
    pub fn decay_factor(&self) -> f64 {
        match self {
            MetabolicState::Active => 1.0,
            MetabolicState::Rest => 0.9,
            MetabolicState::Sleep => 0.1,
            MetabolicState::Hibernation => 0.0,
            MetabolicState::Torpor => 0.0,
            MetabolicState::Estivation => 0.0,
            MetabolicState::Dreaming => 0.0,
            MetabolicState::Molting => 1.2,
        }
    }

    /// True for states wake-recalibration treats as dormant (spec §4.4).
    pub fn is_dormant(&self) -> bool {
        matches!(
            self,
            MetabolicState::Sleep
                | MetabolicState::Hibernation
                | MetabolicState::Torpor
                | MetabolicState::Estivation
        )
    }

    /// Minimum dwell time in seconds before exiting incurs no wake penalty,
    /// for the three states the wake-penalty formula applies to.
    pub fn min_dwell_secs(&self) -> Option<u64> {
        match self {
            MetabolicState::Sleep => Some(3600),
            MetabolicState::Hibernation => Some(86_400),
            MetabolicState::Dreaming => Some(600),
            _ => None,
        }
    }

    /// Full wake penalty in ATP for exiting this state at time zero dwell.
    pub fn wake_penalty_atp(&self) -> f64 {
        match self {
            MetabolicState::Sleep => 10.0,
            MetabolicState::Hibernation => 100.0,
            MetabolicState::Dreaming => 50.0,
            _ => 0.0,
        }
    }

    /// The sparse directed graph of legal transitions (spec §4.2).
    pub fn valid_targets(&self) -> &'static [MetabolicState] {
        use MetabolicState::*;
        match self {
            Active => &[Rest, Sleep, Torpor, Dreaming, Molting, Estivation],
            Rest => &[Active, Sleep],
            Sleep => &[Active, Hibernation],
            Hibernation => &[Active],
            Torpor => &[Active, Hibernation],
            Estivation => &[Active, Hibernation],
            Dreaming => &[Active],
            Molting => &[Active],
        }
    }

    pub fn can_transition_to(&self, target: MetabolicState) -> bool {
        self.valid_targets().contains(&target)
    }
}

impl fmt::Display for MetabolicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_may_reach_six_states() {
        assert_eq!(MetabolicState::Active.valid_targets().len(), 6);
        assert!(MetabolicState::Active.can_transition_to(MetabolicState::Torpor));
        assert!(!MetabolicState::Active.can_transition_to(MetabolicState::Hibernation));
    }

    #[test]
    fn hibernation_only_wakes_to_active() {
        assert_eq!(
            MetabolicState::Hibernation.valid_targets(),
            &[MetabolicState::Active]
        );
    }

    #[test]
    fn round_trips_through_str() {
        for state in MetabolicState::ALL {
            assert_eq!(MetabolicState::parse(state.as_str()).unwrap(), state);
        }
    }
}
