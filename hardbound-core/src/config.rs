//! Layered configuration for the governance substrate.
//!
//! Settings are resolved through the `config` crate with this precedence:
//! built-in defaults, then an optional `hardbound.toml` (or `.json`/`.yaml`)
//! file, then `HARDBOUND_*` environment variables, each layer overriding the
//! last. Nothing here is governance logic — it only tells the rest of the
//! crates their operating constants (decay periods, base ATP rates, trust
//! weights) so those can be tuned per deployment without a recompile.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// Root configuration object, one section per downstream crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    pub ledger: LedgerConfig,
    pub heartbeat: HeartbeatConfig,
    pub trust: TrustConfig,
    pub ratelimit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Audit ledger settings (spec §2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// ATP balance a fresh session starts with.
    pub initial_atp_reserve: f64,
    /// Maximum audit records retained per session before older ones are
    /// summarized rather than kept verbatim (0 = unbounded).
    pub max_records_per_session: usize,
}

/// Metabolic heartbeat settings (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Base ATP consumed per nominal interval at `active` energy multiplier 1.0.
    pub base_atp_rate: f64,
    /// Fraction of max reserves below which `atp_critical` auto-transition fires.
    pub atp_critical_threshold: f64,
}

/// Trust engine settings (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Length of one decay period.
    #[serde(with = "duration_secs")]
    pub decay_period: Duration,
    /// Maximum upward trust movement allowed per UTC calendar day, per dimension.
    pub daily_velocity_cap: f64,
}

/// Token-bucket rate limiting settings (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether exceeding a bucket raises the bucket's own future cooldown
    /// (spec's `auto_raise` rule behavior) instead of just rejecting.
    pub auto_raise_on_exceed: bool,
}

/// Structured logging settings, mirroring the teacher's `ObservabilityConfig`
/// logging section but scoped to what this crate family actually emits:
/// there is no metrics or tracing-collector endpoint here, only the
/// `tracing` subscriber's own level and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "hardbound=debug".
    pub filter: String,
    /// Emit newline-delimited JSON instead of human-readable formatting.
    pub json: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig {
                initial_atp_reserve: 1000.0,
                max_records_per_session: 0,
            },
            heartbeat: HeartbeatConfig {
                base_atp_rate: 1.0,
                atp_critical_threshold: 0.10,
            },
            trust: TrustConfig {
                decay_period: Duration::from_secs(86_400),
                daily_velocity_cap: 0.05,
            },
            ratelimit: RateLimitConfig {
                auto_raise_on_exceed: true,
            },
            logging: LoggingConfig {
                filter: "info".to_string(),
                json: false,
            },
        }
    }
}

impl GovernanceConfig {
    /// Load defaults, then an optional config file (no extension required —
    /// `config` probes `hardbound.{toml,json,yaml}`), then `HARDBOUND_`
    /// prefixed environment variables, e.g. `HARDBOUND_TRUST__DAILY_VELOCITY_CAP=0.1`.
    pub fn load() -> Result<Self, GovernanceError> {
        let defaults = Self::default();
        let defaults_value = config::Config::try_from(&defaults)
            .map_err(|e| GovernanceError::validation("config", e.to_string()))?;

        let built = config::Config::builder()
            .add_source(defaults_value)
            .add_source(config::File::with_name("hardbound").required(false))
            .add_source(config::Environment::with_prefix("HARDBOUND").separator("__"))
            .build()
            .map_err(|e| GovernanceError::validation("config", e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| GovernanceError::validation("config", e.to_string()))
    }
}

/// (De)serialize a `Duration` as whole seconds, since the `config` crate's
/// environment/file sources hand us plain numbers, not `{secs, nanos}` maps.
mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = GovernanceConfig::default();
        assert!(config.trust.daily_velocity_cap > 0.0);
        assert!(config.heartbeat.atp_critical_threshold < 1.0);
    }
}
