//! Rate limiter data model (spec §4.3).

use serde::{Deserialize, Serialize};

/// Which axis a [`RateLimitRule`] buckets on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One bucket shared by the whole team.
    Global,
    /// One bucket per LCT.
    PerLct,
    /// One bucket per action type.
    PerAction,
}

/// A named rate limit rule: capacity and refill parameters for one bucket family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub name: String,
    pub scope: RateLimitScope,
    pub max_requests: u64,
    pub window_seconds: u64,
    pub burst_allowance: u64,
    pub cooldown_seconds: u64,
}

impl RateLimitRule {
    pub fn new(name: impl Into<String>, scope: RateLimitScope, max_requests: u64, window_seconds: u64) -> Self {
        Self {
            name: name.into(),
            scope,
            max_requests,
            window_seconds,
            burst_allowance: 0,
            cooldown_seconds: 0,
        }
    }

    pub fn with_burst(mut self, burst_allowance: u64) -> Self {
        self.burst_allowance = burst_allowance;
        self
    }

    pub fn with_cooldown(mut self, cooldown_seconds: u64) -> Self {
        self.cooldown_seconds = cooldown_seconds;
        self
    }

    pub(crate) fn capacity(&self) -> f64 {
        (self.max_requests + self.burst_allowance) as f64
    }

    pub(crate) fn refill_rate_per_sec(&self) -> f64 {
        self.max_requests as f64 / self.window_seconds.max(1) as f64
    }
}

/// Outcome of [`crate::RateLimiter::check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_seconds: u64,
    pub retry_after_secs: u64,
    pub rule_name: String,
    pub reason: String,
}
