//! `RateLimiter`: token-bucket throttling per (scope, rule) key (spec §4.3).

use std::time::Instant;

use dashmap::DashMap;
use hardbound_core::{GovernanceError, Result};
use parking_lot::Mutex;
use tracing::warn;

use crate::types::{RateLimitResult, RateLimitRule, RateLimitScope};

struct TokenBucket {
    capacity: f64,
    refill_rate_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_rate_per_sec,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = (now - self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until at least one token is available.
    fn seconds_to_next_token(&self) -> u64 {
        if self.refill_rate_per_sec <= 0.0 {
            u64::MAX
        } else {
            (1.0 / self.refill_rate_per_sec).ceil() as u64
        }
    }
}

/// The default rule table (spec §4.3): fixed unless an admin reconfigures
/// the limiter explicitly via [`RateLimiter::add_rule`].
pub fn default_rules() -> Vec<RateLimitRule> {
    vec![
        RateLimitRule::new("r6_requests", RateLimitScope::PerLct, 60, 60).with_burst(10),
        RateLimitRule::new("global_requests", RateLimitScope::Global, 1000, 60).with_burst(100),
        RateLimitRule::new("lct_creation", RateLimitScope::Global, 10, 3600)
            .with_burst(2)
            .with_cooldown(60),
        RateLimitRule::new("audit_entries", RateLimitScope::PerLct, 100, 60).with_burst(20),
        RateLimitRule::new("proposals", RateLimitScope::PerLct, 5, 3600).with_burst(1),
        RateLimitRule::new("atp_operations", RateLimitScope::PerLct, 30, 60).with_burst(5),
        RateLimitRule::new("auth_attempts", RateLimitScope::PerLct, 5, 300).with_cooldown(300),
    ]
}

/// Token-bucket limiter keyed by (scope, rule). One bucket per key, created
/// lazily on first use; buckets and cooldown deadlines live behind a
/// `DashMap` so concurrent callers never serialize across unrelated keys.
pub struct RateLimiter {
    rules: DashMap<String, RateLimitRule>,
    buckets: DashMap<String, Mutex<TokenBucket>>,
    cooldowns: DashMap<String, Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// A limiter preloaded with the spec's default rule table.
    pub fn new() -> Self {
        let limiter = Self {
            rules: DashMap::new(),
            buckets: DashMap::new(),
            cooldowns: DashMap::new(),
        };
        for rule in default_rules() {
            limiter.rules.insert(rule.name.clone(), rule);
        }
        limiter
    }

    /// A limiter with no rules at all; unknown rule names always allow.
    pub fn empty() -> Self {
        Self {
            rules: DashMap::new(),
            buckets: DashMap::new(),
            cooldowns: DashMap::new(),
        }
    }

    pub fn add_rule(&self, rule: RateLimitRule) {
        self.rules.insert(rule.name.clone(), rule);
    }

    fn bucket_key(&self, rule_name: &str, lct: Option<&str>, action: Option<&str>) -> String {
        match self.rules.get(rule_name).map(|r| r.scope) {
            Some(RateLimitScope::Global) => format!("global:{rule_name}"),
            Some(RateLimitScope::PerLct) => format!("lct:{}:{rule_name}", lct.unwrap_or("unknown")),
            Some(RateLimitScope::PerAction) => {
                format!("action:{}:{rule_name}", action.unwrap_or("unknown"))
            }
            None => format!("unknown:{rule_name}"),
        }
    }

    /// Check (and, if `consume`, debit) one token from the bucket for
    /// `rule_name`/`lct`/`action`. Unknown rule names always allow — the
    /// same "unknown rule, allow" fallback the source uses.
    pub fn check(
        &self,
        rule_name: &str,
        lct: Option<&str>,
        action: Option<&str>,
        consume: bool,
    ) -> RateLimitResult {
        let Some(rule) = self.rules.get(rule_name).map(|r| r.clone()) else {
            return RateLimitResult {
                allowed: true,
                remaining: 999,
                reset_seconds: 0,
                retry_after_secs: 0,
                rule_name: rule_name.to_string(),
                reason: "unknown rule - allowing".to_string(),
            };
        };

        let key = self.bucket_key(rule_name, lct, action);

        if let Some(cooldown_end) = self.cooldowns.get(&key).map(|e| *e) {
            let now = Instant::now();
            if now < cooldown_end {
                let retry_after = (cooldown_end - now).as_secs() + 1;
                return RateLimitResult {
                    allowed: false,
                    remaining: 0,
                    reset_seconds: retry_after,
                    retry_after_secs: retry_after,
                    rule_name: rule_name.to_string(),
                    reason: format!("in cooldown for {retry_after}s"),
                };
            }
            self.cooldowns.remove(&key);
        }

        let bucket_entry = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Mutex::new(TokenBucket::new(rule.capacity(), rule.refill_rate_per_sec())));
        let mut bucket = bucket_entry.lock();

        if consume {
            if bucket.try_consume() {
                let remaining = bucket.available();
                RateLimitResult {
                    allowed: true,
                    remaining: remaining as u64,
                    reset_seconds: (rule.window_seconds as f64 * (1.0 - remaining / bucket.capacity))
                        .max(0.0) as u64,
                    retry_after_secs: 0,
                    rule_name: rule_name.to_string(),
                    reason: "ok".to_string(),
                }
            } else {
                let wait = bucket.seconds_to_next_token();
                if rule.cooldown_seconds > 0 {
                    self.cooldowns
                        .insert(key, Instant::now() + std::time::Duration::from_secs(rule.cooldown_seconds));
                }
                warn!(rule = %rule_name, "rate limit exceeded");
                RateLimitResult {
                    allowed: false,
                    remaining: 0,
                    reset_seconds: wait,
                    retry_after_secs: wait + rule.cooldown_seconds,
                    rule_name: rule_name.to_string(),
                    reason: "rate limit exceeded".to_string(),
                }
            }
        } else {
            let remaining = bucket.available();
            RateLimitResult {
                allowed: remaining >= 1.0,
                remaining: remaining as u64,
                reset_seconds: (rule.window_seconds as f64 * (1.0 - remaining / bucket.capacity)).max(0.0)
                    as u64,
                retry_after_secs: 0,
                rule_name: rule_name.to_string(),
                reason: if remaining >= 1.0 { "ok" } else { "would exceed limit" }.to_string(),
            }
        }
    }

    /// Like [`Self::check`] but turns a denial into a `RateLimitExceeded`
    /// error instead of returning a denial record (spec §4.3 `auto_raise`).
    pub fn check_or_raise(&self, rule_name: &str, lct: Option<&str>, action: Option<&str>) -> Result<RateLimitResult> {
        let result = self.check(rule_name, lct, action, true);
        if !result.allowed {
            return Err(GovernanceError::rate_limited(result.retry_after_secs, result.reason));
        }
        Ok(result)
    }

    /// Reset a specific bucket and any cooldown on it (admin action).
    pub fn reset(&self, rule_name: &str, lct: Option<&str>, action: Option<&str>) {
        let key = self.bucket_key(rule_name, lct, action);
        self.buckets.remove(&key);
        self.cooldowns.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_cover_the_spec_table() {
        let limiter = RateLimiter::new();
        assert!(limiter.rules.contains_key("r6_requests"));
        assert!(limiter.rules.contains_key("auth_attempts"));
        assert_eq!(limiter.rules.len(), 7);
    }

    #[test]
    fn bucket_exhausts_then_recovers_on_refill() {
        let limiter = RateLimiter::empty();
        limiter.add_rule(RateLimitRule::new("tiny", RateLimitScope::PerLct, 2, 1));
        assert!(limiter.check("tiny", Some("a"), None, true).allowed);
        assert!(limiter.check("tiny", Some("a"), None, true).allowed);
        let denied = limiter.check("tiny", Some("a"), None, true);
        assert!(!denied.allowed);
    }

    #[test]
    fn unknown_rule_always_allows() {
        let limiter = RateLimiter::empty();
        let result = limiter.check("nonexistent", None, None, true);
        assert!(result.allowed);
    }

    #[test]
    fn cooldown_blocks_until_expiry() {
        let limiter = RateLimiter::empty();
        limiter.add_rule(
            RateLimitRule::new("locked", RateLimitScope::PerLct, 1, 60).with_cooldown(2),
        );
        assert!(limiter.check("locked", Some("x"), None, true).allowed);
        let denied = limiter.check("locked", Some("x"), None, true);
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs > 0);
    }

    #[test]
    fn scopes_partition_independent_buckets() {
        let limiter = RateLimiter::empty();
        limiter.add_rule(RateLimitRule::new("per_lct_rule", RateLimitScope::PerLct, 1, 60));
        assert!(limiter.check("per_lct_rule", Some("a"), None, true).allowed);
        assert!(limiter.check("per_lct_rule", Some("b"), None, true).allowed);
    }

    #[test]
    fn check_or_raise_surfaces_governance_error() {
        let limiter = RateLimiter::empty();
        limiter.add_rule(RateLimitRule::new("strict", RateLimitScope::Global, 1, 60));
        limiter.check_or_raise("strict", None, None).unwrap();
        let err = limiter.check_or_raise("strict", None, None).unwrap_err();
        assert!(matches!(err, GovernanceError::RateLimitExceeded { .. }));
    }
}
