//! LCT (Linked Context Token) — an opaque actor identifier.
//!
//! The core treats LCTs as strings with a stable `web4:<scheme>:<role>:<rest>`
//! form (spec §6). Hardware binding and cryptographic anchoring live outside
//! this crate; here an LCT is just a validated, newtype-wrapped string.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GovernanceError;

/// An opaque identifier for an actor: human, AI, team, or federation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lct(String);

impl Lct {
    /// Parse and validate the `web4:<scheme>:<role>:<rest>` form.
    pub fn parse(raw: impl Into<String>) -> Result<Self, GovernanceError> {
        let raw = raw.into();
        let mut parts = raw.splitn(4, ':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("web4"), Some(scheme), Some(role), Some(rest))
                if !scheme.is_empty() && !role.is_empty() && !rest.is_empty() =>
            {
                Ok(Self(raw))
            }
            _ => Err(GovernanceError::validation(
                "lct",
                format!("'{raw}' is not a valid web4:<scheme>:<role>:<rest> identifier"),
            )),
        }
    }

    /// Build an LCT from trusted, already-validated parts (tests, fixtures).
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Lct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Lct {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lct() {
        let lct = Lct::parse("web4:soft:admin:abc123").unwrap();
        assert_eq!(lct.as_str(), "web4:soft:admin:abc123");
    }

    #[test]
    fn rejects_malformed_lct() {
        assert!(Lct::parse("not-an-lct").is_err());
        assert!(Lct::parse("web4:soft:admin:").is_err());
        assert!(Lct::parse("web4::admin:x").is_err());
    }
}
