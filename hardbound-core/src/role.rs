//! Member roles (spec §3.1).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GovernanceError;

/// A member's role within a team. A closed sum type: unknown strings coming
/// from storage are a parse failure, never a silent default (spec §9
/// "Tagged variants").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Reviewer,
    Deployer,
    Developer,
    Member,
    Observer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Reviewer => "reviewer",
            Role::Deployer => "deployer",
            Role::Developer => "developer",
            Role::Member => "member",
            Role::Observer => "observer",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, GovernanceError> {
        match raw {
            "admin" => Ok(Role::Admin),
            "reviewer" => Ok(Role::Reviewer),
            "deployer" => Ok(Role::Deployer),
            "developer" => Ok(Role::Developer),
            "member" => Ok(Role::Member),
            "observer" => Ok(Role::Observer),
            other => Err(GovernanceError::validation(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for role in [
            Role::Admin,
            Role::Reviewer,
            Role::Deployer,
            Role::Developer,
            Role::Member,
            Role::Observer,
        ] {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(Role::parse("superuser").is_err());
    }
}
