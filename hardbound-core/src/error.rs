//! Shared error taxonomy.
//!
//! Every component surfaces one of these eight kinds rather than inventing
//! its own. Component-local error types, where they exist, convert into this
//! one via `From` at the crate boundary.

use thiserror::Error;

/// The eight error kinds named by spec §7. Each carries the structured
/// context a caller needs to decide how to react, never just a message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GovernanceError {
    /// A referenced session/team/member/proposal/request/federation is missing.
    #[error("not found: {entity} '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// A duplicate create was attempted (session, team, member, ...).
    #[error("already exists: {entity} '{id}'")]
    AlreadyExists { entity: &'static str, id: String },

    /// Requester lacks the role, trust, or authority for the operation.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// The entity is not in a state the operation requires.
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    /// ATP shortfall or trust below threshold.
    #[error("insufficient {resource}: required {required}, available {available}")]
    InsufficientResource {
        resource: String,
        required: String,
        available: String,
    },

    /// Rate limiter denial.
    #[error("rate limit exceeded: {reason} (retry after {retry_after_secs}s)")]
    RateLimitExceeded { retry_after_secs: u64, reason: String },

    /// Hash mismatch on verify, chain gap, or invariant breach.
    #[error("integrity violation: {detail}")]
    IntegrityViolation { detail: String },

    /// Malformed input: unknown action type, negative ATP cost, invalid LCT, ...
    #[error("validation error on {field}: {reason}")]
    ValidationError { field: String, reason: String },
}

impl GovernanceError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists { entity, id: id.into() }
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied { reason: reason.into() }
    }

    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState { expected: expected.into(), actual: actual.into() }
    }

    pub fn insufficient(
        resource: impl Into<String>,
        required: impl Into<String>,
        available: impl Into<String>,
    ) -> Self {
        Self::InsufficientResource {
            resource: resource.into(),
            required: required.into(),
            available: available.into(),
        }
    }

    pub fn rate_limited(retry_after_secs: u64, reason: impl Into<String>) -> Self {
        Self::RateLimitExceeded { retry_after_secs, reason: reason.into() }
    }

    pub fn integrity(detail: impl Into<String>) -> Self {
        Self::IntegrityViolation { detail: detail.into() }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationError { field: field.into(), reason: reason.into() }
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GovernanceError>;
