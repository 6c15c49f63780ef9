//! Shared vocabulary for the hardbound governance substrate.
//!
//! This crate has no governance logic of its own. It provides the types and
//! utilities every other layer agrees on: the opaque actor identifier (LCT),
//! role and metabolic-state enumerations, canonical SHA-256 hashing for the
//! audit and heartbeat chains, the shared error taxonomy, and layered
//! configuration loading.

pub mod config;
pub mod error;
pub mod hash;
pub mod lct;
pub mod metabolic;
pub mod role;
pub mod time;

pub use config::GovernanceConfig;
pub use error::{GovernanceError, Result};
pub use lct::Lct;
pub use metabolic::MetabolicState;
pub use role::Role;
