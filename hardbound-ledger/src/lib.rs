//! Hash-chained audit ledger (spec §4.1): one chain per session, the
//! substrate every other layer writes its history onto.

pub mod engine;
pub mod types;

pub use engine::Ledger;
pub use types::{AuditRecord, AuditStatus, ChainVerification, Session};
