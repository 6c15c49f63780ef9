//! R6 request/approval/execution workflow for governed actions (spec §4.7):
//! Rules, Role, Request, Reference, Resource, Result.

pub mod engine;
pub mod types;

pub use engine::R6Workflow;
pub use types::{R6Request, R6Response, R6Status, DEFAULT_EXPIRY_HOURS};
