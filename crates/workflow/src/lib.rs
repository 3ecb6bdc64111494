//! Approval workflow building blocks shared by every approvable document.
//!
//! Purchase orders and return requests follow the same shape: they are
//! created, optionally routed through a configured chain of approval levels,
//! and end up "approver completed" (or cancelled). This crate holds that shape
//! once:
//!
//! - [`Process`] / [`StatusCategory`] / [`StatusCatalog`]: symbolic statuses and
//!   their mapping to opaque catalog ids.
//! - [`WorkflowConfig`] / [`WorkflowResolver`]: the configured approval chain.
//! - [`ApprovalTrail`]: append-only log of approval steps.
//! - [`Approval`] / [`Stage`] / [`Transition`]: the lifecycle state machine.

pub mod config;
pub mod lifecycle;
pub mod process;
pub mod status;
pub mod trail;

pub use config::{WorkflowConfig, WorkflowResolver};
pub use lifecycle::{Approval, Stage, Stamp, Transition};
pub use process::Process;
pub use status::{ProcessStatuses, StatusCatalog, StatusCategory};
pub use trail::{ApprovalStep, ApprovalTrail, StepDraft, TrailState};
