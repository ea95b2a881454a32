//! # Pi0 Kernel Gate
//!
//! Multi-party authorization for privileged kernel actions.
//!
//! ## Overview
//!
//! Privileged actions are gated by a quorum of distinct, known principals.
//! Every vote, reset, applied change and module activation is appended to
//! the shared [`AuditChain`](pi0_kernel_core::AuditChain).
//!
//! ## Key Concepts
//!
//! - **Principal universe**: a fixed set supplied at construction. Unknown
//!   principals are rejected, never silently admitted.
//! - **Quorum**: a decision is satisfied once `required` distinct principals
//!   have approved. Re-approving does not double count.
//! - **ConfigStore**: readable by anyone, written only when a
//!   [`QuorumGate::request_change`] call completes a quorum.
//! - **ModuleRegistry**: named handlers run over a record with a read-only
//!   config snapshot. One failing handler never aborts the others. A handler
//!   is only dispatched after [`QuorumGate::request_activation`] completes a
//!   quorum for it.
//!
//! ## Decision lifecycle
//!
//! ```text
//! Open (votes < required) --approve--> Satisfied (votes >= required)
//!        ^                                   |
//!        +-------- reset / apply_change -----+
//! ```

pub mod config;
pub mod error;
pub mod principal;
pub mod quorum;
pub mod registry;

pub use config::{ConfigSnapshot, ConfigStore};
pub use error::{GateError, HandlerError, Result};
pub use principal::PrincipalSet;
pub use quorum::{ChangeOutcome, DecisionState, QuorumGate};
pub use registry::{InspectReport, ModuleHandler, ModuleRegistry};
