//! # Pi0 Kernel
//!
//! Quorum-gated configuration with a tamper-evident audit trail and
//! authenticated peer channels.
//!
//! ## Overview
//!
//! The kernel is an explicit context object built once by the host:
//!
//! - **Audit chain**: every action is appended to a Blake3 hash chain that
//!   can be verified end to end and persisted to a durable sink
//! - **Quorum gate**: approvals from a fixed principal universe; config
//!   changes take effect only when a request completes the quorum
//! - **Modules**: named handlers run over a record with a config snapshot,
//!   each failure contained to its own handler. Anyone may register a
//!   handler; it runs only after a quorum activates it
//! - **Restart**: [`Kernel::resume`] reloads a persisted chain, verifies it
//!   and restores the state it records
//! - **Secure channels**: sequence-bound, MAC-verified packets over a
//!   pluggable cipher suite
//!
//! ## Usage
//!
//! ```rust
//! use pi0_kernel::{Kernel, KernelConfig, Principal, Value};
//!
//! let kernel = Kernel::new(KernelConfig::new(["alice", "bob", "carol"], 2), None).unwrap();
//!
//! let alice = Principal::from("alice");
//! let bob = Principal::from("bob");
//!
//! assert!(!kernel.request_change(&alice, "rate", 5).unwrap().applied);
//! assert!(kernel.request_change(&bob, "rate", 5).unwrap().applied);
//! assert_eq!(kernel.config_value("rate"), Some(Value::Int(5)));
//!
//! kernel.verify_chain().unwrap();
//! println!("{}", kernel.summary_audit());
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `pi0_kernel::core` - Audit chain, canonical encoding, values
//! - `pi0_kernel::store` - Durable audit sinks
//! - `pi0_kernel::gate` - Quorum gate, config store, module registry
//! - `pi0_kernel::channel` - Secure channel and transports

pub mod config;
pub mod error;
pub mod kernel;
pub mod summary;

// Re-export component crates
pub use pi0_kernel_channel as channel;
pub use pi0_kernel_core as core;
pub use pi0_kernel_gate as gate;
pub use pi0_kernel_store as store;

// Re-export main types for convenience
pub use config::{ChannelConfig, KernelConfig};
pub use error::{KernelError, Result};
pub use kernel::Kernel;

// Re-export commonly used component types
pub use pi0_kernel_channel::{CipherSuite, Packet, SecureChannel, SharedSecret};
pub use pi0_kernel_core::{
    verify_records, AuditEntry, AuditRecord, AuditSink, Blake3Hash, ChainIntegrityError, Principal,
    Value,
};
pub use pi0_kernel_gate::{
    ChangeOutcome, ConfigSnapshot, DecisionState, HandlerError, InspectReport, ModuleHandler,
};
