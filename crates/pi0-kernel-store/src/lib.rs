//! # Pi0 Kernel Store
//!
//! Durable sinks for the audit chain. The chain itself lives in memory in
//! `pi0-kernel-core`; a sink receives each record as it is appended and
//! can hand the whole persisted chain back for verification.
//!
//! ## Key Types
//!
//! - [`AuditLog`] - A sink that can also reload what it persisted
//! - [`MemorySink`] - In-memory sink for tests
//! - [`JsonLinesSink`] - Append-only file, one JSON record per line
//! - [`SqliteSink`] - SQLite-backed sink
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pi0_kernel_core::{AuditChain, AuditEntry};
//! use pi0_kernel_store::{AuditLog, JsonLinesSink};
//!
//! let sink = Arc::new(JsonLinesSink::open("audit.log").unwrap());
//! let chain = AuditChain::with_sink(sink.clone());
//! chain.append(AuditEntry::Reset);
//!
//! // Later, possibly in another process:
//! let sink = Arc::new(JsonLinesSink::open("audit.log").unwrap());
//! let chain = pi0_kernel_store::resume_chain(sink).unwrap();
//! assert_eq!(chain.len(), 1);
//! ```
//!
//! ## Design Notes
//!
//! - **Fixed field order**: records are serialized in struct order, so the
//!   on-disk form is stable for a given build.
//! - **No rollback**: a persistence failure is returned to the chain, which
//!   reports it and keeps the in-memory record.

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;
pub use sqlite::SqliteSink;
pub use traits::{resume_chain, AuditLog};
