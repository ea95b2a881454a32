//! # Pi0 Kernel Core
//!
//! Pure primitives for the Pi0 kernel: principals, structured values,
//! canonical encoding, and the hash-linked audit chain.
//!
//! This crate performs no I/O. Durable persistence of audit records is
//! delegated to an [`AuditSink`] supplied by the host (see the
//! `pi0-kernel-store` crate for file and SQLite sinks).
//!
//! ## Key Types
//!
//! - [`AuditChain`] - Append-only, hash-linked log of authorization events
//! - [`AuditRecord`] - One link of the chain
//! - [`AuditEntry`] - The structured payload of a record, tagged by action
//! - [`Principal`] - Opaque identifier of an authorized actor
//! - [`Blake3Hash`] - 32-byte digest used for record hashes and MACs
//!
//! ## Canonicalization
//!
//! Record hashes are computed over deterministic CBOR. See [`canonical`].

pub mod audit;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod types;
pub mod value;

pub use audit::{
    verify_records, AuditChain, AuditEntry, AuditRecord, AuditSink, BreakKind, ChainBreak,
    SinkFailure,
};
pub use canonical::{canonical_entry_bytes, canonical_value_bytes, record_hash_input};
pub use crypto::Blake3Hash;
pub use error::{ChainIntegrityError, CoreError, SinkError};
pub use types::{now_millis, Principal};
pub use value::Value;
