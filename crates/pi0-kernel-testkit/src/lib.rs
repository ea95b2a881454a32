//! # Pi0 Kernel Testkit
//!
//! Testing utilities for the Pi0 kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed inputs with pinned audit hashes and packet MACs
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A ready kernel over an in-memory sink, plus deterministic secrets
//!
//! ## Golden Vectors
//!
//! ```rust
//! use pi0_kernel_testkit::vectors::{audit_vectors, record_from_vector};
//!
//! for vector in audit_vectors() {
//!     let record = record_from_vector(&vector);
//!     println!("{}: {}", vector.name, record.hash.to_hex());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use pi0_kernel_testkit::generators::{chain_from_params, ChainParams};
//!
//! proptest! {
//!     #[test]
//!     fn chain_verifies(params: ChainParams) {
//!         prop_assert!(chain_from_params(&params).verify_chain().is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use pi0_kernel_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! assert!(fixture.approve_first(2));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{deterministic_secret, multi_party_secrets, TestFixture};
pub use generators::{chain_from_params, ChainParams};
pub use vectors::{audit_vectors, channel_vectors, verify_all_vectors, AuditVector, ChannelVector};
