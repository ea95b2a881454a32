//! # Pi0 Kernel Channel
//!
//! Authenticated, sequence-bound packet exchange between principals that
//! share a secret.
//!
//! ## Overview
//!
//! A [`SecureChannel`] seals outbound messages into [`Packet`]s and opens
//! inbound ones. Every packet carries the sender's sequence number, and the
//! MAC binds the ciphertext to both that sequence and the addressed
//! principal, so replayed, reordered or retargeted packets are detected.
//!
//! ## Key Properties
//!
//! - **Verify before decrypt**: the MAC is checked in constant time before
//!   the replay window, and both before any deciphering.
//! - **Monotonic**: the send counter increases by exactly one per packet,
//!   including under concurrent senders.
//! - **Replay window**: a receiver accepts a sequence only if it is above
//!   the last accepted one for that target.
//! - **Pluggable cipher**: see [`CipherSuite`]; the packet format and the
//!   checks around it do not change between suites.
//!
//! ## Usage
//!
//! ```rust
//! use pi0_kernel_channel::{SecureChannel, SharedSecret};
//! use pi0_kernel_core::Principal;
//!
//! let secret = SharedSecret::new(b"provisioned out of band".to_vec()).unwrap();
//! let alice = SecureChannel::new(secret.clone());
//! let bob = SecureChannel::new(secret);
//!
//! let packet = alice.send(&Principal::from("bob"), b"hello").unwrap();
//! assert_eq!(bob.receive(&packet).unwrap(), b"hello");
//! assert!(bob.receive(&packet).is_err());
//! ```
//!
//! ## Packet Flow
//!
//! ```text
//! Sender                                  Receiver
//!   counter += 1                              |
//!   ct  = cipher(secret, seq, target, pt)     |
//!   mac = H_key(len ++ ct ++ seq ++ target)   |
//!   |-------- Packet{target,ct,mac,seq} ----->|
//!   |                                  verify mac (constant time)
//!   |                                  seq > high_water[target]
//!   |                                  pt = decipher(...)
//! ```

pub mod channel;
pub mod cipher;
pub mod endpoint;
pub mod error;
pub mod packet;
pub mod secret;
pub mod transport;

pub use channel::SecureChannel;
pub use cipher::CipherSuite;
pub use endpoint::{ChannelEndpoint, Delivery};
pub use error::{ChannelError, Result};
pub use packet::{Direction, LogEntry, Packet};
pub use secret::SharedSecret;
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Transport};
