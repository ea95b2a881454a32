//! Error types for the channel module.

use pi0_kernel_core::Principal;
use thiserror::Error;

/// Errors that can occur while sealing, opening or delivering packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The recomputed MAC does not match the packet's MAC.
    #[error("authentication failed: packet MAC does not verify")]
    Authentication,

    /// The packet's sequence is not above the high-water mark for its target.
    #[error("replayed packet: sequence {got} is not above last accepted {last_accepted}")]
    Replay { last_accepted: u64, got: u64 },

    /// Shared secrets must carry at least one byte.
    #[error("shared secret is empty")]
    EmptySecret,

    /// The send counter cannot be advanced any further.
    #[error("sequence counter exhausted")]
    SequenceExhausted,

    /// The cipher suite rejected the operation.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// A packet reached an endpoint it was not addressed to.
    #[error("packet addressed to {addressed}, delivered to {local}")]
    Misdirected { addressed: Principal, local: Principal },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
