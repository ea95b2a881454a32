//! Error types for the Kernel.

use pi0_kernel_channel::ChannelError;
use pi0_kernel_core::{ChainIntegrityError, CoreError};
use pi0_kernel_gate::GateError;
use pi0_kernel_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Encoding or digest error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Audit persistence error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Authorization error.
    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    /// Authentication, replay or transport error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The audit chain failed verification.
    #[error(transparent)]
    ChainIntegrity(#[from] ChainIntegrityError),

    /// The configuration is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
