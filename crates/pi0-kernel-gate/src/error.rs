//! Error types for the gate module.

use pi0_kernel_core::Principal;
use thiserror::Error;

/// Errors that can occur during gated operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The actor is not in the principal universe.
    #[error("unknown principal: {0}")]
    UnknownPrincipal(Principal),

    /// The quorum threshold cannot be met by the principal universe.
    #[error("invalid quorum: {required} approvals required from {universe} principal(s)")]
    InvalidQuorum { required: usize, universe: usize },

    /// Activation was requested for a module that is not registered.
    #[error("unknown module: {0}")]
    UnknownModule(String),
}

/// A single module handler failed.
///
/// Contained per handler: it is reported in the inspect results and never
/// propagated to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler failure: {message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
