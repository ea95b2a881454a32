//! Error types for the Pi0 kernel core.

use std::fmt;

use thiserror::Error;

use crate::audit::ChainBreak;

/// Core errors that can occur while encoding or decoding kernel data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

/// Verification found one or more broken links in an audit chain.
///
/// This is terminal for the verification call: the chain is not partially
/// trusted, and every detected break is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIntegrityError {
    pub breaks: Vec<ChainBreak>,
}

impl ChainIntegrityError {
    /// Index of the first offending record.
    pub fn first_index(&self) -> usize {
        self.breaks.iter().map(|b| b.index).min().unwrap_or(0)
    }
}

impl fmt::Display for ChainIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "audit chain integrity violated at record {} ({} break(s))",
            self.first_index(),
            self.breaks.len()
        )
    }
}

impl std::error::Error for ChainIntegrityError {}

/// A durable sink failed to persist a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audit sink failure: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
