//! Shared secrets and the keys derived from them.

use std::fmt;

use crate::error::{ChannelError, Result};

const MAC_CONTEXT: &str = "pi0-kernel 2026-01 channel mac";
const KEYSTREAM_CONTEXT: &str = "pi0-kernel 2026-01 channel keystream";

/// Secret provisioned out-of-band to both ends of a channel.
///
/// The bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// Wrap secret bytes. Fails if `bytes` is empty.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ChannelError::EmptySecret);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn derive_keys(&self) -> ChannelKeys {
        ChannelKeys {
            mac: blake3::derive_key(MAC_CONTEXT, &self.0),
            keystream: blake3::derive_key(KEYSTREAM_CONTEXT, &self.0),
            secret: self.clone(),
        }
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(<{} bytes redacted>)", self.0.len())
    }
}

/// Per-channel key material, domain separated by purpose.
#[derive(Clone)]
pub(crate) struct ChannelKeys {
    pub(crate) mac: [u8; 32],
    pub(crate) keystream: [u8; 32],
    pub(crate) secret: SharedSecret,
}

impl fmt::Debug for ChannelKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelKeys(<redacted>)")
    }
}
