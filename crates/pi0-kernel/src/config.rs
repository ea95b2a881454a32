//! Kernel configuration.

use serde::{Deserialize, Serialize};

use pi0_kernel_channel::CipherSuite;
use pi0_kernel_gate::PrincipalSet;

use crate::error::{KernelError, Result};

/// Configuration for the Kernel.
///
/// Shared secrets are deliberately absent; they are handed to
/// [`Kernel::open_channel`](crate::Kernel::open_channel) directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// The fixed universe of principals allowed to approve.
    pub principals: Vec<String>,
    /// Distinct approvals needed to satisfy a decision.
    pub required_approvals: usize,
    /// Append a `reject` entry when an unknown principal is turned away.
    pub audit_rejections: bool,
    /// Secure channel settings.
    pub channel: ChannelConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            principals: Vec::new(),
            required_approvals: 2,
            audit_rejections: false,
            channel: ChannelConfig::default(),
        }
    }
}

/// Secure channel settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub cipher: CipherSuite,
    /// Record channel sends and receives in the kernel audit chain.
    pub audit: bool,
}

impl KernelConfig {
    /// Config over `principals` requiring `required` approvals.
    pub fn new<I, S>(principals: I, required: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principals: principals.into_iter().map(Into::into).collect(),
            required_approvals: required,
            ..Self::default()
        }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KernelError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| KernelError::InvalidConfig(e.to_string()))
    }

    /// Check that the quorum can be met by the principal universe.
    ///
    /// Duplicate principal names count once.
    pub fn validate(&self) -> Result<()> {
        let universe = self.principal_set().len();
        if self.required_approvals == 0 {
            return Err(KernelError::InvalidConfig(
                "required_approvals must be at least 1".into(),
            ));
        }
        if self.required_approvals > universe {
            return Err(KernelError::InvalidConfig(format!(
                "required_approvals ({}) exceeds the number of principals ({})",
                self.required_approvals, universe
            )));
        }
        Ok(())
    }

    pub fn principal_set(&self) -> PrincipalSet {
        PrincipalSet::new(self.principals.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.required_approvals, 2);
        assert!(!config.audit_rejections);
        assert_eq!(config.channel.cipher, CipherSuite::Keystream);
    }

    #[test]
    fn test_from_json_partial() {
        let config = KernelConfig::from_json(
            r#"{"principals": ["a", "b", "c"], "channel": {"cipher": "chacha20poly1305"}}"#,
        )
        .unwrap();

        assert_eq!(config.principals.len(), 3);
        assert_eq!(config.required_approvals, 2);
        assert_eq!(config.channel.cipher, CipherSuite::ChaCha20Poly1305);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(KernelConfig::from_json(r#"{"secret": "x"}"#).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(KernelConfig::new(["a", "b"], 0).validate().is_err());
        assert!(KernelConfig::new(["a", "b"], 3).validate().is_err());
        assert!(KernelConfig::new(["a", "a"], 2).validate().is_err());
        assert!(KernelConfig::new(["a", "b"], 2).validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = KernelConfig::new(["a", "b", "c"], 3);
        let back = KernelConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
