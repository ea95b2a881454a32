//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use pi0_kernel::{AuditSink, Kernel, KernelConfig, Principal, SecureChannel, SharedSecret};
use pi0_kernel_store::MemorySink;

/// Default principal universe for fixtures.
pub const DEFAULT_PRINCIPALS: [&str; 3] = ["alice", "bob", "carol"];

/// A kernel over an in-memory sink with a known principal universe.
pub struct TestFixture {
    pub kernel: Kernel,
    pub sink: Arc<MemorySink>,
    pub principals: Vec<Principal>,
}

impl TestFixture {
    /// Three principals, two approvals required.
    pub fn new() -> Self {
        Self::with_config(KernelConfig::new(DEFAULT_PRINCIPALS, 2))
    }

    /// Build from an explicit config.
    ///
    /// # Panics
    ///
    /// Panics if the config does not validate.
    pub fn with_config(config: KernelConfig) -> Self {
        let principals = config.principals.iter().map(|p| Principal::from(p.as_str())).collect();
        let sink = Arc::new(MemorySink::new());
        let audit_sink: Arc<dyn AuditSink> = sink.clone();
        let kernel = Kernel::new(config, Some(audit_sink)).expect("fixture config must validate");

        Self {
            kernel,
            sink,
            principals,
        }
    }

    /// The `i`th principal of the universe.
    pub fn principal(&self, i: usize) -> &Principal {
        &self.principals[i]
    }

    /// Approve with the first `count` principals.
    pub fn approve_first(&self, count: usize) -> bool {
        let mut satisfied = false;
        for principal in self.principals.iter().take(count) {
            satisfied = self.kernel.approve(principal).expect("fixture principal is known");
        }
        satisfied
    }

    /// Two channel ends over the same deterministic secret.
    pub fn channel_pair(&self, seed: u64) -> (SecureChannel, SecureChannel) {
        let secret = deterministic_secret(seed);
        (
            self.kernel.open_channel(secret.clone()),
            self.kernel.open_channel(secret),
        )
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A 32-byte secret derived from `seed`. Same seed, same secret.
pub fn deterministic_secret(seed: u64) -> SharedSecret {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = vec![0u8; 32];
    rng.fill_bytes(&mut bytes);
    SharedSecret::new(bytes).expect("32 bytes is never empty")
}

/// Distinct deterministic secrets for multi-party tests.
pub fn multi_party_secrets(count: usize) -> Vec<SharedSecret> {
    (0..count as u64).map(deterministic_secret).collect()
}
