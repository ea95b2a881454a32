//! The Kernel: the explicit context object tying the components together.
//!
//! A host builds one `Kernel` at start-up and passes it to collaborators.
//! Every component shares the kernel's single audit chain.

use std::collections::BTreeMap;
use std::sync::Arc;

use pi0_kernel_channel::{SecureChannel, SharedSecret};
use pi0_kernel_core::{AuditChain, AuditEntry, AuditRecord, AuditSink, Principal, SinkFailure, Value};
use pi0_kernel_gate::{
    ChangeOutcome, ConfigSnapshot, ConfigStore, DecisionState, InspectReport, ModuleHandler,
    ModuleRegistry, QuorumGate,
};
use pi0_kernel_store::{resume_chain, AuditLog};

use crate::config::KernelConfig;
use crate::error::Result;
use crate::summary;

/// The main Kernel struct.
///
/// Provides a unified API for:
/// - Quorum-gated approvals, config changes and module activation
/// - Module registration and inspection
/// - Audit chain verification and export
/// - Opening secure channels
pub struct Kernel {
    config: KernelConfig,
    chain: Arc<AuditChain>,
    store: Arc<ConfigStore>,
    gate: QuorumGate,
    registry: Arc<ModuleRegistry>,
}

impl Kernel {
    /// Create a kernel from a validated config with an empty audit chain.
    ///
    /// Records are persisted to `sink` as they are appended, if one is given.
    /// To continue a chain a sink already holds, use [`resume`](Self::resume).
    pub fn new(config: KernelConfig, sink: Option<Arc<dyn AuditSink>>) -> Result<Self> {
        config.validate()?;

        let chain = match sink {
            Some(sink) => AuditChain::with_sink(sink),
            None => AuditChain::new(),
        };
        Self::with_chain(config, chain)
    }

    /// Restart a kernel over the chain persisted in `log`.
    ///
    /// The persisted records are verified, new records continue their
    /// sequence, and the pending approvals, applied config changes and
    /// module activations they describe are restored. Handlers are code and
    /// must be registered again; an activated name is dispatched as soon as
    /// a handler is registered under it.
    pub fn resume<L>(config: KernelConfig, log: Arc<L>) -> Result<Self>
    where
        L: AuditLog + 'static,
    {
        config.validate()?;
        let chain = resume_chain(log)?;
        Self::with_chain(config, chain)
    }

    fn with_chain(config: KernelConfig, chain: AuditChain) -> Result<Self> {
        let chain = Arc::new(chain);
        let store = Arc::new(ConfigStore::new());
        let registry = Arc::new(ModuleRegistry::new(Arc::clone(&chain), Arc::clone(&store)));

        let gate = QuorumGate::new(
            config.principal_set(),
            config.required_approvals,
            Arc::clone(&chain),
            Arc::clone(&store),
        )?
        .with_rejection_audit(config.audit_rejections)
        .with_registry(Arc::clone(&registry));

        tracing::info!(
            principals = gate.principals().len(),
            required = config.required_approvals,
            cipher = config.channel.cipher.name(),
            audit_len = chain.len(),
            "kernel started"
        );

        Ok(Self {
            config,
            chain,
            store,
            gate,
            registry,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The shared audit chain.
    pub fn chain(&self) -> &Arc<AuditChain> {
        &self.chain
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Quorum Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an approval. Returns whether quorum is now satisfied.
    pub fn approve(&self, principal: &Principal) -> Result<bool> {
        Ok(self.gate.approve(principal)?)
    }

    /// Abandon or close the pending decision.
    pub fn reset(&self) {
        self.gate.reset()
    }

    /// Approve and apply `key = value` if this vote completes the quorum.
    pub fn request_change(
        &self,
        principal: &Principal,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<ChangeOutcome> {
        Ok(self.gate.request_change(principal, key, value)?)
    }

    /// Approve activation of a registered module; activate it if this vote
    /// completes the quorum.
    pub fn request_activation(&self, principal: &Principal, module: &str) -> Result<ChangeOutcome> {
        Ok(self.gate.request_activation(principal, module)?)
    }

    pub fn decision_state(&self) -> DecisionState {
        self.gate.state()
    }

    pub fn approvals(&self) -> Vec<Principal> {
        self.gate.approvals()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Config & Modules
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    pub fn config_snapshot(&self) -> ConfigSnapshot {
        self.store.snapshot()
    }

    /// Register a module handler, replacing any previous one of that name.
    ///
    /// The module is not dispatched until a quorum activates it.
    pub fn register_module<H>(&self, name: impl Into<String>, handler: H)
    where
        H: ModuleHandler + 'static,
    {
        self.registry.register(name, handler)
    }

    /// Run every active module over `record`.
    pub fn inspect(&self, record: &Value) -> InspectReport {
        self.registry.inspect(record)
    }

    /// Registered module names in sorted order.
    pub fn modules(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn active_modules(&self) -> Vec<String> {
        self.registry.active_names()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify every link and hash of the audit chain.
    pub fn verify_chain(&self) -> Result<()> {
        Ok(self.chain.verify_chain()?)
    }

    /// All audit records in order.
    pub fn export(&self) -> Vec<AuditRecord> {
        self.chain.export()
    }

    /// Records that could not be persisted to the sink.
    pub fn sink_failures(&self) -> Vec<SinkFailure> {
        self.chain.sink_failures()
    }

    /// Append an event raised by a collaborator outside the kernel.
    pub fn record_external(&self, name: impl Into<String>, fields: BTreeMap<String, Value>) -> AuditRecord {
        self.chain.append(AuditEntry::External {
            name: name.into(),
            fields,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a secure channel over `secret` using the configured cipher suite.
    ///
    /// The channel writes to the kernel audit chain when `channel.audit` is set.
    pub fn open_channel(&self, secret: SharedSecret) -> SecureChannel {
        let channel = SecureChannel::with_suite(secret, self.config.channel.cipher);
        if self.config.channel.audit {
            channel.with_audit(Arc::clone(&self.chain))
        } else {
            channel
        }
    }

    /// Like [`open_channel`](Self::open_channel) from raw secret bytes.
    pub fn open_channel_with_bytes(&self, secret: impl Into<Vec<u8>>) -> Result<SecureChannel> {
        let secret = SharedSecret::new(secret)?;
        Ok(self.open_channel(secret))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Summaries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn summary_audit(&self) -> String {
        summary::render_audit(&self.chain.export())
    }

    pub fn summary_config(&self) -> String {
        summary::render_config(&self.store.snapshot())
    }

    pub fn summary_modules(&self) -> String {
        let modules: Vec<(String, bool)> = self
            .registry
            .names()
            .into_iter()
            .map(|name| {
                let active = self.registry.is_active(&name);
                (name, active)
            })
            .collect();
        summary::render_modules(&modules)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("audit_len", &self.chain.len())
            .field("modules", &self.registry.len())
            .finish()
    }
}
