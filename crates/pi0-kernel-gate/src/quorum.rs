//! The quorum gate: multi-party approval of privileged actions.
//!
//! The gate tracks one pending decision at a time. All state changes and
//! their audit entries happen under a single lock, so the entries of one
//! decision are never interleaved with another's.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use pi0_kernel_core::{AuditChain, AuditEntry, Principal, Value};

use crate::config::ConfigStore;
use crate::error::{GateError, Result};
use crate::principal::PrincipalSet;
use crate::registry::ModuleRegistry;

/// State of the pending decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DecisionState {
    /// Fewer than `required` distinct approvals.
    Open { votes: usize, required: usize },
    /// At least `required` distinct approvals; waiting for apply or reset.
    Satisfied { votes: usize, required: usize },
}

impl DecisionState {
    pub fn votes(&self) -> usize {
        match self {
            DecisionState::Open { votes, .. } | DecisionState::Satisfied { votes, .. } => *votes,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, DecisionState::Satisfied { .. })
    }
}

/// Outcome of [`QuorumGate::request_change`] and
/// [`QuorumGate::request_activation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    /// Quorum is satisfied after this vote (before any reset).
    pub satisfied: bool,
    /// This call completed the quorum and the action took effect.
    pub applied: bool,
}

/// Multi-party approval gate.
pub struct QuorumGate {
    principals: PrincipalSet,
    required: usize,
    approvals: Mutex<BTreeSet<Principal>>,
    chain: Arc<AuditChain>,
    config: Arc<ConfigStore>,
    registry: Option<Arc<ModuleRegistry>>,
    audit_rejections: bool,
}

impl QuorumGate {
    /// Create a gate over a fixed principal universe.
    ///
    /// Fails if `required` is zero or larger than the universe. If `chain`
    /// already holds records, the pending approvals and applied config
    /// changes they describe are restored.
    pub fn new(
        principals: PrincipalSet,
        required: usize,
        chain: Arc<AuditChain>,
        config: Arc<ConfigStore>,
    ) -> Result<Self> {
        if required == 0 || required > principals.len() {
            return Err(GateError::InvalidQuorum {
                required,
                universe: principals.len(),
            });
        }

        let mut approvals = BTreeSet::new();
        for record in chain.export() {
            match record.entry {
                AuditEntry::Approve { principal, .. } if principals.contains(&principal) => {
                    approvals.insert(principal);
                }
                AuditEntry::Reset => approvals.clear(),
                AuditEntry::ApplyChange { key, value } => {
                    config.apply(key, value);
                }
                _ => {}
            }
        }

        Ok(Self {
            principals,
            required,
            approvals: Mutex::new(approvals),
            chain,
            config,
            registry: None,
            audit_rejections: false,
        })
    }

    /// Gate activation of the modules in `registry`.
    ///
    /// Activations already recorded in the chain are restored.
    pub fn with_registry(mut self, registry: Arc<ModuleRegistry>) -> Self {
        for record in self.chain.export() {
            if let AuditEntry::ActivateModule { module } = record.entry {
                registry.restore_active(module);
            }
        }
        self.registry = Some(registry);
        self
    }

    /// Also append a `reject` entry when an unknown principal is turned away.
    pub fn with_rejection_audit(mut self, enabled: bool) -> Self {
        self.audit_rejections = enabled;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<Principal>> {
        self.approvals.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_known(&self, principal: &Principal) -> Result<()> {
        if self.principals.contains(principal) {
            return Ok(());
        }

        tracing::warn!(%principal, "rejected approval from unknown principal");
        if self.audit_rejections {
            self.chain.append(AuditEntry::Reject {
                principal: principal.clone(),
            });
        }
        Err(GateError::UnknownPrincipal(principal.clone()))
    }

    /// Record an approval. Returns whether quorum is now satisfied.
    ///
    /// Approving twice does not double count.
    pub fn approve(&self, principal: &Principal) -> Result<bool> {
        self.check_known(principal)?;

        let mut approvals = self.lock();
        approvals.insert(principal.clone());
        let granted = approvals.len() >= self.required;

        self.chain.append(AuditEntry::Approve {
            principal: principal.clone(),
            granted,
        });
        tracing::debug!(%principal, votes = approvals.len(), required = self.required, granted, "approval recorded");

        Ok(granted)
    }

    /// Clear the approval set, abandoning or closing the pending decision.
    pub fn reset(&self) {
        let mut approvals = self.lock();
        approvals.clear();
        self.chain.append(AuditEntry::Reset);
        tracing::debug!("approvals reset");
    }

    /// Approve and, if this vote completes the quorum, apply a config change.
    ///
    /// When the quorum becomes satisfied as a direct result of this call, the
    /// key is written, the approval set is cleared, and `reset` and
    /// `apply_change` entries follow the vote. If the quorum was already
    /// satisfied before the call, or is still unsatisfied after it, nothing
    /// is written.
    pub fn request_change(
        &self,
        principal: &Principal,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<ChangeOutcome> {
        self.check_known(principal)?;

        let key = key.into();
        let value = value.into();
        let request = AuditEntry::RequestChange {
            principal: principal.clone(),
            key: key.clone(),
            value: value.clone(),
        };

        Ok(self.vote(principal, request, || {
            self.config.apply(key.clone(), value.clone());
            tracing::info!(%principal, %key, "quorum reached, config change applied");
            AuditEntry::ApplyChange { key, value }
        }))
    }

    /// Approve and, if this vote completes the quorum, activate a module.
    ///
    /// Follows the same rules as [`request_change`](Self::request_change);
    /// the completing vote is followed by `reset` and `activate_module`.
    /// Fails without voting if `module` is not registered.
    pub fn request_activation(&self, principal: &Principal, module: &str) -> Result<ChangeOutcome> {
        self.check_known(principal)?;

        let registry = match &self.registry {
            Some(registry) if registry.contains(module) => registry,
            _ => {
                tracing::warn!(%principal, module, "activation requested for unknown module");
                return Err(GateError::UnknownModule(module.to_string()));
            }
        };

        let request = AuditEntry::RequestActivation {
            principal: principal.clone(),
            module: module.to_string(),
        };

        Ok(self.vote(principal, request, || {
            registry.activate(module);
            tracing::info!(%principal, module, "quorum reached, module activated");
            AuditEntry::ActivateModule {
                module: module.to_string(),
            }
        }))
    }

    /// Record a vote with its request entry, running `effect` if the vote
    /// completes the quorum. All entries are appended as one batch.
    fn vote<F>(&self, principal: &Principal, request: AuditEntry, effect: F) -> ChangeOutcome
    where
        F: FnOnce() -> AuditEntry,
    {
        let mut approvals = self.lock();
        let was_satisfied = approvals.len() >= self.required;
        approvals.insert(principal.clone());
        let satisfied = approvals.len() >= self.required;
        let applied = satisfied && !was_satisfied;

        let mut entries = vec![
            AuditEntry::Approve {
                principal: principal.clone(),
                granted: satisfied,
            },
            request,
        ];

        if applied {
            let done = effect();
            approvals.clear();
            entries.push(AuditEntry::Reset);
            entries.push(done);
        }

        self.chain.append_batch(entries);

        ChangeOutcome { satisfied, applied }
    }

    /// State of the pending decision.
    pub fn state(&self) -> DecisionState {
        let votes = self.lock().len();
        if votes >= self.required {
            DecisionState::Satisfied {
                votes,
                required: self.required,
            }
        } else {
            DecisionState::Open {
                votes,
                required: self.required,
            }
        }
    }

    /// Principals that have approved the pending decision.
    pub fn approvals(&self) -> Vec<Principal> {
        self.lock().iter().cloned().collect()
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn principals(&self) -> &PrincipalSet {
        &self.principals
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<ModuleRegistry>> {
        self.registry.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSnapshot;
    use crate::error::HandlerError;
    use proptest::prelude::*;

    fn gate(required: usize) -> (QuorumGate, Arc<AuditChain>, Arc<ConfigStore>) {
        let chain = Arc::new(AuditChain::new());
        let config = Arc::new(ConfigStore::new());
        let gate = QuorumGate::new(
            PrincipalSet::new(["A", "B", "C"]),
            required,
            Arc::clone(&chain),
            Arc::clone(&config),
        )
        .unwrap();
        (gate, chain, config)
    }

    fn p(id: &str) -> Principal {
        Principal::from(id)
    }

    fn actions(chain: &AuditChain) -> Vec<&'static str> {
        chain.export().iter().map(|r| r.entry.action()).collect()
    }

    #[test]
    fn test_invalid_quorum_rejected() {
        let chain = Arc::new(AuditChain::new());
        let config = Arc::new(ConfigStore::new());
        let set = PrincipalSet::new(["A", "B"]);

        assert!(matches!(
            QuorumGate::new(set.clone(), 0, chain.clone(), config.clone()),
            Err(GateError::InvalidQuorum { required: 0, universe: 2 })
        ));
        assert!(QuorumGate::new(set, 3, chain, config).is_err());
    }

    #[test]
    fn test_quorum_reached_at_threshold() {
        let (gate, chain, _) = gate(2);

        assert!(!gate.approve(&p("A")).unwrap());
        assert!(gate.approve(&p("B")).unwrap());
        assert!(gate.state().is_satisfied());

        let records = chain.export();
        assert_eq!(
            records[1].entry,
            AuditEntry::Approve {
                principal: p("B"),
                granted: true
            }
        );
    }

    #[test]
    fn test_approve_is_idempotent() {
        let (gate, _, _) = gate(2);

        assert!(!gate.approve(&p("A")).unwrap());
        assert!(!gate.approve(&p("A")).unwrap());
        assert_eq!(gate.state().votes(), 1);
    }

    #[test]
    fn test_unknown_principal_mutates_nothing() {
        let (gate, chain, _) = gate(2);
        gate.approve(&p("A")).unwrap();

        let err = gate.approve(&p("mallory")).unwrap_err();
        assert_eq!(err, GateError::UnknownPrincipal(p("mallory")));
        assert_eq!(gate.state().votes(), 1);
        assert_eq!(chain.len(), 1);

        assert!(gate.request_change(&p("mallory"), "rate", 9).is_err());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_rejection_audit_when_enabled() {
        let (gate, chain, _) = gate(2);
        let gate = gate.with_rejection_audit(true);

        assert!(gate.approve(&p("mallory")).is_err());
        assert_eq!(actions(&chain), vec!["reject"]);
        assert_eq!(gate.state().votes(), 0);
    }

    #[test]
    fn test_reset_clears_votes() {
        let (gate, chain, _) = gate(2);
        gate.approve(&p("A")).unwrap();
        gate.approve(&p("B")).unwrap();
        gate.reset();

        assert!(gate.approvals().is_empty());
        assert!(!gate.approve(&p("C")).unwrap());
        assert_eq!(actions(&chain), vec!["approve", "approve", "reset", "approve"]);
    }

    #[test]
    fn test_change_scenario() {
        let (gate, chain, config) = gate(2);

        assert!(!gate.approve(&p("A")).unwrap());
        assert!(gate.approve(&p("B")).unwrap());
        gate.reset();

        let outcome = gate.request_change(&p("C"), "rate", 5).unwrap();
        assert_eq!(outcome, ChangeOutcome { satisfied: false, applied: false });
        assert_eq!(config.get("rate"), None);

        let outcome = gate.request_change(&p("A"), "rate", 5).unwrap();
        assert!(outcome.applied);
        assert_eq!(config.get("rate"), Some(Value::Int(5)));
        assert!(gate.approvals().is_empty());

        let outcome = gate.request_change(&p("B"), "rate", 5).unwrap();
        assert!(!outcome.applied);
        assert_eq!(config.get("rate"), Some(Value::Int(5)));

        let tail: Vec<_> = actions(&chain)[5..9].to_vec();
        assert_eq!(tail, vec!["approve", "request_change", "reset", "apply_change"]);
        assert!(chain.is_intact());
    }

    #[test]
    fn test_already_satisfied_does_not_apply() {
        let (gate, _, config) = gate(2);
        gate.approve(&p("A")).unwrap();
        gate.approve(&p("B")).unwrap();

        let outcome = gate.request_change(&p("C"), "rate", 7).unwrap();
        assert_eq!(outcome, ChangeOutcome { satisfied: true, applied: false });
        assert_eq!(config.get("rate"), None);
    }

    #[test]
    fn test_concurrent_requests_apply_once_and_stay_contiguous() {
        let chain = Arc::new(AuditChain::new());
        let config = Arc::new(ConfigStore::new());
        let names: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        let gate = Arc::new(
            QuorumGate::new(
                PrincipalSet::new(names.clone()),
                8,
                Arc::clone(&chain),
                Arc::clone(&config),
            )
            .unwrap(),
        );

        let handles: Vec<_> = names
            .into_iter()
            .map(|name| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.request_change(&Principal::from(name), "mode", "safe").unwrap())
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.applied)
            .count();

        assert_eq!(applied, 1);
        assert_eq!(config.get("mode"), Some(Value::from("safe")));

        let acts = actions(&chain);
        let apply_at = acts.iter().position(|a| *a == "apply_change").unwrap();
        assert_eq!(&acts[apply_at - 3..=apply_at], &["approve", "request_change", "reset", "apply_change"]);
        assert!(chain.is_intact());
    }

    #[test]
    fn test_activation_scenario() {
        let (gate, chain, config) = gate(2);
        let registry = Arc::new(ModuleRegistry::new(Arc::clone(&chain), config));
        registry.register("limit", |_: &Value, _: &ConfigSnapshot| {
            Ok::<_, HandlerError>(Value::Bool(true))
        });
        let gate = gate.with_registry(Arc::clone(&registry));

        assert!(registry.inspect(&Value::Null).results.is_empty());

        let outcome = gate.request_activation(&p("A"), "limit").unwrap();
        assert!(!outcome.applied);
        assert!(!registry.is_active("limit"));

        let outcome = gate.request_activation(&p("C"), "limit").unwrap();
        assert_eq!(outcome, ChangeOutcome { satisfied: true, applied: true });
        assert!(registry.is_active("limit"));
        assert!(gate.approvals().is_empty());

        let report = registry.inspect(&Value::Null);
        assert_eq!(report.get("limit"), Some(&Value::Bool(true)));

        assert_eq!(
            actions(&chain),
            vec![
                "register_module",
                "inspect",
                "approve",
                "request_activation",
                "approve",
                "request_activation",
                "reset",
                "activate_module",
                "inspect",
            ]
        );
        assert_eq!(
            chain.get(7).map(|r| r.entry),
            Some(AuditEntry::ActivateModule { module: "limit".into() })
        );
        assert!(chain.is_intact());
    }

    #[test]
    fn test_activation_of_unknown_module_mutates_nothing() {
        let (gate, chain, config) = gate(1);
        let registry = Arc::new(ModuleRegistry::new(Arc::clone(&chain), config));
        let gate = gate.with_registry(registry);

        let err = gate.request_activation(&p("A"), "ghost").unwrap_err();
        assert_eq!(err, GateError::UnknownModule("ghost".into()));
        assert_eq!(gate.state().votes(), 0);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_activation_without_registry_fails() {
        let (gate, _, _) = gate(1);
        assert!(matches!(
            gate.request_activation(&p("A"), "limit"),
            Err(GateError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_new_gate_restores_state_from_chain() {
        let (gate, chain, config) = gate(2);
        let registry = Arc::new(ModuleRegistry::new(Arc::clone(&chain), Arc::clone(&config)));
        registry.register("m", |_: &Value, _: &ConfigSnapshot| Ok::<_, HandlerError>(Value::Null));
        let gate = gate.with_registry(registry);

        gate.request_change(&p("A"), "rate", 5).unwrap();
        gate.request_change(&p("B"), "rate", 5).unwrap();
        gate.request_activation(&p("A"), "m").unwrap();
        gate.request_activation(&p("B"), "m").unwrap();
        gate.approve(&p("C")).unwrap();

        // Same chain, fresh components.
        let config = Arc::new(ConfigStore::new());
        let registry = Arc::new(ModuleRegistry::new(Arc::clone(&chain), Arc::clone(&config)));
        let restored = QuorumGate::new(
            PrincipalSet::new(["A", "B", "C"]),
            2,
            Arc::clone(&chain),
            Arc::clone(&config),
        )
        .unwrap()
        .with_registry(Arc::clone(&registry));

        assert_eq!(config.get("rate"), Some(Value::Int(5)));
        assert_eq!(restored.approvals(), vec![p("C")]);
        assert!(registry.is_active("m"));
        assert!(!registry.contains("m"));
        assert!(registry.inspect(&Value::Null).results.is_empty());

        registry.register("m", |_: &Value, _: &ConfigSnapshot| Ok::<_, HandlerError>(Value::Int(1)));
        assert_eq!(registry.inspect(&Value::Null).get("m"), Some(&Value::Int(1)));
    }

    proptest! {
        #[test]
        fn prop_quorum_iff_distinct_count(
            order in prop::collection::vec(0usize..5, 0..15),
            required in 1usize..=5,
        ) {
            let chain = Arc::new(AuditChain::new());
            let config = Arc::new(ConfigStore::new());
            let universe = ["A", "B", "C", "D", "E"];
            let gate = QuorumGate::new(PrincipalSet::new(universe), required, chain, config).unwrap();

            let mut seen = BTreeSet::new();
            for i in order {
                seen.insert(i);
                let granted = gate.approve(&Principal::from(universe[i])).unwrap();
                prop_assert_eq!(granted, seen.len() >= required);
            }
            prop_assert_eq!(gate.state().votes(), seen.len());
        }
    }
}
