//! Named inspection modules.
//!
//! A module is a handler run over a record with a read-only snapshot of the
//! configuration. Handlers are isolated from one another: an error or panic
//! in one is recorded as a missing result and the rest still run.
//!
//! Registering a handler is unprivileged, but a registered module is only
//! dispatched by [`ModuleRegistry::inspect`] once a quorum has activated it
//! through [`QuorumGate::request_activation`](crate::QuorumGate::request_activation).

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use pi0_kernel_core::{AuditChain, AuditEntry, Value};

use crate::config::{ConfigSnapshot, ConfigStore};
use crate::error::HandlerError;

/// A pure function of a record and a config snapshot.
pub trait ModuleHandler: Send + Sync {
    fn handle(&self, record: &Value, config: &ConfigSnapshot) -> Result<Value, HandlerError>;
}

impl<F> ModuleHandler for F
where
    F: Fn(&Value, &ConfigSnapshot) -> Result<Value, HandlerError> + Send + Sync,
{
    fn handle(&self, record: &Value, config: &ConfigSnapshot) -> Result<Value, HandlerError> {
        self(record, config)
    }
}

/// Result of one [`ModuleRegistry::inspect`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectReport {
    /// One entry per active module; `None` when the handler failed.
    pub results: BTreeMap<String, Option<Value>>,
    /// Failure details for the modules whose result is `None`.
    pub failures: BTreeMap<String, HandlerError>,
    /// Sequence number of the `inspect` audit record.
    pub audit_sequence: u64,
}

impl InspectReport {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.results.get(name).and_then(Option::as_ref)
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry of named module handlers.
pub struct ModuleRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn ModuleHandler>>>,
    active: RwLock<BTreeSet<String>>,
    chain: Arc<AuditChain>,
    config: Arc<ConfigStore>,
}

impl ModuleRegistry {
    pub fn new(chain: Arc<AuditChain>, config: Arc<ConfigStore>) -> Self {
        Self {
            handlers: RwLock::new(BTreeMap::new()),
            active: RwLock::new(BTreeSet::new()),
            chain,
            config,
        }
    }

    /// Register a handler under `name`, replacing any previous one.
    ///
    /// A replacement keeps the name's activation state.
    pub fn register<H>(&self, name: impl Into<String>, handler: H)
    where
        H: ModuleHandler + 'static,
    {
        let name = name.into();
        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone(), Arc::new(handler))
            .is_some();

        self.chain.append(AuditEntry::RegisterModule { name: name.clone() });
        tracing::info!(module = %name, replaced, "module registered");
    }

    /// Mark a registered module as active. Returns `false` if `name` is not
    /// registered or was already active.
    ///
    /// Only the quorum gate calls this; it appends the audit entry itself.
    pub(crate) fn activate(&self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string())
    }

    /// Mark `name` active from a recorded activation, registered or not.
    /// Handlers registered later under that name are dispatched.
    pub(crate) fn restore_active(&self, name: String) {
        self.active.write().unwrap_or_else(|e| e.into_inner()).insert(name);
    }

    /// Run every active handler over `record`.
    ///
    /// Each handler sees the same config snapshot. An `inspect` entry with
    /// the record and all results is appended once every handler has run.
    pub fn inspect(&self, record: &Value) -> InspectReport {
        let handlers: Vec<(String, Arc<dyn ModuleHandler>)> = {
            let active = self.active.read().unwrap_or_else(|e| e.into_inner());
            self.handlers
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .filter(|(name, _)| active.contains(name.as_str()))
                .map(|(name, handler)| (name.clone(), Arc::clone(handler)))
                .collect()
        };
        let snapshot = self.config.snapshot();

        let mut results = BTreeMap::new();
        let mut failures = BTreeMap::new();

        for (name, handler) in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(record, &snapshot)))
                .unwrap_or_else(|panic| Err(HandlerError::new(panic_message(panic.as_ref()))));

            match outcome {
                Ok(value) => {
                    results.insert(name, Some(value));
                }
                Err(err) => {
                    tracing::warn!(module = %name, error = %err, "module handler failed");
                    results.insert(name.clone(), None);
                    failures.insert(name, err);
                }
            }
        }

        let audit = self.chain.append(AuditEntry::Inspect {
            record: record.clone(),
            results: results.clone(),
        });

        InspectReport {
            results,
            failures,
            audit_sequence: audit.sequence,
        }
    }

    /// Registered module names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Active module names in sorted order.
    pub fn active_names(&self) -> Vec<String> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ModuleRegistry, Arc<AuditChain>, Arc<ConfigStore>) {
        let chain = Arc::new(AuditChain::new());
        let config = Arc::new(ConfigStore::new());
        let registry = ModuleRegistry::new(Arc::clone(&chain), Arc::clone(&config));
        (registry, chain, config)
    }

    fn module<F>(f: F) -> F
    where
        F: Fn(&Value, &ConfigSnapshot) -> Result<Value, HandlerError> + Send + Sync,
    {
        f
    }

    fn record() -> Value {
        let mut map = BTreeMap::new();
        map.insert("amount".to_string(), Value::Int(40));
        Value::Map(map)
    }

    #[test]
    fn test_inspect_runs_every_active_handler() {
        let (registry, chain, config) = registry();
        config.apply("limit".into(), Value::Int(50));

        registry.register("limit", module(|record, config| {
            let amount = record.get("amount").and_then(Value::as_int).unwrap_or(0);
            let limit = config.get("limit").and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Bool(amount <= limit))
        }));
        registry.register("echo", module(|record, _| Ok(record.clone())));
        registry.activate("limit");
        registry.activate("echo");

        let report = registry.inspect(&record());
        assert!(report.all_succeeded());
        assert_eq!(report.get("limit"), Some(&Value::Bool(true)));
        assert_eq!(report.get("echo"), Some(&record()));

        let actions: Vec<_> = chain.export().iter().map(|r| r.entry.action()).collect();
        assert_eq!(actions, vec!["register_module", "register_module", "inspect"]);
        assert_eq!(report.audit_sequence, 2);
    }

    #[test]
    fn test_failing_handler_is_contained() {
        let (registry, chain, _) = registry();

        registry.register("bad", module(|_, _| Err(HandlerError::new("boom"))));
        registry.register("panics", module(|_, _| panic!("handler blew up")));
        registry.register("good", module(|_, _| Ok(Value::Int(1))));
        for name in ["bad", "panics", "good"] {
            registry.activate(name);
        }

        let report = registry.inspect(&record());
        assert_eq!(report.results.get("bad"), Some(&None));
        assert_eq!(report.results.get("panics"), Some(&None));
        assert_eq!(report.get("good"), Some(&Value::Int(1)));
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures["panics"].message.contains("handler blew up"));

        let last = chain.export().pop().unwrap();
        match last.entry {
            AuditEntry::Inspect { results, .. } => {
                assert_eq!(results.len(), 3);
                assert_eq!(results["bad"], None);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_register_replaces() {
        let (registry, chain, _) = registry();

        registry.register("m", module(|_, _| Ok(Value::Int(1))));
        registry.activate("m");
        registry.register("m", module(|_, _| Ok(Value::Int(2))));

        assert_eq!(registry.len(), 1);
        assert!(registry.is_active("m"));
        assert_eq!(registry.inspect(&Value::Null).get("m"), Some(&Value::Int(2)));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_inspect_with_no_modules() {
        let (registry, chain, _) = registry();

        let report = registry.inspect(&Value::Null);
        assert!(report.results.is_empty());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_handler_sees_snapshot() {
        let (registry, _, config) = registry();
        config.apply("mode".into(), Value::from("strict"));

        registry.register("mode", module(|_, config| {
            config.get("mode").cloned().ok_or_else(|| HandlerError::new("missing mode"))
        }));
        registry.activate("mode");

        let report = registry.inspect(&Value::Null);
        assert_eq!(report.get("mode"), Some(&Value::from("strict")));
        assert!(registry.contains("mode"));
        assert_eq!(registry.names(), vec!["mode".to_string()]);
    }

    #[test]
    fn test_inactive_module_is_not_dispatched() {
        let (registry, chain, _) = registry();

        registry.register("on", module(|_, _| Ok(Value::Int(1))));
        registry.register("off", module(|_, _| Ok(Value::Int(2))));
        assert!(registry.activate("on"));
        assert!(!registry.activate("on"));
        assert!(!registry.activate("missing"));

        let report = registry.inspect(&Value::Null);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.get("on"), Some(&Value::Int(1)));
        assert!(!report.results.contains_key("off"));
        assert_eq!(registry.names(), vec!["off".to_string(), "on".to_string()]);
        assert_eq!(registry.active_names(), vec!["on".to_string()]);

        match chain.export().pop().unwrap().entry {
            AuditEntry::Inspect { results, .. } => assert!(!results.contains_key("off")),
            other => panic!("unexpected entry {:?}", other),
        }
    }
}
