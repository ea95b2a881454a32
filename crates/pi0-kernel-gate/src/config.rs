//! Key/value configuration, written only through an approved change.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use pi0_kernel_core::Value;

/// Shared configuration store.
///
/// Reads are open to any caller. The only write path is crate-private and
/// is taken by [`QuorumGate`](crate::QuorumGate) when a change request
/// completes a quorum.
#[derive(Debug, Default)]
pub struct ConfigStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for a key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Immutable copy of the whole store.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot(Arc::new(
            self.entries
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a key. Returns the previous value.
    pub(crate) fn apply(&self, key: String, value: Value) -> Option<Value> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value)
    }
}

/// A read-only view of the configuration at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot(Arc<BTreeMap<String, Value>>);

impl ConfigSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The snapshot as a structured map value.
    pub fn to_value(&self) -> Value {
        Value::Map((*self.0).clone())
    }
}

impl From<BTreeMap<String, Value>> for ConfigSnapshot {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(Arc::new(map))
    }
}
