//! In-memory implementation of the audit sink.
//!
//! This is primarily for testing. Everything is lost when the sink is dropped.

use std::sync::RwLock;

use pi0_kernel_core::{AuditRecord, AuditSink, SinkError};

use crate::error::Result;
use crate::traits::AuditLog;

/// In-memory sink. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<Vec<AuditRecord>>,
    fail_from: Option<u64>,
}

impl MemorySink {
    /// Create a new empty in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every record with `sequence >= from`.
    ///
    /// Used to exercise the chain's persistence-failure path.
    pub fn failing_from(from: u64) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            fail_from: Some(from),
        }
    }

    /// Copy of the persisted records.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for MemorySink {
    fn persist(&self, record: &AuditRecord) -> std::result::Result<(), SinkError> {
        if self.fail_from.is_some_and(|from| record.sequence >= from) {
            return Err(SinkError::new(format!(
                "memory sink refused record {}",
                record.sequence
            )));
        }
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

impl AuditLog for MemorySink {
    fn load_all(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.records())
    }
}
