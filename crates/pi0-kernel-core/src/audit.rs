//! The audit chain: an append-only, hash-linked log of authorization events.
//!
//! Each record binds its entry to the previous record's hash:
//!
//! ```text
//! hash = Blake3(canonical_entry || prev_hash || timestamp)
//! ```
//!
//! The first record's `prev_hash` is [`Blake3Hash::ZERO`]. There is no way
//! to delete or edit a record; the only mutation is append.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::canonical::record_hash_input;
use crate::crypto::Blake3Hash;
use crate::error::{ChainIntegrityError, SinkError};
use crate::types::{now_millis, Principal};
use crate::value::Value;

/// The structured payload of an audit record, tagged by action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditEntry {
    /// A known principal voted on the pending decision.
    Approve { principal: Principal, granted: bool },
    /// An unknown principal was turned away.
    Reject { principal: Principal },
    /// The pending approval set was cleared.
    Reset,
    /// A principal asked for a configuration change.
    RequestChange {
        principal: Principal,
        key: String,
        value: Value,
    },
    /// A quorum-approved configuration change was written.
    ApplyChange { key: String, value: Value },
    /// A module handler was registered (or replaced).
    RegisterModule { name: String },
    /// A principal asked for a registered module to be activated.
    RequestActivation { principal: Principal, module: String },
    /// A quorum-approved module activation took effect.
    ActivateModule { module: String },
    /// Every active handler was run over a record; `None` marks a failure.
    Inspect {
        record: Value,
        results: BTreeMap<String, Option<Value>>,
    },
    /// A packet addressed to `target` left a secure channel.
    ChannelSend {
        target: Principal,
        sequence: u64,
        mac: Blake3Hash,
    },
    /// A packet passed authentication and replay checks and was opened.
    ChannelReceive {
        target: Principal,
        sequence: u64,
        mac: Blake3Hash,
    },
    /// An event recorded by a collaborator outside the kernel.
    External {
        name: String,
        fields: BTreeMap<String, Value>,
    },
}

impl AuditEntry {
    /// The action tag, as it appears in serialized form.
    pub fn action(&self) -> &'static str {
        match self {
            AuditEntry::Approve { .. } => "approve",
            AuditEntry::Reject { .. } => "reject",
            AuditEntry::Reset => "reset",
            AuditEntry::RequestChange { .. } => "request_change",
            AuditEntry::ApplyChange { .. } => "apply_change",
            AuditEntry::RegisterModule { .. } => "register_module",
            AuditEntry::RequestActivation { .. } => "request_activation",
            AuditEntry::ActivateModule { .. } => "activate_module",
            AuditEntry::Inspect { .. } => "inspect",
            AuditEntry::ChannelSend { .. } => "channel_send",
            AuditEntry::ChannelReceive { .. } => "channel_receive",
            AuditEntry::External { .. } => "external",
        }
    }
}

/// One link of the audit chain.
///
/// Field order is fixed; sinks serialize records in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub entry: AuditEntry,
    pub prev_hash: Blake3Hash,
    /// Unix milliseconds. Non-decreasing along a chain built by [`AuditChain`].
    pub timestamp: i64,
    pub hash: Blake3Hash,
}

impl AuditRecord {
    /// Compute the hash binding an entry to its predecessor.
    pub fn compute_hash(entry: &AuditEntry, prev_hash: &Blake3Hash, timestamp: i64) -> Blake3Hash {
        Blake3Hash::hash(&record_hash_input(entry, prev_hash, timestamp))
    }

    /// Recompute this record's hash from its stored fields.
    pub fn recompute_hash(&self) -> Blake3Hash {
        Self::compute_hash(&self.entry, &self.prev_hash, self.timestamp)
    }
}

/// A durable destination for audit records.
///
/// The chain calls `persist` once per appended record, in append order,
/// while holding its append lock. A failure is reported but never rolls
/// back the in-memory chain.
pub trait AuditSink: Send + Sync {
    fn persist(&self, record: &AuditRecord) -> Result<(), SinkError>;
}

/// A record the sink failed to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailure {
    pub sequence: u64,
    pub error: SinkError,
}

/// What went wrong at a broken link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakKind {
    /// `sequence` does not match the record's position.
    SequenceMismatch { expected: u64, found: u64 },
    /// `prev_hash` does not equal the previous record's `hash`.
    LinkMismatch {
        expected: Blake3Hash,
        found: Blake3Hash,
    },
    /// Stored `hash` does not match the recomputed one.
    HashMismatch {
        stored: Blake3Hash,
        computed: Blake3Hash,
    },
}

/// A broken link found by verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub index: usize,
    pub kind: BreakKind,
}

/// Verify a sequence of records, e.g. an exported or reloaded chain.
///
/// Every break is reported, ordered by index.
pub fn verify_records(records: &[AuditRecord]) -> Result<(), ChainIntegrityError> {
    let mut breaks = Vec::new();
    let mut expected_prev = Blake3Hash::ZERO;

    for (index, record) in records.iter().enumerate() {
        if record.sequence != index as u64 {
            breaks.push(ChainBreak {
                index,
                kind: BreakKind::SequenceMismatch {
                    expected: index as u64,
                    found: record.sequence,
                },
            });
        }

        if record.prev_hash != expected_prev {
            breaks.push(ChainBreak {
                index,
                kind: BreakKind::LinkMismatch {
                    expected: expected_prev,
                    found: record.prev_hash,
                },
            });
        }

        let computed = record.recompute_hash();
        if computed != record.hash {
            breaks.push(ChainBreak {
                index,
                kind: BreakKind::HashMismatch {
                    stored: record.hash,
                    computed,
                },
            });
        }

        expected_prev = record.hash;
    }

    if breaks.is_empty() {
        Ok(())
    } else {
        tracing::error!(
            first = breaks[0].index,
            count = breaks.len(),
            "audit chain integrity violated"
        );
        Err(ChainIntegrityError { breaks })
    }
}

struct ChainInner {
    records: Vec<AuditRecord>,
    head: Blake3Hash,
    last_timestamp: i64,
    sink_failures: Vec<SinkFailure>,
}

/// Append-only, hash-linked audit log.
///
/// Thread-safe: appends are serialized by an internal mutex, so the chain
/// order is the order in which appends acquired the lock.
pub struct AuditChain {
    inner: Mutex<ChainInner>,
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditChain {
    /// Create an empty chain with no durable sink.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChainInner {
                records: Vec::new(),
                head: Blake3Hash::ZERO,
                last_timestamp: i64::MIN,
                sink_failures: Vec::new(),
            }),
            sink: None,
        }
    }

    /// Create an empty chain that persists every record to `sink`.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    /// Rebuild a chain from previously persisted records.
    ///
    /// The records are verified first; new appends continue the sequence
    /// and link to the last record's hash. `sink` should be the store the
    /// records came from so the resumed chain keeps writing to it.
    pub fn resume(
        records: Vec<AuditRecord>,
        sink: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, ChainIntegrityError> {
        verify_records(&records)?;

        let (head, last_timestamp) = records
            .last()
            .map(|r| (r.hash, r.timestamp))
            .unwrap_or((Blake3Hash::ZERO, i64::MIN));

        tracing::info!(len = records.len(), head = %head, "audit chain resumed");

        Ok(Self {
            inner: Mutex::new(ChainInner {
                records,
                head,
                last_timestamp,
                sink_failures: Vec::new(),
            }),
            sink,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ChainInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry stamped with the current time.
    pub fn append(&self, entry: AuditEntry) -> AuditRecord {
        let mut inner = self.lock();
        self.append_locked(&mut inner, entry, now_millis())
    }

    /// Append an entry with an explicit timestamp.
    ///
    /// Timestamps earlier than the chain's latest are raised to it so the
    /// chain stays monotonic.
    pub fn append_at(&self, entry: AuditEntry, timestamp: i64) -> AuditRecord {
        let mut inner = self.lock();
        self.append_locked(&mut inner, entry, timestamp)
    }

    /// Append several entries with no other append interleaved.
    pub fn append_batch(&self, entries: Vec<AuditEntry>) -> Vec<AuditRecord> {
        let mut inner = self.lock();
        let now = now_millis();
        entries
            .into_iter()
            .map(|entry| self.append_locked(&mut inner, entry, now))
            .collect()
    }

    fn append_locked(&self, inner: &mut ChainInner, entry: AuditEntry, timestamp: i64) -> AuditRecord {
        let timestamp = timestamp.max(inner.last_timestamp);
        let sequence = inner.records.len() as u64;
        let prev_hash = inner.head;
        let hash = AuditRecord::compute_hash(&entry, &prev_hash, timestamp);

        let record = AuditRecord {
            sequence,
            entry,
            prev_hash,
            timestamp,
            hash,
        };

        tracing::debug!(sequence, action = record.entry.action(), hash = %hash, "audit append");

        inner.records.push(record.clone());
        inner.head = hash;
        inner.last_timestamp = timestamp;

        if let Some(sink) = &self.sink {
            if let Err(error) = sink.persist(&record) {
                tracing::warn!(sequence, %error, "failed to persist audit record");
                inner.sink_failures.push(SinkFailure { sequence, error });
            }
        }

        record
    }

    /// Number of records in the chain.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Hash of the latest record, or the genesis value for an empty chain.
    pub fn head(&self) -> Blake3Hash {
        self.lock().head
    }

    /// Get a record by sequence number.
    pub fn get(&self, sequence: u64) -> Option<AuditRecord> {
        let inner = self.lock();
        usize::try_from(sequence)
            .ok()
            .and_then(|i| inner.records.get(i).cloned())
    }

    /// Copy of every record, in order.
    pub fn export(&self) -> Vec<AuditRecord> {
        self.lock().records.clone()
    }

    /// Copy of the records with `sequence >= from`.
    pub fn export_since(&self, from: u64) -> Vec<AuditRecord> {
        let inner = self.lock();
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(inner.records.len());
        inner.records[start..].to_vec()
    }

    /// Recompute every hash from genesis forward.
    pub fn verify_chain(&self) -> Result<(), ChainIntegrityError> {
        let inner = self.lock();
        verify_records(&inner.records)
    }

    /// `true` if [`verify_chain`](Self::verify_chain) finds no break.
    pub fn is_intact(&self) -> bool {
        self.verify_chain().is_ok()
    }

    /// Records the sink failed to persist. Retrying is the caller's policy.
    pub fn sink_failures(&self) -> Vec<SinkFailure> {
        self.lock().sink_failures.clone()
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("AuditChain")
            .field("len", &inner.records.len())
            .field("head", &inner.head)
            .finish()
    }
}
