//! SQLite implementation of the audit sink.
//!
//! Uses rusqlite with bundled SQLite. The connection sits behind a mutex;
//! every call is short and synchronous.
//!
//! Each row stores the entry twice: as JSON, which is decoded on load, and
//! as the canonical CBOR bytes the record hash covers. A load fails if the
//! two disagree.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use pi0_kernel_core::{
    canonical_entry_bytes, AuditEntry, AuditRecord, AuditSink, Blake3Hash, SinkError,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::AuditLog;

/// SQLite-based sink.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, record: &AuditRecord) -> Result<()> {
        let sequence = i64::try_from(record.sequence)
            .map_err(|_| StoreError::InvalidData(format!("sequence {} overflows", record.sequence)))?;
        let entry_json = serde_json::to_string(&record.entry)?;
        let entry_cbor = canonical_entry_bytes(&record.entry);

        self.conn().execute(
            "INSERT INTO audit_records
                (sequence, action, entry_json, entry_cbor, prev_hash, timestamp, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sequence,
                record.entry.action(),
                entry_json,
                entry_cbor,
                record.prev_hash.as_bytes().as_slice(),
                record.timestamp,
                record.hash.as_bytes().as_slice(),
            ],
        )?;
        Ok(())
    }

    /// Records with the given action tag, ordered by sequence.
    pub fn load_by_action(&self, action: &str) -> Result<Vec<AuditRecord>> {
        self.query(
            "SELECT sequence, entry_json, entry_cbor, prev_hash, timestamp, hash
             FROM audit_records WHERE action = ?1 ORDER BY sequence",
            params![action],
        )
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<AuditRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (sequence, entry_json, entry_cbor, prev_hash, timestamp, hash) = row?;
            let entry: AuditEntry = serde_json::from_str(&entry_json)?;
            if canonical_entry_bytes(&entry) != entry_cbor {
                return Err(StoreError::InvalidData(format!(
                    "entry {}: stored canonical bytes do not match entry_json",
                    sequence
                )));
            }
            records.push(AuditRecord {
                sequence: u64::try_from(sequence)
                    .map_err(|_| StoreError::InvalidData(format!("negative sequence {}", sequence)))?,
                entry,
                prev_hash: digest_from_blob(&prev_hash)?,
                timestamp,
                hash: digest_from_blob(&hash)?,
            });
        }
        Ok(records)
    }
}

fn digest_from_blob(blob: &[u8]) -> Result<Blake3Hash> {
    let arr: [u8; 32] = blob
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("digest has {} bytes", blob.len())))?;
    Ok(Blake3Hash::from_bytes(arr))
}

impl AuditSink for SqliteSink {
    fn persist(&self, record: &AuditRecord) -> std::result::Result<(), SinkError> {
        self.insert(record).map_err(SinkError::from)
    }
}

impl AuditLog for SqliteSink {
    fn load_all(&self) -> Result<Vec<AuditRecord>> {
        self.query(
            "SELECT sequence, entry_json, entry_cbor, prev_hash, timestamp, hash
             FROM audit_records ORDER BY sequence",
            [],
        )
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM audit_records", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pi0_kernel_core::{AuditChain, Principal, Value};
    use std::sync::Arc;

    fn populated() -> (Arc<SqliteSink>, AuditChain) {
        let sink = Arc::new(SqliteSink::open_memory().unwrap());
        let chain = AuditChain::with_sink(sink.clone());
        chain.append(AuditEntry::Approve {
            principal: Principal::from("alice"),
            granted: false,
        });
        chain.append(AuditEntry::Approve {
            principal: Principal::from("bob"),
            granted: true,
        });
        chain.append(AuditEntry::ApplyChange {
            key: "rate".into(),
            value: Value::Int(5),
        });
        (sink, chain)
    }

    #[test]
    fn test_persist_and_verify() {
        let (sink, chain) = populated();
        assert_eq!(sink.count().unwrap(), 3);
        assert_eq!(sink.verify_persisted().unwrap(), chain.export());
        assert!(chain.sink_failures().is_empty());
    }

    #[test]
    fn test_load_by_action() {
        let (sink, _chain) = populated();
        let approvals = sink.load_by_action("approve").unwrap();
        assert_eq!(approvals.len(), 2);
        assert_eq!(approvals[1].sequence, 1);
    }

    #[test]
    fn test_duplicate_sequence_is_a_sink_failure() {
        let (sink, chain) = populated();
        let first = chain.get(0).unwrap();
        assert!(sink.persist(&first).is_err());
    }

    #[test]
    fn test_tampered_row_detected() {
        let (sink, _chain) = populated();
        sink.conn()
            .execute(
                "UPDATE audit_records SET timestamp = timestamp + 1 WHERE sequence = 1",
                [],
            )
            .unwrap();

        match sink.verify_persisted() {
            Err(StoreError::Integrity(e)) => assert_eq!(e.first_index(), 1),
            other => panic!("expected integrity error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_mismatched_canonical_bytes_rejected() {
        let (sink, _chain) = populated();
        sink.conn()
            .execute(
                "UPDATE audit_records SET entry_cbor = X'A0' WHERE sequence = 2",
                [],
            )
            .unwrap();

        match sink.load_all() {
            Err(StoreError::InvalidData(msg)) => assert!(msg.starts_with("entry 2")),
            other => panic!("expected invalid data, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_resume_after_reopen_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let head = {
            let sink = Arc::new(SqliteSink::open(&path).unwrap());
            let chain = AuditChain::with_sink(sink);
            chain.append(AuditEntry::Reset);
            chain.append(AuditEntry::RegisterModule { name: "m".into() });
            chain.head()
        };

        let sink = Arc::new(SqliteSink::open(&path).unwrap());
        let chain = crate::resume_chain(Arc::clone(&sink)).unwrap();
        let next = chain.append(AuditEntry::Reset);

        assert_eq!(next.sequence, 2);
        assert_eq!(next.prev_hash, head);
        assert!(chain.sink_failures().is_empty());
        assert_eq!(sink.verify_persisted().unwrap(), chain.export());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        {
            let sink = Arc::new(SqliteSink::open(&path).unwrap());
            let chain = AuditChain::with_sink(sink);
            chain.append(AuditEntry::Reset);
        }
        let sink = SqliteSink::open(&path).unwrap();
        assert_eq!(sink.verify_persisted().unwrap().len(), 1);
    }
}
