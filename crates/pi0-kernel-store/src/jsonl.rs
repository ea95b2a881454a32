//! Append-only JSON-lines audit sink.
//!
//! One serialized record per line, fields in [`AuditRecord`] order. Each line
//! is written with a single `write_all` and synced under a mutex, so
//! concurrent appends never interleave.
//!
//! A crash mid-write can still leave a torn final line with no trailing
//! newline. Readers skip it, and [`JsonLinesSink::open`] truncates it away
//! before appending, so the record is lost but the chain before it stays
//! readable. A malformed line anywhere else is an error.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pi0_kernel_core::{AuditRecord, AuditSink, SinkError};

use crate::error::{Result, StoreError};
use crate::traits::AuditLog;

/// File-backed sink writing one JSON record per line.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open (or create) the log file for appending.
    ///
    /// A torn final line left by an interrupted write is truncated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let dropped = truncate_torn_tail(&mut file)?;
        if dropped > 0 {
            tracing::warn!(path = %path.display(), dropped, "truncated torn audit log tail");
        }
        tracing::debug!(path = %path.display(), "opened audit log");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Parse records from any JSON-lines file.
    ///
    /// A final line without a trailing newline that fails to parse is
    /// treated as a torn write and skipped.
    pub fn read_path(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let torn_tail = !text.is_empty() && !text.ends_with('\n');
        let line_count = text.lines().count();
        let mut records = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if torn_tail && line_no + 1 == line_count => {
                    tracing::warn!(path = %path.display(), line = line_no + 1, error = %e, "skipping torn audit log tail");
                }
                Err(e) => {
                    return Err(StoreError::InvalidData(format!("line {}: {}", line_no + 1, e)));
                }
            }
        }

        Ok(records)
    }
}

/// Cut the file back to its last newline. Returns the number of bytes dropped.
fn truncate_torn_tail(file: &mut File) -> Result<u64> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    match bytes.last() {
        None | Some(b'\n') => Ok(0),
        Some(_) => {
            let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
            file.set_len(keep as u64)?;
            Ok((bytes.len() - keep) as u64)
        }
    }
}

impl AuditSink for JsonLinesSink {
    fn persist(&self, record: &AuditRecord) -> std::result::Result<(), SinkError> {
        self.write_line(record).map_err(SinkError::from)
    }
}

impl AuditLog for JsonLinesSink {
    fn load_all(&self) -> Result<Vec<AuditRecord>> {
        Self::read_path(&self.path)
    }
}
