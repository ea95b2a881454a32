//! The `AuditLog` trait: a sink that can give back what it persisted.

use std::sync::Arc;

use pi0_kernel_core::{verify_records, AuditChain, AuditRecord, AuditSink};

use crate::error::Result;

/// A durable audit sink whose contents can be reloaded.
///
/// Reloading lets a host verify a chain written by an earlier process.
pub trait AuditLog: AuditSink {
    /// Load every persisted record, ordered by sequence.
    fn load_all(&self) -> Result<Vec<AuditRecord>>;

    /// Number of persisted records.
    fn count(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    /// Reload the persisted chain and verify every link.
    fn verify_persisted(&self) -> Result<Vec<AuditRecord>> {
        let records = self.load_all()?;
        verify_records(&records)?;
        Ok(records)
    }
}

/// Reload `log` and continue its chain, persisting new records back to it.
///
/// Fails if the persisted records do not verify.
pub fn resume_chain<L>(log: Arc<L>) -> Result<AuditChain>
where
    L: AuditLog + 'static,
{
    let records = log.load_all()?;
    let sink: Arc<dyn AuditSink> = log;
    Ok(AuditChain::resume(records, Some(sink))?)
}
