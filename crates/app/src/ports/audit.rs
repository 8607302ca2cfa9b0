//! Audit sink port — append-only audit trail.

use std::future::Future;

use dealflow_domain::audit::AuditEntry;
use dealflow_domain::error::DealflowError;

/// Records [`AuditEntry`]s.
///
/// Callers treat failures as non-fatal: they are logged and dropped.
pub trait AuditSink: Send + Sync {
    /// Append one entry to the trail.
    fn append(&self, entry: AuditEntry) -> impl Future<Output = Result<(), DealflowError>> + Send;
}
