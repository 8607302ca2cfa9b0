//! Transaction, task and document lookups.
//!
//! These records belong to the surrounding application; the engine only
//! needs to read them.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::id::{DocumentId, TaskId, TransactionId};
use dealflow_domain::transaction::{Document, Task, Transaction, TransactionStatus};

/// Read access to [`Transaction`]s.
pub trait TransactionRepository: Send + Sync {
    /// Get a transaction by its unique identifier.
    fn get_by_id(
        &self,
        id: TransactionId,
    ) -> impl Future<Output = Result<Option<Transaction>, DealflowError>> + Send;

    /// Get every transaction whose status is one of `statuses`.
    fn list_by_status(
        &self,
        statuses: &[TransactionStatus],
    ) -> impl Future<Output = Result<Vec<Transaction>, DealflowError>> + Send;
}

/// Read access to [`Task`]s.
pub trait TaskRepository: Send + Sync {
    /// Get a task by its unique identifier.
    fn get_by_id(
        &self,
        id: TaskId,
    ) -> impl Future<Output = Result<Option<Task>, DealflowError>> + Send;
}

/// Read access to [`Document`]s.
pub trait DocumentRepository: Send + Sync {
    /// Get a document by its unique identifier.
    fn get_by_id(
        &self,
        id: DocumentId,
    ) -> impl Future<Output = Result<Option<Document>, DealflowError>> + Send;
}
