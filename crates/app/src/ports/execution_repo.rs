//! Execution repository port — persistence for workflow executions.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::execution::{ExecutionStatus, WorkflowExecution};
use dealflow_domain::id::{ExecutionId, TransactionId};

/// Repository for [`WorkflowExecution`] records.
pub trait ExecutionRepository: Send + Sync {
    /// Insert `execution` unless another row already holds its
    /// [`dedup_key`](WorkflowExecution::dedup_key).
    ///
    /// Returns `true` when the row was inserted, `false` for a duplicate.
    fn insert_if_absent(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<bool, DealflowError>> + Send;

    /// Persist status, retry count, error message and completion time.
    fn update(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send;

    /// Get an execution by its unique identifier.
    fn get_by_id(
        &self,
        id: ExecutionId,
    ) -> impl Future<Output = Result<Option<WorkflowExecution>, DealflowError>> + Send;

    /// Executions recorded for a transaction, oldest first.
    fn list_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, DealflowError>> + Send;

    /// Executions currently in `status`, oldest first.
    fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, DealflowError>> + Send;
}
