//! Workflow application port.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::id::{TemplateId, TransactionId, UserId, WorkflowInstanceId};

/// Instantiates a workflow template's tasks on a transaction.
///
/// Implementations are not required to be idempotent: applying the same
/// template twice creates two instances. Callers guard against duplicates.
pub trait WorkflowApplier: Send + Sync {
    /// Apply `template_id` to `transaction_id` on behalf of `applied_by`.
    fn apply_template(
        &self,
        transaction_id: TransactionId,
        template_id: TemplateId,
        applied_by: Option<UserId>,
    ) -> impl Future<Output = Result<WorkflowInstanceId, DealflowError>> + Send;
}
