//! Retry queue port — durable schedule of pending execution retries.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::execution::PendingRetry;
use dealflow_domain::id::{ExecutionId, RuleId};
use dealflow_domain::time::Timestamp;

/// Holds [`PendingRetry`] entries until their retry has run.
///
/// At most one entry exists per execution; enqueueing again replaces it and
/// releases any lease. Claiming only leases an entry: it stays queued until
/// [`remove`](Self::remove) is called, so a retry whose worker died is
/// handed out again once the lease expires.
pub trait RetryQueue: Send + Sync {
    /// Schedule (or reschedule) a retry.
    fn enqueue(&self, retry: PendingRetry)
    -> impl Future<Output = Result<(), DealflowError>> + Send;

    /// Lease up to `limit` entries with `due_at <= now` and no live lease
    /// until `lease_until`, earliest first.
    fn claim_due(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PendingRetry>, DealflowError>> + Send;

    /// Drop the entry of a retry that has settled.
    fn remove(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send;

    /// Whether an entry exists for `execution_id`, leased or not.
    fn contains(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<bool, DealflowError>> + Send;

    /// Remove every entry belonging to `rule_id`, returning the affected executions.
    fn cancel_for_rule(
        &self,
        rule_id: RuleId,
    ) -> impl Future<Output = Result<Vec<ExecutionId>, DealflowError>> + Send;
}
