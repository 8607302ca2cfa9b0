//! Event outbox port — domain events recorded by the surrounding application.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::event::OutboxEntry;
use dealflow_domain::time::Timestamp;

/// Durable log of domain events, drained in recording order.
pub trait EventOutbox: Send + Sync {
    /// Up to `limit` entries not yet delivered, lowest `seq` first.
    fn fetch_undelivered(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<OutboxEntry>, DealflowError>> + Send;

    /// Mark the entry at `seq` as delivered.
    fn mark_delivered(
        &self,
        seq: i64,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send;
}
