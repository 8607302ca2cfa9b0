//! Retry worker — polls the retry queue and resumes due executions.
//!
//! Claimed entries are leased, not removed. If the worker dies mid-retry the
//! entry is handed out again once its lease expires. A slower reconcile
//! tick requeues `retrying` executions whose queue entry went missing.

use std::time::Duration;

use tokio::sync::watch;

use dealflow_domain::time::{Timestamp, now};

use crate::execution_coordinator::RetryHandler;
use crate::ports::RetryQueue;

/// Default number of retries claimed per poll.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default time a claimed retry stays hidden from other polls.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// Default period of the orphaned-retry reconciliation.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Background loop feeding due [`PendingRetry`](dealflow_domain::execution::PendingRetry)
/// entries to a [`RetryHandler`].
pub struct RetryWorker<Q, H> {
    queue: Q,
    handler: H,
    poll_interval: Duration,
    batch_size: usize,
    lease: Duration,
    reconcile_interval: Duration,
}

impl<Q: RetryQueue, H: RetryHandler> RetryWorker<Q, H> {
    /// Create a new worker polling every `poll_interval`.
    pub fn new(queue: Q, handler: H, poll_interval: Duration) -> Self {
        Self {
            queue,
            handler,
            poll_interval,
            batch_size: DEFAULT_BATCH_SIZE,
            lease: DEFAULT_LEASE,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    #[must_use]
    pub fn with_reconcile_interval(mut self, reconcile_interval: Duration) -> Self {
        self.reconcile_interval = reconcile_interval;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Claim and run every retry due at `at`. Returns how many were claimed.
    pub async fn run_due(&self, at: Timestamp) -> usize {
        let lease_until = chrono::TimeDelta::from_std(self.lease)
            .ok()
            .and_then(|lease| at.checked_add_signed(lease))
            .unwrap_or(at);
        let due = match self.queue.claim_due(at, lease_until, self.batch_size).await {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(error = %err, "failed to claim due retries");
                return 0;
            }
        };

        let claimed = due.len();
        for retry in due {
            match self.handler.retry_execution(retry.execution_id).await {
                Ok(outcome) => {
                    tracing::debug!(execution_id = %retry.execution_id, ?outcome, "retry processed");
                }
                Err(err) => {
                    tracing::error!(
                        execution_id = %retry.execution_id,
                        attempt = retry.attempt,
                        error = %err,
                        "retry failed"
                    );
                }
            }
        }
        claimed
    }

    /// Requeue `retrying` executions that lost their queue entry.
    pub async fn reconcile(&self, at: Timestamp) -> usize {
        match self.handler.requeue_orphaned_retries(at).await {
            Ok(requeued) => requeued,
            Err(err) => {
                tracing::error!(error = %err, "failed to reconcile retry queue");
                0
            }
        }
    }

    /// Poll until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval = ?self.poll_interval,
            lease = ?self.lease,
            "retry worker started"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut reconciler = tokio::time::interval(self.reconcile_interval);
        reconciler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = reconciler.tick() => {
                    self.reconcile(now()).await;
                }
                _ = ticker.tick() => {
                    // drain bursts without waiting a full interval per batch
                    while self.run_due(now()).await == self.batch_size {}
                }
            }
        }
        tracing::info!("retry worker stopped");
    }
}
