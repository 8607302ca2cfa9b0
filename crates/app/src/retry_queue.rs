//! In-memory [`RetryQueue`] used by the unit-test harness.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use dealflow_domain::error::DealflowError;
use dealflow_domain::execution::PendingRetry;
use dealflow_domain::id::{ExecutionId, RuleId};
use dealflow_domain::time::Timestamp;

use crate::ports::RetryQueue;

#[derive(Debug, Clone)]
struct Entry {
    retry: PendingRetry,
    leased_until: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<Entry>,
    fail_next_enqueue: bool,
}

/// Process-local retry queue. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRetryQueue {
    inner: Arc<Mutex<QueueState>>,
}

impl InMemoryRetryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries still queued (leased or not), earliest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingRetry> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut retries: Vec<PendingRetry> =
            inner.entries.iter().map(|entry| entry.retry.clone()).collect();
        retries.sort_by_key(|retry| retry.due_at);
        retries
    }

    pub fn fail_next_enqueue(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_next_enqueue = true;
    }
}

impl RetryQueue for InMemoryRetryQueue {
    fn enqueue(
        &self,
        retry: PendingRetry,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let result = if std::mem::take(&mut inner.fail_next_enqueue) {
            Err(DealflowError::Storage(Box::new(std::io::Error::other(
                "retry queue unavailable",
            ))))
        } else {
            inner
                .entries
                .retain(|entry| entry.retry.execution_id != retry.execution_id);
            inner.entries.push(Entry {
                retry,
                leased_until: None,
            });
            Ok(())
        };
        async { result }
    }

    fn claim_due(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PendingRetry>, DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.sort_by_key(|entry| entry.retry.due_at);
        let claimed: Vec<PendingRetry> = inner
            .entries
            .iter_mut()
            .filter(|entry| {
                entry.retry.due_at <= now && entry.leased_until.is_none_or(|until| until <= now)
            })
            .take(limit)
            .map(|entry| {
                entry.leased_until = Some(lease_until);
                entry.retry.clone()
            })
            .collect();
        async move { Ok(claimed) }
    }

    fn remove(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .retain(|entry| entry.retry.execution_id != execution_id);
        async { Ok(()) }
    }

    fn contains(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<bool, DealflowError>> + Send {
        let found = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .any(|entry| entry.retry.execution_id == execution_id);
        async move { Ok(found) }
    }

    fn cancel_for_rule(
        &self,
        rule_id: RuleId,
    ) -> impl Future<Output = Result<Vec<ExecutionId>, DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cancelled = Vec::new();
        inner.entries.retain(|entry| {
            if entry.retry.rule_id == rule_id {
                cancelled.push(entry.retry.execution_id);
                false
            } else {
                true
            }
        });
        async move { Ok(cancelled) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use dealflow_domain::time::now;

    fn retry(rule_id: RuleId, due_at: Timestamp) -> PendingRetry {
        PendingRetry {
            execution_id: ExecutionId::new(),
            rule_id,
            attempt: 1,
            due_at,
        }
    }

    #[tokio::test]
    async fn should_claim_only_due_entries_in_order() {
        let queue = InMemoryRetryQueue::new();
        let rule = RuleId::new();
        let base = now();
        let late = retry(rule, base + TimeDelta::seconds(10));
        let second = retry(rule, base - TimeDelta::seconds(1));
        let first = retry(rule, base - TimeDelta::seconds(5));
        for entry in [late.clone(), second.clone(), first.clone()] {
            queue.enqueue(entry).await.unwrap();
        }

        let claimed = queue
            .claim_due(base, base + TimeDelta::minutes(5), 10)
            .await
            .unwrap();

        assert_eq!(claimed, vec![first, second]);
        assert_eq!(queue.pending().len(), 3);
    }

    #[tokio::test]
    async fn should_respect_claim_limit() {
        let queue = InMemoryRetryQueue::new();
        let rule = RuleId::new();
        let base = now();
        for secs in 1..=3 {
            queue
                .enqueue(retry(rule, base - TimeDelta::seconds(secs)))
                .await
                .unwrap();
        }
        let lease = base + TimeDelta::minutes(5);

        assert_eq!(queue.claim_due(base, lease, 2).await.unwrap().len(), 2);
        assert_eq!(queue.claim_due(base, lease, 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_hand_out_leased_entry_again_after_lease_expires() {
        let queue = InMemoryRetryQueue::new();
        let base = now();
        let entry = retry(RuleId::new(), base);
        queue.enqueue(entry.clone()).await.unwrap();
        let lease_until = base + TimeDelta::seconds(30);

        let claimed = queue.claim_due(base, lease_until, 10).await.unwrap();
        assert_eq!(claimed, vec![entry.clone()]);
        let while_leased = queue
            .claim_due(base + TimeDelta::seconds(10), lease_until, 10)
            .await
            .unwrap();
        assert!(while_leased.is_empty());

        let reclaimed = queue
            .claim_due(lease_until, lease_until + TimeDelta::seconds(30), 10)
            .await
            .unwrap();
        assert_eq!(reclaimed, vec![entry]);
    }

    #[tokio::test]
    async fn should_release_lease_when_rescheduled() {
        let queue = InMemoryRetryQueue::new();
        let base = now();
        let mut entry = retry(RuleId::new(), base);
        queue.enqueue(entry.clone()).await.unwrap();
        queue
            .claim_due(base, base + TimeDelta::hours(1), 10)
            .await
            .unwrap();

        entry.attempt = 2;
        entry.due_at = base + TimeDelta::seconds(2);
        queue.enqueue(entry.clone()).await.unwrap();

        let claimed = queue
            .claim_due(base + TimeDelta::seconds(2), base + TimeDelta::hours(1), 10)
            .await
            .unwrap();
        assert_eq!(claimed, vec![entry]);
    }

    #[tokio::test]
    async fn should_remove_settled_entry() {
        let queue = InMemoryRetryQueue::new();
        let entry = retry(RuleId::new(), now());
        queue.enqueue(entry.clone()).await.unwrap();
        assert!(queue.contains(entry.execution_id).await.unwrap());

        queue.remove(entry.execution_id).await.unwrap();

        assert!(!queue.contains(entry.execution_id).await.unwrap());
        assert!(queue.pending().is_empty());
    }

    #[tokio::test]
    async fn should_cancel_only_entries_of_rule() {
        let queue = InMemoryRetryQueue::new();
        let doomed = RuleId::new();
        let kept = retry(RuleId::new(), now());
        let cancelled = retry(doomed, now());
        queue.enqueue(kept.clone()).await.unwrap();
        queue.enqueue(cancelled.clone()).await.unwrap();

        let ids = queue.cancel_for_rule(doomed).await.unwrap();

        assert_eq!(ids, vec![cancelled.execution_id]);
        assert_eq!(queue.pending(), vec![kept]);
    }
}
