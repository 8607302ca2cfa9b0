//! `SQLite` implementation of [`RetryQueue`].
//!
//! Claiming stamps `leased_until` on the rows it returns in a single
//! `UPDATE … RETURNING`, so an entry is handed out once per lease even with
//! several workers polling the same database. Rows are deleted only when
//! their retry settles.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqlitePool};

use dealflow_app::ports::RetryQueue;
use dealflow_domain::error::DealflowError;
use dealflow_domain::execution::PendingRetry;
use dealflow_domain::id::{ExecutionId, RuleId};
use dealflow_domain::time::Timestamp;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(PendingRetry);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(PendingRetry {
            execution_id: codec::parse(row, "execution_id")?,
            rule_id: codec::parse(row, "rule_id")?,
            attempt: codec::parse_u32(row, "attempt")?,
            due_at: codec::parse_timestamp(row, "due_at")?,
        }))
    }
}

/// Durable retry schedule in `pending_retries`.
#[derive(Clone)]
pub struct SqliteRetryQueue {
    pool: SqlitePool,
}

impl SqliteRetryQueue {
    /// Create a new queue backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Entries still waiting, earliest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn pending(&self) -> Result<Vec<PendingRetry>, DealflowError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM pending_retries ORDER BY due_at, execution_id")
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

impl RetryQueue for SqliteRetryQueue {
    async fn enqueue(&self, retry: PendingRetry) -> Result<(), DealflowError> {
        sqlx::query(
            "INSERT INTO pending_retries (execution_id, rule_id, attempt, due_at, leased_until) VALUES (?, ?, ?, ?, NULL) ON CONFLICT (execution_id) DO UPDATE SET rule_id = excluded.rule_id, attempt = excluded.attempt, due_at = excluded.due_at, leased_until = NULL",
        )
        .bind(retry.execution_id.to_string())
        .bind(retry.rule_id.to_string())
        .bind(i64::from(retry.attempt))
        .bind(codec::timestamp(retry.due_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: usize,
    ) -> Result<Vec<PendingRetry>, DealflowError> {
        let now = codec::timestamp(now);
        let rows: Vec<Wrapper> = sqlx::query_as(
            "UPDATE pending_retries SET leased_until = ? WHERE execution_id IN (SELECT execution_id FROM pending_retries WHERE due_at <= ? AND (leased_until IS NULL OR leased_until <= ?) ORDER BY due_at LIMIT ?) RETURNING execution_id, rule_id, attempt, due_at",
        )
        .bind(codec::timestamp(lease_until))
        .bind(&now)
        .bind(&now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        // RETURNING order is unspecified
        let mut claimed: Vec<PendingRetry> = rows.into_iter().map(|w| w.0).collect();
        claimed.sort_by_key(|retry| retry.due_at);
        Ok(claimed)
    }

    async fn remove(&self, execution_id: ExecutionId) -> Result<(), DealflowError> {
        sqlx::query("DELETE FROM pending_retries WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn contains(&self, execution_id: ExecutionId) -> Result<bool, DealflowError> {
        let row = sqlx::query("SELECT 1 FROM pending_retries WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.is_some())
    }

    async fn cancel_for_rule(&self, rule_id: RuleId) -> Result<Vec<ExecutionId>, DealflowError> {
        let rows = sqlx::query("DELETE FROM pending_retries WHERE rule_id = ? RETURNING execution_id")
            .bind(rule_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        let ids = rows
            .iter()
            .map(|row| codec::parse(row, "execution_id"))
            .collect::<Result<Vec<ExecutionId>, _>>()
            .map_err(StorageError::from)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_repo::SqliteExecutionRepository;
    use crate::pool::Config;
    use chrono::TimeDelta;
    use dealflow_app::ports::ExecutionRepository;
    use dealflow_domain::context::{TriggerContext, TriggerData};
    use dealflow_domain::execution::WorkflowExecution;
    use dealflow_domain::rule::AutomationRule;
    use dealflow_domain::time::now;
    use dealflow_domain::transaction::Transaction;

    struct Fixture {
        queue: SqliteRetryQueue,
        executions: SqliteExecutionRepository,
    }

    async fn setup() -> Fixture {
        let db = Config::new("sqlite::memory:").build().await.unwrap();
        Fixture {
            queue: SqliteRetryQueue::new(db.pool().clone()),
            executions: SqliteExecutionRepository::new(db.pool().clone()),
        }
    }

    /// Insert an execution row so the foreign key holds, and return a retry for it.
    async fn retry(f: &Fixture, rule: &AutomationRule, due_at: Timestamp) -> PendingRetry {
        let tx = Transaction::builder().title("2 Ash Way").build().unwrap();
        let ctx = TriggerContext::new(tx, TriggerData::DateSweep, None, now());
        let exec = WorkflowExecution::pending(rule, &ctx, now());
        f.executions.insert_if_absent(&exec).await.unwrap();
        PendingRetry {
            execution_id: exec.id,
            rule_id: rule.id,
            attempt: 1,
            due_at,
        }
    }

    fn rule() -> AutomationRule {
        AutomationRule::builder().name("Rule").build().unwrap()
    }

    #[tokio::test]
    async fn should_claim_due_entries_once_per_lease() {
        let f = setup().await;
        let rule = rule();
        let base = now();
        let lease_until = base + TimeDelta::minutes(5);
        let early = retry(&f, &rule, base - TimeDelta::seconds(2)).await;
        let due = retry(&f, &rule, base).await;
        let later = retry(&f, &rule, base + TimeDelta::seconds(30)).await;
        for entry in [&later, &due, &early] {
            f.queue.enqueue(entry.clone()).await.unwrap();
        }

        let claimed = f.queue.claim_due(base, lease_until, 10).await.unwrap();
        let again = f.queue.claim_due(base, lease_until, 10).await.unwrap();

        assert_eq!(claimed, vec![early, due]);
        assert!(again.is_empty());
        assert_eq!(f.queue.pending().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn should_respect_claim_limit() {
        let f = setup().await;
        let rule = rule();
        let base = now();
        for secs in 1..=3 {
            let entry = retry(&f, &rule, base - TimeDelta::seconds(secs)).await;
            f.queue.enqueue(entry).await.unwrap();
        }
        let lease_until = base + TimeDelta::minutes(5);

        assert_eq!(f.queue.claim_due(base, lease_until, 2).await.unwrap().len(), 2);
        assert_eq!(f.queue.claim_due(base, lease_until, 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_reclaim_entry_after_lease_expires() {
        let f = setup().await;
        let base = now();
        let entry = retry(&f, &rule(), base).await;
        f.queue.enqueue(entry.clone()).await.unwrap();
        let lease_until = base + TimeDelta::seconds(30);

        // claimed by a worker that never finishes the retry
        f.queue.claim_due(base, lease_until, 10).await.unwrap();
        let while_leased = f
            .queue
            .claim_due(base + TimeDelta::seconds(29), lease_until, 10)
            .await
            .unwrap();
        let after_expiry = f
            .queue
            .claim_due(lease_until, lease_until + TimeDelta::seconds(30), 10)
            .await
            .unwrap();

        assert!(while_leased.is_empty());
        assert_eq!(after_expiry, vec![entry]);
    }

    #[tokio::test]
    async fn should_clear_lease_when_rescheduled() {
        let f = setup().await;
        let base = now();
        let mut entry = retry(&f, &rule(), base).await;
        f.queue.enqueue(entry.clone()).await.unwrap();
        f.queue
            .claim_due(base, base + TimeDelta::hours(1), 10)
            .await
            .unwrap();

        entry.attempt = 2;
        entry.due_at = base + TimeDelta::seconds(2);
        f.queue.enqueue(entry.clone()).await.unwrap();
        let claimed = f
            .queue
            .claim_due(entry.due_at, base + TimeDelta::hours(1), 10)
            .await
            .unwrap();

        assert_eq!(claimed, vec![entry]);
    }

    #[tokio::test]
    async fn should_remove_settled_entry() {
        let f = setup().await;
        let entry = retry(&f, &rule(), now()).await;
        f.queue.enqueue(entry.clone()).await.unwrap();
        assert!(f.queue.contains(entry.execution_id).await.unwrap());

        f.queue.remove(entry.execution_id).await.unwrap();

        assert!(!f.queue.contains(entry.execution_id).await.unwrap());
        assert!(f.queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reschedule_existing_entry() {
        let f = setup().await;
        let mut entry = retry(&f, &rule(), now()).await;
        f.queue.enqueue(entry.clone()).await.unwrap();

        entry.attempt = 2;
        entry.due_at += TimeDelta::seconds(2);
        f.queue.enqueue(entry.clone()).await.unwrap();

        assert_eq!(f.queue.pending().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn should_cancel_entries_of_rule_only() {
        let f = setup().await;
        let doomed = rule();
        let kept_rule = rule();
        let cancelled = retry(&f, &doomed, now()).await;
        let kept = retry(&f, &kept_rule, now()).await;
        f.queue.enqueue(cancelled.clone()).await.unwrap();
        f.queue.enqueue(kept.clone()).await.unwrap();

        let ids = f.queue.cancel_for_rule(doomed.id).await.unwrap();

        assert_eq!(ids, vec![cancelled.execution_id]);
        assert_eq!(f.queue.pending().await.unwrap(), vec![kept]);
    }
}
