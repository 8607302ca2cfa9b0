//! `SQLite` implementation of [`ExecutionRepository`].
//!
//! The `(rule_id, transaction_id, trigger_fingerprint)` unique index is what
//! makes concurrent duplicate executions impossible.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use dealflow_app::ports::ExecutionRepository;
use dealflow_domain::error::DealflowError;
use dealflow_domain::execution::{ExecutionMetadata, ExecutionStatus, WorkflowExecution};
use dealflow_domain::id::{ExecutionId, TransactionId};

use crate::codec;
use crate::error::StorageError;

struct Wrapper(WorkflowExecution);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let metadata_json: String = row.try_get("metadata")?;
        let metadata: ExecutionMetadata =
            serde_json::from_str(&metadata_json).map_err(codec::decode_error)?;

        Ok(Self(WorkflowExecution {
            id: codec::parse(row, "id")?,
            rule_id: codec::parse(row, "rule_id")?,
            transaction_id: codec::parse(row, "transaction_id")?,
            status: codec::parse(row, "status")?,
            retry_count: codec::parse_u32(row, "retry_count")?,
            error_message: row.try_get("error_message")?,
            metadata,
            created_at: codec::parse_timestamp(row, "created_at")?,
            completed_at: codec::parse_timestamp_opt(row, "completed_at")?,
        }))
    }
}

/// `SQLite`-backed workflow execution store.
#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ExecutionRepository for SqliteExecutionRepository {
    async fn insert_if_absent(&self, execution: &WorkflowExecution) -> Result<bool, DealflowError> {
        let key = execution.dedup_key();
        let metadata_json = serde_json::to_string(&execution.metadata).map_err(StorageError::from)?;

        let result = sqlx::query(
            "INSERT INTO workflow_executions (id, rule_id, transaction_id, status, retry_count, error_message, trigger_fingerprint, metadata, created_at, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT (rule_id, transaction_id, trigger_fingerprint) DO NOTHING",
        )
        .bind(execution.id.to_string())
        .bind(key.rule_id.to_string())
        .bind(key.transaction_id.to_string())
        .bind(execution.status.as_str())
        .bind(i64::from(execution.retry_count))
        .bind(&execution.error_message)
        .bind(key.trigger_fingerprint)
        .bind(&metadata_json)
        .bind(codec::timestamp(execution.created_at))
        .bind(execution.completed_at.map(codec::timestamp))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, execution: &WorkflowExecution) -> Result<(), DealflowError> {
        let result = sqlx::query(
            "UPDATE workflow_executions SET status = ?, retry_count = ?, error_message = ?, completed_at = ? WHERE id = ?",
        )
        .bind(execution.status.as_str())
        .bind(i64::from(execution.retry_count))
        .bind(&execution.error_message)
        .bind(execution.completed_at.map(codec::timestamp))
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(dealflow_domain::error::NotFoundError {
                entity: "Execution",
                id: execution.id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, DealflowError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn list_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<WorkflowExecution>, DealflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM workflow_executions WHERE transaction_id = ? ORDER BY created_at, id",
        )
        .bind(transaction_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, DealflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM workflow_executions WHERE status = ? ORDER BY created_at, id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
