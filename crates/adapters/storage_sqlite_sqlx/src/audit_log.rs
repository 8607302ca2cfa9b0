//! `SQLite` implementation of [`AuditSink`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use dealflow_app::ports::AuditSink;
use dealflow_domain::audit::AuditEntry;
use dealflow_domain::error::DealflowError;
use dealflow_domain::id::ExecutionId;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(AuditEntry);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let details_json: String = row.try_get("details")?;
        Ok(Self(AuditEntry {
            id: codec::parse(row, "id")?,
            execution_id: codec::parse(row, "execution_id")?,
            action: codec::parse(row, "action")?,
            status: codec::parse(row, "status")?,
            details: serde_json::from_str(&details_json).map_err(codec::decode_error)?,
            created_at: codec::parse_timestamp(row, "created_at")?,
        }))
    }
}

/// Append-only audit trail in `automation_audit_log`.
#[derive(Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    /// Create a new audit log backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Entries written for one execution, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn list_for_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<AuditEntry>, DealflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM automation_audit_log WHERE execution_id = ? ORDER BY created_at, rowid",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

impl AuditSink for SqliteAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), DealflowError> {
        let details_json = serde_json::to_string(&entry.details).map_err(StorageError::from)?;

        sqlx::query(
            "INSERT INTO automation_audit_log (id, execution_id, action, status, details, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.execution_id.to_string())
        .bind(entry.action.as_str())
        .bind(entry.status.as_str())
        .bind(&details_json)
        .bind(codec::timestamp(entry.created_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }
}
