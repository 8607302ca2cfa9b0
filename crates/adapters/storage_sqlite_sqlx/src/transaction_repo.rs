//! `SQLite` access to transactions, tasks and documents.
//!
//! The engine only reads these tables through the ports. The inherent write
//! methods exist for the host application and for tests.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use dealflow_app::ports::{DocumentRepository, TaskRepository, TransactionRepository};
use dealflow_domain::error::DealflowError;
use dealflow_domain::id::{DocumentId, TaskId, TransactionId};
use dealflow_domain::transaction::{Document, Task, Transaction, TransactionStatus};

use crate::codec;
use crate::error::StorageError;

struct TransactionRow(Transaction);

impl<'r> FromRow<'r, SqliteRow> for TransactionRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Transaction {
            id: codec::parse(row, "id")?,
            title: row.try_get("title")?,
            status: codec::parse(row, "status")?,
            agent_id: codec::parse_opt(row, "agent_id")?,
            created_at: codec::parse_timestamp(row, "created_at")?,
            closing_date: codec::parse_opt(row, "closing_date")?,
            updated_at: codec::parse_timestamp(row, "updated_at")?,
        }))
    }
}

struct TaskRow(Task);

impl<'r> FromRow<'r, SqliteRow> for TaskRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Task {
            id: codec::parse(row, "id")?,
            transaction_id: codec::parse(row, "transaction_id")?,
            title: row.try_get("title")?,
            priority: codec::parse(row, "priority")?,
            is_completed: row.try_get("is_completed")?,
            completed_at: codec::parse_timestamp_opt(row, "completed_at")?,
        }))
    }
}

struct DocumentRow(Document);

impl<'r> FromRow<'r, SqliteRow> for DocumentRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Document {
            id: codec::parse(row, "id")?,
            transaction_id: codec::parse(row, "transaction_id")?,
            filename: row.try_get("filename")?,
            uploaded_at: codec::parse_timestamp(row, "uploaded_at")?,
        }))
    }
}

/// `SQLite`-backed transaction repository.
#[derive(Clone)]
pub struct SqliteTransactionRepository {
    pool: SqlitePool,
}

impl SqliteTransactionRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a transaction.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn insert(&self, transaction: &Transaction) -> Result<(), DealflowError> {
        sqlx::query(
            "INSERT INTO transactions (id, title, status, agent_id, closing_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(transaction.id.to_string())
        .bind(&transaction.title)
        .bind(transaction.status.as_str())
        .bind(transaction.agent_id.map(|id| id.to_string()))
        .bind(transaction.closing_date.map(codec::date))
        .bind(codec::timestamp(transaction.created_at))
        .bind(codec::timestamp(transaction.updated_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// Move a transaction to `status`, returning the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::NotFound`] when the transaction does not
    /// exist, or a storage error.
    pub async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<TransactionStatus, DealflowError> {
        let previous = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| dealflow_domain::error::NotFoundError {
                entity: "Transaction",
                id: id.to_string(),
            })?
            .status;

        sqlx::query("UPDATE transactions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(codec::timestamp(dealflow_domain::time::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(previous)
    }
}

impl TransactionRepository for SqliteTransactionRepository {
    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, DealflowError> {
        let row: Option<TransactionRow> = sqlx::query_as("SELECT * FROM transactions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|r| r.0))
    }

    async fn list_by_status(
        &self,
        statuses: &[TransactionStatus],
    ) -> Result<Vec<Transaction>, DealflowError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT * FROM transactions WHERE status IN ({placeholders}) ORDER BY created_at, id"
        );
        let mut query = sqlx::query_as::<_, TransactionRow>(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

/// `SQLite`-backed task repository.
#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a task.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn insert(&self, task: &Task) -> Result<(), DealflowError> {
        sqlx::query(
            "INSERT INTO tasks (id, transaction_id, title, priority, is_completed, completed_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(task.transaction_id.to_string())
        .bind(&task.title)
        .bind(task.priority.as_str())
        .bind(task.is_completed)
        .bind(task.completed_at.map(codec::timestamp))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// Tasks of a transaction, in title order.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn list_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Task>, DealflowError> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE transaction_id = ? ORDER BY title, id")
                .bind(transaction_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

impl TaskRepository for SqliteTaskRepository {
    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, DealflowError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|r| r.0))
    }
}

/// `SQLite`-backed document repository.
#[derive(Clone)]
pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a document.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn insert(&self, document: &Document) -> Result<(), DealflowError> {
        sqlx::query(
            "INSERT INTO documents (id, transaction_id, filename, uploaded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(document.id.to_string())
        .bind(document.transaction_id.to_string())
        .bind(&document.filename)
        .bind(codec::timestamp(document.uploaded_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }
}

impl DocumentRepository for SqliteDocumentRepository {
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>, DealflowError> {
        let row: Option<DocumentRow> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|r| r.0))
    }
}
