//! `SQLite` implementation of [`NotificationSink`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use dealflow_app::ports::NotificationSink;
use dealflow_domain::error::DealflowError;
use dealflow_domain::id::UserId;
use dealflow_domain::notification::Notification;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(Notification);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Notification {
            id: codec::parse(row, "id")?,
            user_id: codec::parse(row, "user_id")?,
            transaction_id: codec::parse(row, "transaction_id")?,
            message: row.try_get("message")?,
            is_read: row.try_get("is_read")?,
            created_at: codec::parse_timestamp(row, "created_at")?,
        }))
    }
}

/// Stores in-app notifications in the `notifications` table.
#[derive(Clone)]
pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Notifications addressed to `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, DealflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

impl NotificationSink for SqliteNotificationStore {
    async fn send(&self, notification: Notification) -> Result<(), DealflowError> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, transaction_id, message, is_read, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(notification.id.to_string())
        .bind(notification.user_id.to_string())
        .bind(notification.transaction_id.to_string())
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(codec::timestamp(notification.created_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use crate::transaction_repo::SqliteTransactionRepository;
    use dealflow_domain::transaction::Transaction;

    #[tokio::test]
    async fn should_store_unread_notification_for_user() {
        let db = Config::new("sqlite::memory:").build().await.unwrap();
        let tx = Transaction::builder().title("8 Maple Dr").build().unwrap();
        SqliteTransactionRepository::new(db.pool().clone())
            .insert(&tx)
            .await
            .unwrap();
        let store = SqliteNotificationStore::new(db.pool().clone());
        let agent = UserId::new();

        let notification = Notification::unread(agent, tx.id, "Workflow applied");
        store.send(notification.clone()).await.unwrap();

        let listed = store.list_for_user(agent).await.unwrap();
        assert_eq!(listed, vec![notification]);
        assert!(store.list_for_user(UserId::new()).await.unwrap().is_empty());
    }
}
