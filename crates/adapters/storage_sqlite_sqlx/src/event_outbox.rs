//! `SQLite` implementation of [`EventOutbox`].
//!
//! The surrounding application appends events to `domain_events` in the same
//! database as its own writes. A row whose payload no longer decodes is
//! logged and marked delivered so it cannot block the rows behind it.

use sqlx::{Row, SqlitePool};

use dealflow_app::ports::EventOutbox;
use dealflow_domain::error::DealflowError;
use dealflow_domain::event::{DomainEvent, OutboxEntry};
use dealflow_domain::time::{Timestamp, now};

use crate::codec;
use crate::error::StorageError;

/// Outbox of domain events in `domain_events`.
#[derive(Clone)]
pub struct SqliteEventOutbox {
    pool: SqlitePool,
}

impl SqliteEventOutbox {
    /// Create a new outbox backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record `event` for delivery and return its sequence number.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn append(&self, event: &DomainEvent) -> Result<i64, DealflowError> {
        let payload = serde_json::to_string(event).map_err(StorageError::from)?;
        let result = sqlx::query(
            "INSERT INTO domain_events (event_type, payload, created_at) VALUES (?, ?, ?)",
        )
        .bind(event.kind())
        .bind(&payload)
        .bind(codec::timestamp(now()))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(result.last_insert_rowid())
    }
}

impl EventOutbox for SqliteEventOutbox {
    async fn fetch_undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>, DealflowError> {
        let rows = sqlx::query(
            "SELECT seq, payload FROM domain_events WHERE delivered_at IS NULL ORDER BY seq LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.try_get("seq").map_err(StorageError::from)?;
            let payload: String = row.try_get("payload").map_err(StorageError::from)?;
            match serde_json::from_str::<DomainEvent>(&payload) {
                Ok(event) => entries.push(OutboxEntry { seq, event }),
                Err(err) => {
                    tracing::error!(seq, error = %err, "undecodable domain event skipped");
                    self.mark_delivered(seq, now()).await?;
                }
            }
        }
        Ok(entries)
    }

    async fn mark_delivered(&self, seq: i64, at: Timestamp) -> Result<(), DealflowError> {
        sqlx::query("UPDATE domain_events SET delivered_at = ? WHERE seq = ?")
            .bind(codec::timestamp(at))
            .bind(seq)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
