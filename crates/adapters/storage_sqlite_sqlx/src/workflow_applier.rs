//! `SQLite` implementation of [`WorkflowApplier`].
//!
//! The instance row and its tasks are written in one database transaction,
//! so a failed application leaves nothing behind.

use sqlx::SqlitePool;

use dealflow_app::ports::WorkflowApplier;
use dealflow_domain::error::{DealflowError, NotFoundError};
use dealflow_domain::id::{TaskId, TemplateId, TransactionId, UserId, WorkflowInstanceId};
use dealflow_domain::time::now;

use crate::codec;
use crate::error::StorageError;
use crate::template_repo;

/// Instantiates templates by copying their task blueprints into `tasks`.
#[derive(Clone)]
pub struct SqliteWorkflowApplier {
    pool: SqlitePool,
}

impl SqliteWorkflowApplier {
    /// Create a new applier backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl WorkflowApplier for SqliteWorkflowApplier {
    async fn apply_template(
        &self,
        transaction_id: TransactionId,
        template_id: TemplateId,
        applied_by: Option<UserId>,
    ) -> Result<WorkflowInstanceId, DealflowError> {
        let mut db_tx = self.pool.begin().await.map_err(StorageError::from)?;

        let template: Option<template_repo::Wrapper> =
            sqlx::query_as("SELECT * FROM workflow_templates WHERE id = ?")
                .bind(template_id.to_string())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(StorageError::from)?;
        let template = template.map(|w| w.0).ok_or_else(|| NotFoundError {
            entity: "Template",
            id: template_id.to_string(),
        })?;

        let applied_at = now();
        let instance_id = WorkflowInstanceId::new();
        sqlx::query(
            "INSERT INTO workflow_instances (id, transaction_id, template_id, applied_by, applied_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(instance_id.to_string())
        .bind(transaction_id.to_string())
        .bind(template_id.to_string())
        .bind(applied_by.map(|id| id.to_string()))
        .bind(codec::timestamp(applied_at))
        .execute(&mut *db_tx)
        .await
        .map_err(StorageError::from)?;

        let today = applied_at.date_naive();
        for task in &template.tasks {
            let due_date = task
                .due_in_days
                .and_then(|days| today.checked_add_days(chrono::Days::new(u64::from(days))))
                .map(codec::date);
            sqlx::query(
                "INSERT INTO tasks (id, transaction_id, workflow_instance_id, title, priority, due_date) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(TaskId::new().to_string())
            .bind(transaction_id.to_string())
            .bind(instance_id.to_string())
            .bind(&task.title)
            .bind(task.priority.as_str())
            .bind(due_date)
            .execute(&mut *db_tx)
            .await
            .map_err(StorageError::from)?;
        }

        db_tx.commit().await.map_err(StorageError::from)?;
        tracing::debug!(
            %instance_id,
            template = %template.name,
            tasks = template.tasks.len(),
            "template applied"
        );
        Ok(instance_id)
    }
}
