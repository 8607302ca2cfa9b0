//! `SQLite` implementation of [`TemplateRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use dealflow_app::ports::TemplateRepository;
use dealflow_domain::error::DealflowError;
use dealflow_domain::id::TemplateId;
use dealflow_domain::template::{TemplateTask, WorkflowTemplate};

use crate::codec;
use crate::error::StorageError;

pub(crate) struct Wrapper(pub(crate) WorkflowTemplate);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let tasks_json: String = row.try_get("tasks")?;
        let tasks: Vec<TemplateTask> =
            serde_json::from_str(&tasks_json).map_err(codec::decode_error)?;

        Ok(Self(WorkflowTemplate {
            id: codec::parse(row, "id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            tasks,
        }))
    }
}

/// `SQLite`-backed workflow template store.
#[derive(Clone)]
pub struct SqliteTemplateRepository {
    pool: SqlitePool,
}

impl SqliteTemplateRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a template after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] for an invalid template, or a
    /// storage error.
    pub async fn create(&self, template: WorkflowTemplate) -> Result<WorkflowTemplate, DealflowError> {
        template.validate()?;
        let tasks_json = serde_json::to_string(&template.tasks).map_err(StorageError::from)?;

        sqlx::query("INSERT INTO workflow_templates (id, name, description, tasks) VALUES (?, ?, ?, ?)")
            .bind(template.id.to_string())
            .bind(&template.name)
            .bind(&template.description)
            .bind(&tasks_json)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(template)
    }

    /// Remove a template. Rules pointing at it start failing on execution.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the database.
    pub async fn delete(&self, id: TemplateId) -> Result<(), DealflowError> {
        sqlx::query("DELETE FROM workflow_templates WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

impl TemplateRepository for SqliteTemplateRepository {
    async fn get_by_id(&self, id: TemplateId) -> Result<Option<WorkflowTemplate>, DealflowError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM workflow_templates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }
}
