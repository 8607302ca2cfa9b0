//! `SQLite` implementation of [`RuleRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use dealflow_app::ports::RuleRepository;
use dealflow_domain::error::DealflowError;
use dealflow_domain::id::RuleId;
use dealflow_domain::rule::{AutomationRule, TriggerCondition};

use crate::codec;
use crate::error::StorageError;

struct Wrapper(AutomationRule);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<AutomationRule> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let condition_json: String = row.try_get("trigger_condition")?;
        let trigger_condition =
            TriggerCondition::parse_str(&condition_json).map_err(codec::decode_error)?;

        let rule = AutomationRule {
            id: codec::parse(row, "id")?,
            name: row.try_get("name")?,
            trigger_event: codec::parse(row, "trigger_event")?,
            trigger_condition,
            template_id: codec::parse(row, "template_id")?,
            is_active: row.try_get("is_active")?,
            created_by: codec::parse_opt(row, "created_by")?,
            created_at: codec::parse_timestamp(row, "created_at")?,
            updated_at: codec::parse_timestamp(row, "updated_at")?,
        };
        rule.validate().map_err(codec::decode_error)?;
        Ok(Self(rule))
    }
}

/// `SQLite`-backed automation rule repository.
#[derive(Clone)]
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Decode rows one by one, dropping those that fail validation.
    fn quarantine(rows: &[SqliteRow]) -> Vec<AutomationRule> {
        rows.iter()
            .filter_map(|row| match Wrapper::from_row(row) {
                Ok(w) => Some(w.0),
                Err(err) => {
                    let id: String = row.try_get("id").unwrap_or_default();
                    tracing::warn!(rule_id = %id, error = %err, "skipping malformed automation rule");
                    None
                }
            })
            .collect()
    }
}

impl RuleRepository for SqliteRuleRepository {
    async fn create(&self, rule: AutomationRule) -> Result<AutomationRule, DealflowError> {
        let condition_json =
            serde_json::to_string(&rule.trigger_condition).map_err(StorageError::from)?;

        sqlx::query(
            "INSERT INTO automation_rules (id, name, trigger_event, trigger_condition, template_id, is_active, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id.to_string())
        .bind(&rule.name)
        .bind(rule.trigger_event.as_str())
        .bind(&condition_json)
        .bind(rule.template_id.to_string())
        .bind(rule.is_active)
        .bind(rule.created_by.map(|id| id.to_string()))
        .bind(codec::timestamp(rule.created_at))
        .bind(codec::timestamp(rule.updated_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn get_by_id(&self, id: RuleId) -> Result<Option<AutomationRule>, DealflowError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM automation_rules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn get_all(&self) -> Result<Vec<AutomationRule>, DealflowError> {
        let rows = sqlx::query("SELECT * FROM automation_rules ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Self::quarantine(&rows))
    }

    async fn list_active(&self) -> Result<Vec<AutomationRule>, DealflowError> {
        let rows = sqlx::query(
            "SELECT * FROM automation_rules WHERE is_active = 1 ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(Self::quarantine(&rows))
    }

    async fn update(&self, rule: AutomationRule) -> Result<AutomationRule, DealflowError> {
        let condition_json =
            serde_json::to_string(&rule.trigger_condition).map_err(StorageError::from)?;

        let result = sqlx::query(
            "UPDATE automation_rules SET name = ?, trigger_event = ?, trigger_condition = ?, template_id = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&rule.name)
        .bind(rule.trigger_event.as_str())
        .bind(&condition_json)
        .bind(rule.template_id.to_string())
        .bind(rule.is_active)
        .bind(codec::timestamp(rule.updated_at))
        .bind(rule.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(dealflow_domain::error::NotFoundError {
                entity: "Rule",
                id: rule.id.to_string(),
            }
            .into());
        }
        Ok(rule)
    }
}
