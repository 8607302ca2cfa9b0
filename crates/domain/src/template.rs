//! Workflow template — a predefined set of tasks instantiated on a transaction.

use serde::{Deserialize, Serialize};

use crate::error::{DealflowError, ValidationError};
use crate::id::{TemplateId, TransactionId, UserId, WorkflowInstanceId};
use crate::time::Timestamp;
use crate::transaction::TaskPriority;

/// A task blueprint inside a [`WorkflowTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTask {
    pub title: String,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Days after application when the task falls due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_in_days: Option<u32>,
}

/// A named checklist that automation rules apply to transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: Option<String>,
    pub tasks: Vec<TemplateTask>,
}

impl WorkflowTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>, tasks: Vec<TemplateTask>) -> Self {
        Self {
            id: TemplateId::new(),
            name: name.into(),
            description: None,
            tasks,
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] when the name is empty or the
    /// template has no tasks.
    pub fn validate(&self) -> Result<(), DealflowError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.tasks.is_empty() {
            return Err(ValidationError::NoTemplateTasks.into());
        }
        Ok(())
    }
}

/// Record of a template having been applied to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub transaction_id: TransactionId,
    pub template_id: TemplateId,
    pub applied_by: Option<UserId>,
    pub applied_at: Timestamp,
}
