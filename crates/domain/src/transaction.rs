//! Transaction — the deal being managed, plus the tasks and documents attached to it.
//!
//! These records are owned by the surrounding transaction-management
//! application. The automation engine only reads them to build a
//! [`TriggerContext`](crate::context::TriggerContext).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DealflowError, ValidationError};
use crate::id::{DocumentId, TaskId, TransactionId, UserId};
use crate::time::{Date, Timestamp};

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Intake,
    Active,
    Pending,
    Closed,
    Cancelled,
}

impl TransactionStatus {
    /// Statuses swept by the date- and time-based detectors.
    pub const OPEN: [Self; 2] = [Self::Intake, Self::Active];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(Self::Intake),
            "active" => Ok(Self::Active),
            "pending" => Ok(Self::Pending),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ValidationError::UnknownVariant {
                kind: "transaction status",
                value: other.to_string(),
            }),
        }
    }
}

/// A real-estate transaction tracked from intake to closing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub title: String,
    pub status: TransactionStatus,
    /// Agent responsible for the deal; receives automation notifications.
    pub agent_id: Option<UserId>,
    pub created_at: Timestamp,
    pub closing_date: Option<Date>,
    pub updated_at: Timestamp,
}

impl Transaction {
    /// Create a builder for constructing a [`Transaction`].
    #[must_use]
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] when `title` is empty.
    pub fn validate(&self) -> Result<(), DealflowError> {
        if self.title.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Transaction`].
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    id: Option<TransactionId>,
    title: Option<String>,
    status: Option<TransactionStatus>,
    agent_id: Option<UserId>,
    created_at: Option<Timestamp>,
    closing_date: Option<Date>,
}

impl TransactionBuilder {
    #[must_use]
    pub fn id(mut self, id: TransactionId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn agent_id(mut self, agent_id: UserId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    #[must_use]
    pub fn closing_date(mut self, closing_date: Date) -> Self {
        self.closing_date = Some(closing_date);
        self
    }

    /// Consume the builder, validate, and return a [`Transaction`].
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] if the title is missing.
    pub fn build(self) -> Result<Transaction, DealflowError> {
        let created_at = self.created_at.unwrap_or_else(crate::time::now);
        let transaction = Transaction {
            id: self.id.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            status: self.status.unwrap_or(TransactionStatus::Intake),
            agent_id: self.agent_id,
            created_at,
            closing_date: self.closing_date,
            updated_at: created_at,
        };
        transaction.validate()?;
        Ok(transaction)
    }
}

/// Urgency attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ValidationError::UnknownVariant {
                kind: "task priority",
                value: other.to_string(),
            }),
        }
    }
}

/// A unit of work on a transaction checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub transaction_id: TransactionId,
    pub title: String,
    pub priority: TaskPriority,
    pub is_completed: bool,
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Create an open task.
    #[must_use]
    pub fn new(
        transaction_id: TransactionId,
        title: impl Into<String>,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: TaskId::new(),
            transaction_id,
            title: title.into(),
            priority,
            is_completed: false,
            completed_at: None,
        }
    }

    /// Mark the task completed at `at`.
    pub fn complete(&mut self, at: Timestamp) {
        self.is_completed = true;
        self.completed_at = Some(at);
    }
}

/// A file uploaded against a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub transaction_id: TransactionId,
    pub filename: String,
    pub uploaded_at: Timestamp,
}

impl Document {
    #[must_use]
    pub fn new(transaction_id: TransactionId, filename: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            transaction_id,
            filename: filename.into(),
            uploaded_at: crate::time::now(),
        }
    }
}
