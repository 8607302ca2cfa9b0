//! Workflow execution — the tracked attempt-and-retry record for one rule match.
//!
//! ```text
//! pending ─start─▶ running ─complete─▶ completed
//!                     │
//!                     ├─error, budget left─▶ retrying ─resume─▶ running
//!                     │                         │
//!                     │                         └─cancel─▶ failed
//!                     └─error, budget spent─▶ failed
//! ```
//!
//! `completed` and `failed` are terminal. Retries reuse the same execution.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::TriggerContext;
use crate::error::ValidationError;
use crate::id::{ExecutionId, RuleId, TransactionId};
use crate::rule::AutomationRule;
use crate::time::Timestamp;

/// Lifecycle status of a [`WorkflowExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self → next` is an edge of the execution state machine.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::Retrying, Self::Running)
                | (Self::Running, Self::Completed | Self::Retrying | Self::Failed)
                | (Self::Retrying, Self::Failed)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            other => Err(ValidationError::UnknownVariant {
                kind: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

/// Data captured at creation so a retry can rebuild its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub rule_name: String,
    pub trigger_context: TriggerContext,
    /// Dedup key component identifying the logical occurrence.
    pub trigger_fingerprint: String,
}

/// One rule's attempt to apply its template to one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub rule_id: RuleId,
    pub transaction_id: TransactionId,
    pub status: ExecutionStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub metadata: ExecutionMetadata,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl WorkflowExecution {
    /// Create a `pending` execution for `rule` matched against `context`.
    #[must_use]
    pub fn pending(rule: &AutomationRule, context: &TriggerContext, now: Timestamp) -> Self {
        Self {
            id: ExecutionId::new(),
            rule_id: rule.id,
            transaction_id: context.transaction_id,
            status: ExecutionStatus::Pending,
            retry_count: 0,
            error_message: None,
            metadata: ExecutionMetadata {
                rule_name: rule.name.clone(),
                trigger_context: context.clone(),
                trigger_fingerprint: context.fingerprint_for(&rule.trigger_condition),
            },
            created_at: now,
            completed_at: None,
        }
    }

    /// Natural key used to reject duplicate executions.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            rule_id: self.rule_id,
            transaction_id: self.transaction_id,
            trigger_fingerprint: &self.metadata.trigger_fingerprint,
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(next) {
            return Err(ValidationError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// `pending | retrying → running`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] from any other status.
    pub fn start(&mut self) -> Result<(), ValidationError> {
        self.transition(ExecutionStatus::Running)
    }

    /// `running → completed`, clearing any error left by an earlier attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] unless running.
    pub fn complete(&mut self, at: Timestamp) -> Result<(), ValidationError> {
        self.transition(ExecutionStatus::Completed)?;
        self.completed_at = Some(at);
        self.error_message = None;
        Ok(())
    }

    /// `running → retrying`, consuming one unit of the retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] unless running.
    pub fn schedule_retry(&mut self, error: impl Into<String>) -> Result<u32, ValidationError> {
        self.transition(ExecutionStatus::Retrying)?;
        self.retry_count += 1;
        self.error_message = Some(error.into());
        Ok(self.retry_count)
    }

    /// `running | retrying → failed`. The retry count is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTransition`] from a terminal or pending status.
    pub fn fail(&mut self, error: impl Into<String>, at: Timestamp) -> Result<(), ValidationError> {
        self.transition(ExecutionStatus::Failed)?;
        self.error_message = Some(error.into());
        self.completed_at = Some(at);
        Ok(())
    }
}

/// `(rule_id, transaction_id, trigger_fingerprint)`, unique per execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub rule_id: RuleId,
    pub transaction_id: TransactionId,
    pub trigger_fingerprint: &'a str,
}

/// A retry waiting in the durable queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRetry {
    pub execution_id: ExecutionId,
    pub rule_id: RuleId,
    /// Retry number this entry will perform (equals the execution's `retry_count`).
    pub attempt: u32,
    pub due_at: Timestamp,
}
