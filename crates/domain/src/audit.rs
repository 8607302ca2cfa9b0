//! Audit entries — the trail left by every execution transition.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{AuditEntryId, ExecutionId};
use crate::time::Timestamp;

/// What happened to an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    WorkflowApplied,
    NotificationSent,
    RetryScheduled,
    ExecutionFailed,
    RetryCancelled,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowApplied => "workflow_applied",
            Self::NotificationSent => "notification_sent",
            Self::RetryScheduled => "retry_scheduled",
            Self::ExecutionFailed => "execution_failed",
            Self::RetryCancelled => "retry_cancelled",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow_applied" => Ok(Self::WorkflowApplied),
            "notification_sent" => Ok(Self::NotificationSent),
            "retry_scheduled" => Ok(Self::RetryScheduled),
            "execution_failed" => Ok(Self::ExecutionFailed),
            "retry_cancelled" => Ok(Self::RetryCancelled),
            other => Err(ValidationError::UnknownVariant {
                kind: "audit action",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome recorded alongside an [`AuditAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failed,
}

impl AuditStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(ValidationError::UnknownVariant {
                kind: "audit status",
                value: other.to_string(),
            }),
        }
    }
}

/// One line of the automation audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub execution_id: ExecutionId,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub details: serde_json::Value,
    pub created_at: Timestamp,
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        action: AuditAction,
        status: AuditStatus,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            execution_id,
            action,
            status,
            details,
            created_at: crate::time::now(),
        }
    }

    #[must_use]
    pub fn success(execution_id: ExecutionId, action: AuditAction, details: serde_json::Value) -> Self {
        Self::new(execution_id, action, AuditStatus::Success, details)
    }

    #[must_use]
    pub fn failure(execution_id: ExecutionId, action: AuditAction, details: serde_json::Value) -> Self {
        Self::new(execution_id, action, AuditStatus::Failed, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_action_as_snake_case() {
        let json = serde_json::to_string(&AuditAction::RetryScheduled).unwrap();
        assert_eq!(json, "\"retry_scheduled\"");
        assert_eq!(AuditAction::RetryScheduled.to_string(), "retry_scheduled");
    }

    #[test]
    fn should_parse_action_and_status_from_text() {
        assert_eq!(
            "retry_cancelled".parse::<AuditAction>().unwrap(),
            AuditAction::RetryCancelled
        );
        assert_eq!("failed".parse::<AuditStatus>().unwrap(), AuditStatus::Failed);
        assert!("exploded".parse::<AuditAction>().is_err());
    }

    #[test]
    fn should_build_failure_entry() {
        let entry = AuditEntry::failure(
            ExecutionId::new(),
            AuditAction::ExecutionFailed,
            serde_json::json!({"retry_count": 3}),
        );
        assert_eq!(entry.status, AuditStatus::Failed);
        assert_eq!(entry.details["retry_count"], 3);
    }
}
