//! Domain events — what the surrounding application reports to the engine.
//!
//! The surrounding application records these in an outbox; a relay
//! publishes them on the event bus and the trigger detector turns each one
//! into a trigger context.

use serde::{Deserialize, Serialize};

use crate::id::{DocumentId, TaskId, TransactionId, UserId};
use crate::time::Timestamp;
use crate::transaction::TransactionStatus;

/// An occurrence in the transaction-management application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    TransactionStatusChanged {
        transaction_id: TransactionId,
        old_status: TransactionStatus,
        new_status: TransactionStatus,
        user_id: Option<UserId>,
        /// When the status changed; identifies the change on redelivery.
        occurred_at: Timestamp,
    },
    TaskCompleted {
        task_id: TaskId,
        transaction_id: TransactionId,
        user_id: Option<UserId>,
    },
    DocumentUploaded {
        document_id: DocumentId,
        transaction_id: TransactionId,
        user_id: Option<UserId>,
    },
}

impl DomainEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransactionStatusChanged { .. } => "transaction_status_changed",
            Self::TaskCompleted { .. } => "task_completed",
            Self::DocumentUploaded { .. } => "document_uploaded",
        }
    }

    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Self::TransactionStatusChanged { transaction_id, .. }
            | Self::TaskCompleted { transaction_id, .. }
            | Self::DocumentUploaded { transaction_id, .. } => *transaction_id,
        }
    }
}

/// A recorded event awaiting delivery, in recording order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Monotonic position in the outbox.
    pub seq: i64,
    pub event: DomainEvent,
}

impl std::fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransactionStatusChanged {
                transaction_id,
                old_status,
                new_status,
                ..
            } => write!(f, "status_changed({transaction_id}, {old_status} -> {new_status})"),
            Self::TaskCompleted { task_id, .. } => write!(f, "task_completed({task_id})"),
            Self::DocumentUploaded { document_id, .. } => {
                write!(f, "document_uploaded({document_id})")
            }
        }
    }
}
