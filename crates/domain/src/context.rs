//! Trigger context — the event snapshot handed to rule evaluation.

use serde::{Deserialize, Serialize};

use crate::id::{TransactionId, UserId};
use crate::rule::{TriggerCondition, scheduled_slot};
use crate::time::Timestamp;
use crate::transaction::{Document, Task, Transaction, TransactionStatus};

/// Event-specific payload carried by a [`TriggerContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerData {
    StatusChange {
        old_status: TransactionStatus,
        new_status: TransactionStatus,
    },
    TaskCompleted {
        task: Task,
    },
    DocumentUploaded {
        document: Document,
    },
    /// Periodic sweep evaluating contract/closing date offsets.
    DateSweep,
    /// Periodic sweep evaluating wall-clock schedules.
    TimeSweep,
}

impl TriggerData {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatusChange { .. } => "status_change",
            Self::TaskCompleted { .. } => "task_completed",
            Self::DocumentUploaded { .. } => "document_uploaded",
            Self::DateSweep => "date_sweep",
            Self::TimeSweep => "time_sweep",
        }
    }
}

/// Snapshot of a transaction and the occurrence that may trigger automations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub transaction_id: TransactionId,
    pub transaction: Transaction,
    pub data: TriggerData,
    /// Actor who caused the event, if any.
    pub user_id: Option<UserId>,
    /// When the occurrence happened; "now" for date and time conditions.
    pub occurred_at: Timestamp,
}

impl TriggerContext {
    #[must_use]
    pub fn new(
        transaction: Transaction,
        data: TriggerData,
        user_id: Option<UserId>,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            transaction_id: transaction.id,
            transaction,
            data,
            user_id,
            occurred_at,
        }
    }

    /// Key identifying the logical occurrence behind this context.
    ///
    /// Two contexts with the same fingerprint for the same transaction are
    /// the same occurrence, so a rule must not execute twice for them. Date
    /// sweeps are bucketed per calendar day and time sweeps per minute.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match &self.data {
            TriggerData::StatusChange {
                old_status,
                new_status,
            } => format!(
                "status_change:{old_status}->{new_status}@{}",
                self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.6fZ")
            ),
            TriggerData::TaskCompleted { task } => format!("task_completed:{}", task.id),
            TriggerData::DocumentUploaded { document } => {
                format!("document_uploaded:{}", document.id)
            }
            TriggerData::DateSweep => {
                format!("date_sweep:{}", self.occurred_at.format("%Y-%m-%d"))
            }
            TriggerData::TimeSweep => {
                format!("time_sweep:{}", self.occurred_at.format("%Y-%m-%dT%H:%M"))
            }
        }
    }

    /// Fingerprint of this occurrence as seen by a rule with `condition`.
    ///
    /// A time sweep matching a scheduled `time_of_day` is keyed by that
    /// slot, so sweeps landing anywhere inside the tolerance window share
    /// one fingerprint. Everything else falls back to [`Self::fingerprint`].
    #[must_use]
    pub fn fingerprint_for(&self, condition: &TriggerCondition) -> String {
        if !matches!(self.data, TriggerData::TimeSweep) {
            return self.fingerprint();
        }
        match scheduled_slot(condition, self.occurred_at) {
            Ok(Some(slot)) => format!("time_sweep:{}", slot.format("%Y-%m-%dT%H:%M")),
            _ => self.fingerprint(),
        }
    }
}
