//! Trigger event — the kind of occurrence a rule listens to.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::TriggerData;
use crate::error::ValidationError;

/// The kind of domain occurrence an [`AutomationRule`](super::AutomationRule) reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    StatusChange,
    ContractDateOffset,
    ClosingDateOffset,
    TaskCompleted,
    DocumentUploaded,
    TimeBased,
}

impl TriggerEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::ContractDateOffset => "contract_date_offset",
            Self::ClosingDateOffset => "closing_date_offset",
            Self::TaskCompleted => "task_completed",
            Self::DocumentUploaded => "document_uploaded",
            Self::TimeBased => "time_based",
        }
    }

    /// Whether a context carrying `data` is relevant to rules of this kind.
    ///
    /// Date-offset rules are only considered during date sweeps and
    /// time-based rules only during time sweeps.
    #[must_use]
    pub fn accepts(self, data: &TriggerData) -> bool {
        matches!(
            (self, data),
            (Self::StatusChange, TriggerData::StatusChange { .. })
                | (Self::TaskCompleted, TriggerData::TaskCompleted { .. })
                | (Self::DocumentUploaded, TriggerData::DocumentUploaded { .. })
                | (
                    Self::ContractDateOffset | Self::ClosingDateOffset,
                    TriggerData::DateSweep
                )
                | (Self::TimeBased, TriggerData::TimeSweep)
        )
    }
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerEvent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_change" => Ok(Self::StatusChange),
            "contract_date_offset" => Ok(Self::ContractDateOffset),
            "closing_date_offset" => Ok(Self::ClosingDateOffset),
            "task_completed" => Ok(Self::TaskCompleted),
            "document_uploaded" => Ok(Self::DocumentUploaded),
            "time_based" => Ok(Self::TimeBased),
            other => Err(ValidationError::UnknownVariant {
                kind: "trigger event",
                value: other.to_string(),
            }),
        }
    }
}
