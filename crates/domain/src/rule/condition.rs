//! Trigger condition — the predicate a rule checks against a trigger context.

use serde::{Deserialize, Serialize};

use super::TriggerEvent;
use crate::error::ValidationError;
use crate::time::Timestamp;
use crate::transaction::{TaskPriority, TransactionStatus};

/// Largest accepted `offset_days`; keeps date arithmetic well inside chrono's range.
pub const MAX_OFFSET_DAYS: u32 = 36_500;

/// Direction of a date offset relative to its reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetDirection {
    Before,
    After,
}

/// Tagged union describing when a rule matches.
///
/// Absent optional fields act as wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
    StatusChange {
        #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
        from_status: Option<TransactionStatus>,
        #[serde(default, alias = "to", skip_serializing_if = "Option::is_none")]
        to_status: Option<TransactionStatus>,
    },
    /// Fires `offset_days` before/after the contract date (`transaction.created_at`).
    ContractDateOffset {
        offset_days: u32,
        offset_type: OffsetDirection,
    },
    /// Fires `offset_days` before/after `transaction.closing_date`.
    ClosingDateOffset {
        offset_days: u32,
        offset_type: OffsetDirection,
    },
    TaskCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_title_contains: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_priority: Option<TaskPriority>,
    },
    DocumentUploaded {
        /// Case-insensitive fragment looked up in the uploaded filename.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_type: Option<String>,
    },
    TimeBased {
        /// Allowed weekdays, `0` = Sunday through `6` = Saturday.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days_of_week: Option<Vec<u8>>,
        /// Wall-clock time, `HH:MM` in 24-hour format (UTC).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_of_day: Option<String>,
    },
}

impl TriggerCondition {
    /// Parse a stored condition payload.
    ///
    /// Accepts either a JSON object or a JSON string that itself contains
    /// an encoded object, then validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedCondition`] for unparseable
    /// payloads or unknown `type` tags, and the matching validation error
    /// for out-of-range fields.
    pub fn parse(value: serde_json::Value) -> Result<Self, ValidationError> {
        let value = match value {
            serde_json::Value::String(raw) => serde_json::from_str(&raw)
                .map_err(|err| ValidationError::MalformedCondition(err.to_string()))?,
            other => other,
        };
        let condition: Self = serde_json::from_value(value)
            .map_err(|err| ValidationError::MalformedCondition(err.to_string()))?;
        condition.validate()?;
        Ok(condition)
    }

    /// Parse a condition stored as JSON text.
    ///
    /// # Errors
    ///
    /// See [`TriggerCondition::parse`].
    pub fn parse_str(raw: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|err| ValidationError::MalformedCondition(err.to_string()))?;
        Self::parse(value)
    }

    /// Check field-level invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for weekdays outside `0..=6`, a
    /// `time_of_day` not in `HH:MM` form, or an offset beyond
    /// [`MAX_OFFSET_DAYS`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::ContractDateOffset { offset_days, .. }
            | Self::ClosingDateOffset { offset_days, .. } => {
                if *offset_days > MAX_OFFSET_DAYS {
                    return Err(ValidationError::OffsetOutOfRange(*offset_days));
                }
            }
            Self::TimeBased {
                days_of_week,
                time_of_day,
            } => {
                if let Some(day) = days_of_week.iter().flatten().find(|day| **day > 6) {
                    return Err(ValidationError::InvalidDayOfWeek(*day));
                }
                if let Some(time) = time_of_day {
                    parse_time_of_day(time)?;
                }
            }
            Self::StatusChange { .. } | Self::TaskCompleted { .. } | Self::DocumentUploaded { .. } => {}
        }
        Ok(())
    }

    /// The trigger event this condition belongs to.
    #[must_use]
    pub fn event(&self) -> TriggerEvent {
        match self {
            Self::StatusChange { .. } => TriggerEvent::StatusChange,
            Self::ContractDateOffset { .. } => TriggerEvent::ContractDateOffset,
            Self::ClosingDateOffset { .. } => TriggerEvent::ClosingDateOffset,
            Self::TaskCompleted { .. } => TriggerEvent::TaskCompleted,
            Self::DocumentUploaded { .. } => TriggerEvent::DocumentUploaded,
            Self::TimeBased { .. } => TriggerEvent::TimeBased,
        }
    }

    /// A time-based condition without any constraint matches on every sweep.
    #[must_use]
    pub fn is_unconstrained_time_based(&self) -> bool {
        matches!(
            self,
            Self::TimeBased {
                days_of_week: None,
                time_of_day: None
            }
        )
    }
}

/// The `time_of_day` slot nearest to `at`, for time-based conditions naming one.
///
/// The slot may fall on the previous or next calendar day when `at` is
/// close to midnight.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTimeOfDay`] for a malformed `time_of_day`.
pub fn scheduled_slot(
    condition: &TriggerCondition,
    at: Timestamp,
) -> Result<Option<Timestamp>, ValidationError> {
    let TriggerCondition::TimeBased {
        time_of_day: Some(time),
        ..
    } = condition
    else {
        return Ok(None);
    };
    let minutes = parse_time_of_day(time)?;
    let day = at.date_naive();
    let slot = [day.pred_opt(), Some(day), day.succ_opt()]
        .into_iter()
        .flatten()
        .filter_map(|date| date.and_hms_opt(minutes / 60, minutes % 60, 0))
        .map(|naive| naive.and_utc())
        .min_by_key(|slot| (*slot - at).abs());
    Ok(slot)
}

/// Parse `HH:MM` into minutes since midnight.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTimeOfDay`] unless the input is two
/// digits, a colon, and two digits forming a valid 24-hour time.
pub fn parse_time_of_day(value: &str) -> Result<u32, ValidationError> {
    let invalid = || ValidationError::InvalidTimeOfDay(value.to_string());
    let (hours, minutes) = value.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

impl std::fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StatusChange {
                from_status,
                to_status,
            } => {
                let from = from_status.map_or("*", TransactionStatus::as_str);
                let to = to_status.map_or("*", TransactionStatus::as_str);
                write!(f, "status_change({from} -> {to})")
            }
            Self::ContractDateOffset {
                offset_days,
                offset_type,
            } => write!(f, "contract_date_offset({offset_days}d {offset_type:?})"),
            Self::ClosingDateOffset {
                offset_days,
                offset_type,
            } => write!(f, "closing_date_offset({offset_days}d {offset_type:?})"),
            Self::TaskCompleted { .. } => f.write_str("task_completed"),
            Self::DocumentUploaded { document_type } => {
                write!(f, "document_uploaded({})", document_type.as_deref().unwrap_or("*"))
            }
            Self::TimeBased { time_of_day, .. } => {
                write!(f, "time_based({})", time_of_day.as_deref().unwrap_or("*"))
            }
        }
    }
}
