//! Condition evaluator — decides whether a trigger condition holds for a context.
//!
//! Evaluation is a pure function of the condition and the context: no
//! storage access and no clock reads ("today" and "now" come from
//! [`TriggerContext::occurred_at`]). Failures never reach the caller; they
//! are logged and the condition is treated as not matching.

use chrono::{Datelike, Days, TimeDelta};

use dealflow_domain::context::{TriggerContext, TriggerData};
use dealflow_domain::error::ValidationError;
use dealflow_domain::rule::{OffsetDirection, TriggerCondition, scheduled_slot};
use dealflow_domain::time::Date;

/// Allowed drift between the sweep time and a rule's `time_of_day`.
const TIME_OF_DAY_TOLERANCE_SECS: i64 = 60;

/// Stateless evaluator for [`TriggerCondition`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `condition` against `context`, failing closed.
    #[must_use]
    pub fn evaluate(&self, condition: &TriggerCondition, context: &TriggerContext) -> bool {
        match Self::try_evaluate(condition, context) {
            Ok(matched) => matched,
            Err(err) => {
                tracing::warn!(
                    %condition,
                    transaction_id = %context.transaction_id,
                    error = %err,
                    "condition evaluation failed, treating as no match"
                );
                false
            }
        }
    }

    fn try_evaluate(
        condition: &TriggerCondition,
        context: &TriggerContext,
    ) -> Result<bool, ValidationError> {
        match condition {
            TriggerCondition::StatusChange {
                from_status,
                to_status,
            } => {
                let (old, new) = match &context.data {
                    TriggerData::StatusChange {
                        old_status,
                        new_status,
                    } => (Some(*old_status), Some(*new_status)),
                    _ => (None, None),
                };
                let from_ok = from_status.is_none_or(|expected| old == Some(expected));
                let to_ok = to_status.is_none_or(|expected| new == Some(expected));
                Ok(from_ok && to_ok)
            }
            TriggerCondition::ContractDateOffset {
                offset_days,
                offset_type,
            } => date_offset_matches(
                Some(context.transaction.created_at.date_naive()),
                *offset_days,
                *offset_type,
                context.occurred_at.date_naive(),
            ),
            TriggerCondition::ClosingDateOffset {
                offset_days,
                offset_type,
            } => date_offset_matches(
                context.transaction.closing_date,
                *offset_days,
                *offset_type,
                context.occurred_at.date_naive(),
            ),
            TriggerCondition::TaskCompleted {
                task_title_contains,
                task_priority,
            } => {
                let TriggerData::TaskCompleted { task } = &context.data else {
                    return Ok(false);
                };
                if !task.is_completed {
                    return Ok(false);
                }
                if let Some(fragment) = task_title_contains {
                    if !contains_ignore_case(&task.title, fragment) {
                        return Ok(false);
                    }
                }
                if let Some(priority) = task_priority {
                    if task.priority != *priority {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TriggerCondition::DocumentUploaded { document_type } => {
                let TriggerData::DocumentUploaded { document } = &context.data else {
                    return Ok(false);
                };
                Ok(document_type
                    .as_deref()
                    .is_none_or(|fragment| contains_ignore_case(&document.filename, fragment)))
            }
            TriggerCondition::TimeBased { days_of_week, .. } => {
                let now = context.occurred_at;
                let slot = scheduled_slot(condition, now)?;
                if let Some(days) = days_of_week {
                    let weekday = slot.unwrap_or(now).weekday().num_days_from_sunday();
                    if !days.iter().any(|day| u32::from(*day) == weekday) {
                        return Ok(false);
                    }
                }
                let tolerance = TimeDelta::seconds(TIME_OF_DAY_TOLERANCE_SECS);
                if slot.is_some_and(|slot| (now - slot).abs() > tolerance) {
                    return Ok(false);
                }
                Ok(true)
            }
        }
    }
}

fn date_offset_matches(
    reference: Option<Date>,
    offset_days: u32,
    direction: OffsetDirection,
    today: Date,
) -> Result<bool, ValidationError> {
    let Some(reference) = reference else {
        return Ok(false);
    };
    let offset = Days::new(u64::from(offset_days));
    let target = match direction {
        OffsetDirection::After => reference.checked_add_days(offset),
        OffsetDirection::Before => reference.checked_sub_days(offset),
    }
    .ok_or(ValidationError::OffsetOutOfRange(offset_days))?;
    Ok(target == today)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
