//! Automation rule — trigger event + trigger condition → workflow template.
//!
//! Rules are owned by the rule store and are read-only to the engine. Each
//! rule pairs a [`TriggerEvent`] with a [`TriggerCondition`] of the same
//! kind and names the [`WorkflowTemplate`](crate::template::WorkflowTemplate)
//! to apply when the condition matches.

mod condition;
mod trigger_event;

pub use condition::{
    MAX_OFFSET_DAYS, OffsetDirection, TriggerCondition, parse_time_of_day, scheduled_slot,
};
pub use trigger_event::TriggerEvent;

use serde::{Deserialize, Serialize};

use crate::error::{DealflowError, ValidationError};
use crate::id::{RuleId, TemplateId, UserId};
use crate::time::Timestamp;

/// A stored condition → template mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub trigger_event: TriggerEvent,
    pub trigger_condition: TriggerCondition,
    pub template_id: TemplateId,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AutomationRule {
    /// Create a builder for constructing an [`AutomationRule`].
    #[must_use]
    pub fn builder() -> AutomationRuleBuilder {
        AutomationRuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `trigger_event` differs from the condition's type
    ///   ([`ValidationError::TriggerEventMismatch`])
    /// - the condition itself is out of range
    pub fn validate(&self) -> Result<(), DealflowError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let condition_event = self.trigger_condition.event();
        if self.trigger_event != condition_event {
            return Err(ValidationError::TriggerEventMismatch {
                event: self.trigger_event.as_str(),
                condition: condition_event.as_str(),
            }
            .into());
        }
        self.trigger_condition.validate()?;
        Ok(())
    }
}

/// Step-by-step builder for [`AutomationRule`].
#[derive(Debug, Default)]
pub struct AutomationRuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    trigger_condition: Option<TriggerCondition>,
    template_id: Option<TemplateId>,
    is_active: Option<bool>,
    created_by: Option<UserId>,
    created_at: Option<Timestamp>,
}

impl AutomationRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the condition; the trigger event is derived from its type.
    #[must_use]
    pub fn condition(mut self, condition: TriggerCondition) -> Self {
        self.trigger_condition = Some(condition);
        self
    }

    #[must_use]
    pub fn template_id(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    #[must_use]
    pub fn created_by(mut self, user_id: UserId) -> Self {
        self.created_by = Some(user_id);
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Consume the builder, validate, and return an [`AutomationRule`].
    ///
    /// Defaults to an active rule with a status-change wildcard condition.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] if required fields are missing or invalid.
    pub fn build(self) -> Result<AutomationRule, DealflowError> {
        let trigger_condition = self.trigger_condition.unwrap_or(TriggerCondition::StatusChange {
            from_status: None,
            to_status: None,
        });
        let created_at = self.created_at.unwrap_or_else(crate::time::now);
        let rule = AutomationRule {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            trigger_event: trigger_condition.event(),
            trigger_condition,
            template_id: self.template_id.unwrap_or_default(),
            is_active: self.is_active.unwrap_or(true),
            created_by: self.created_by,
            created_at,
            updated_at: created_at,
        };
        rule.validate()?;
        Ok(rule)
    }
}
