//! Rule service — use-cases for managing automation rules.

use dealflow_domain::error::{DealflowError, NotFoundError};
use dealflow_domain::id::RuleId;
use dealflow_domain::rule::AutomationRule;
use dealflow_domain::time::now;

use crate::execution_coordinator::RetryHandler;
use crate::ports::RuleRepository;

/// Application service for automation rule CRUD operations.
pub struct RuleService<R, H> {
    repo: R,
    retries: H,
}

impl<R: RuleRepository, H: RetryHandler> RuleService<R, H> {
    /// Create a new service backed by the given repository.
    ///
    /// `retries` is used to cancel pending retries when a rule is switched off.
    pub fn new(repo: R, retries: H) -> Self {
        Self { repo, retries }
    }

    /// Create a new rule after validating domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] if invariants fail, or a
    /// storage error propagated from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, rule: AutomationRule) -> Result<AutomationRule, DealflowError> {
        rule.validate()?;
        warn_if_unconstrained(&rule);
        self.repo.create(rule).await
    }

    /// Look up a rule by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::NotFound`] when no rule with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_rule(&self, id: RuleId) -> Result<AutomationRule, DealflowError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Rule",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List all rules.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_rules(&self) -> Result<Vec<AutomationRule>, DealflowError> {
        self.repo.get_all().await
    }

    /// Get all active rules.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_active(&self) -> Result<Vec<AutomationRule>, DealflowError> {
        self.repo.list_active().await
    }

    /// Update an existing rule.
    ///
    /// Turning a rule off through an update cancels its pending retries just
    /// like [`deactivate_rule`](Self::deactivate_rule).
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::Validation`] if invariants fail, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, mut rule: AutomationRule) -> Result<AutomationRule, DealflowError> {
        rule.validate()?;
        warn_if_unconstrained(&rule);
        rule.updated_at = now();
        let updated = self.repo.update(rule).await?;
        if !updated.is_active {
            self.retries.cancel_retries_for_rule(updated.id).await?;
        }
        Ok(updated)
    }

    /// Switch a rule off and cancel its queued retries.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::NotFound`] when the rule does not exist, or
    /// a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_rule(&self, id: RuleId) -> Result<AutomationRule, DealflowError> {
        self.set_active(id, false).await
    }

    /// Switch a rule back on.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::NotFound`] when the rule does not exist, or
    /// a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn activate_rule(&self, id: RuleId) -> Result<AutomationRule, DealflowError> {
        self.set_active(id, true).await
    }

    async fn set_active(&self, id: RuleId, is_active: bool) -> Result<AutomationRule, DealflowError> {
        let mut rule = self.get_rule(id).await?;
        if rule.is_active == is_active {
            return Ok(rule);
        }
        rule.is_active = is_active;
        self.update_rule(rule).await
    }
}

fn warn_if_unconstrained(rule: &AutomationRule) {
    if rule.is_active && rule.trigger_condition.is_unconstrained_time_based() {
        tracing::warn!(
            rule_id = %rule.id,
            rule_name = %rule.name,
            "time-based rule has no day or time constraint and will fire on every time sweep"
        );
    }
}
