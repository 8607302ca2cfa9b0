//! Rule repository port — persistence for automation rules.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::id::RuleId;
use dealflow_domain::rule::AutomationRule;

/// Repository for persisting and querying [`AutomationRule`]s.
pub trait RuleRepository: Send + Sync {
    /// Create a new rule in storage.
    fn create(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, DealflowError>> + Send;

    /// Get a rule by its unique identifier.
    fn get_by_id(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, DealflowError>> + Send;

    /// Get all rules, active or not.
    fn get_all(&self) -> impl Future<Output = Result<Vec<AutomationRule>, DealflowError>> + Send;

    /// Get all rules with `is_active = true`, ordered by `created_at` then id.
    ///
    /// Rows whose stored condition fails validation are skipped by the
    /// implementation and never returned.
    fn list_active(
        &self,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, DealflowError>> + Send;

    /// Update an existing rule.
    fn update(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, DealflowError>> + Send;
}
