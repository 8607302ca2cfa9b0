//! Rule engine — matches a trigger context against every active rule.
//!
//! Each matched rule is handed to a [`RuleExecutor`]. A failure in one rule
//! is recorded in the [`ProcessReport`] and never stops the others.

use std::future::Future;

use dealflow_domain::context::TriggerContext;
use dealflow_domain::error::DealflowError;
use dealflow_domain::id::RuleId;

use crate::condition_evaluator::ConditionEvaluator;
use crate::execution_coordinator::{ExecutionOutcome, RuleExecutor};
use crate::ports::RuleRepository;

/// A matched rule and what its execution produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleExecution {
    pub rule_id: RuleId,
    pub outcome: ExecutionOutcome,
}

/// A matched rule whose execution returned an error.
#[derive(Debug)]
pub struct RuleFailure {
    pub rule_id: RuleId,
    pub error: DealflowError,
}

/// Result of processing one trigger context.
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Rules whose trigger event applied to the context.
    pub evaluated: usize,
    pub executions: Vec<RuleExecution>,
    pub failures: Vec<RuleFailure>,
}

impl ProcessReport {
    /// Number of rules whose condition matched.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.executions.len() + self.failures.len()
    }
}

/// Something that can process a trigger context. Implemented by [`RuleEngine`].
pub trait ContextProcessor: Send + Sync {
    fn process(
        &self,
        context: &TriggerContext,
    ) -> impl Future<Output = Result<ProcessReport, DealflowError>> + Send;
}

impl<T: ContextProcessor> ContextProcessor for std::sync::Arc<T> {
    fn process(
        &self,
        context: &TriggerContext,
    ) -> impl Future<Output = Result<ProcessReport, DealflowError>> + Send {
        (**self).process(context)
    }
}

/// Loads active rules, evaluates their conditions and dispatches matches.
pub struct RuleEngine<R, X> {
    rules: R,
    executor: X,
    evaluator: ConditionEvaluator,
}

impl<R: RuleRepository, X: RuleExecutor> RuleEngine<R, X> {
    /// Create a new engine.
    pub fn new(rules: R, executor: X) -> Self {
        Self {
            rules,
            executor,
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// Evaluate every active rule against `context`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the active rules cannot be loaded. Errors
    /// from individual rule executions are collected in the report instead.
    #[tracing::instrument(
        skip_all,
        fields(transaction_id = %context.transaction_id, trigger = context.data.kind())
    )]
    pub async fn process(&self, context: &TriggerContext) -> Result<ProcessReport, DealflowError> {
        let rules = self.rules.list_active().await?;
        let mut report = ProcessReport::default();

        for rule in &rules {
            if !rule.is_active || !rule.trigger_event.accepts(&context.data) {
                continue;
            }
            report.evaluated += 1;

            if !self.evaluator.evaluate(&rule.trigger_condition, context) {
                tracing::trace!(rule_id = %rule.id, "condition not met");
                continue;
            }
            tracing::debug!(rule_id = %rule.id, rule_name = %rule.name, "rule matched");

            match self.executor.execute_rule(rule, context).await {
                Ok(outcome) => report.executions.push(RuleExecution {
                    rule_id: rule.id,
                    outcome,
                }),
                Err(err) => {
                    tracing::error!(rule_id = %rule.id, error = %err, "rule execution failed");
                    report.failures.push(RuleFailure {
                        rule_id: rule.id,
                        error: err,
                    });
                }
            }
        }

        tracing::debug!(
            evaluated = report.evaluated,
            matched = report.matched(),
            "trigger context processed"
        );
        Ok(report)
    }
}

impl<R: RuleRepository, X: RuleExecutor> ContextProcessor for RuleEngine<R, X> {
    fn process(
        &self,
        context: &TriggerContext,
    ) -> impl Future<Output = Result<ProcessReport, DealflowError>> + Send {
        RuleEngine::process(self, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use dealflow_domain::context::TriggerData;
    use dealflow_domain::rule::{AutomationRule, TriggerCondition};
    use dealflow_domain::transaction::TransactionStatus;

    fn status_rule(h: &Harness, name: &str, to: TransactionStatus) -> AutomationRule {
        AutomationRule::builder()
            .name(name)
            .condition(TriggerCondition::StatusChange {
                from_status: None,
                to_status: Some(to),
            })
            .template_id(h.template.id)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_execute_only_matching_rules() {
        let h = Harness::new();
        h.rules.insert(status_rule(&h, "To active", TransactionStatus::Active));
        h.rules.insert(status_rule(&h, "To closed", TransactionStatus::Closed));
        let ctx = h.status_context(TransactionStatus::Intake, TransactionStatus::Active);

        let report = h.engine.process(&ctx).await.unwrap();

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.executions.len(), 1);
        assert!(matches!(
            report.executions[0].outcome,
            ExecutionOutcome::Completed { .. }
        ));
        assert_eq!(h.applier.applied().len(), 1);
    }

    #[tokio::test]
    async fn should_ignore_inactive_rules() {
        let h = Harness::new();
        let mut rule = status_rule(&h, "Off", TransactionStatus::Active);
        rule.is_active = false;
        h.rules.insert(rule);
        let ctx = h.status_context(TransactionStatus::Intake, TransactionStatus::Active);

        let report = h.engine.process(&ctx).await.unwrap();

        assert_eq!(report.evaluated, 0);
        assert!(h.executions.all().is_empty());
    }

    #[tokio::test]
    async fn should_skip_rules_for_other_trigger_events() {
        let h = Harness::new();
        h.rules.insert(
            AutomationRule::builder()
                .name("Docs")
                .condition(TriggerCondition::DocumentUploaded {
                    document_type: None,
                })
                .template_id(h.template.id)
                .build()
                .unwrap(),
        );
        let ctx = h.status_context(TransactionStatus::Intake, TransactionStatus::Active);

        let report = h.engine.process(&ctx).await.unwrap();

        assert_eq!(report.evaluated, 0);
        assert_eq!(report.matched(), 0);
    }

    #[tokio::test]
    async fn should_keep_processing_after_one_rule_errors() {
        let h = Harness::new();
        h.rules.insert(status_rule(&h, "First", TransactionStatus::Active));
        h.rules.insert(status_rule(&h, "Second", TransactionStatus::Active));
        h.executions.fail_next_insert();
        let ctx = h.status_context(TransactionStatus::Intake, TransactionStatus::Active);

        let report = h.engine.process(&ctx).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.executions.len(), 1);
        assert_eq!(h.applier.applied().len(), 1);
    }

    #[tokio::test]
    async fn should_dispatch_rules_in_creation_order() {
        let h = Harness::new();
        let base = dealflow_domain::time::now();
        let mut later = status_rule(&h, "Later", TransactionStatus::Active);
        later.created_at = base;
        let mut earlier = status_rule(&h, "Earlier", TransactionStatus::Active);
        earlier.created_at = base - chrono::TimeDelta::minutes(5);
        h.rules.insert(later.clone());
        h.rules.insert(earlier.clone());
        let ctx = h.status_context(TransactionStatus::Intake, TransactionStatus::Active);

        let report = h.engine.process(&ctx).await.unwrap();

        let order: Vec<_> = report.executions.iter().map(|e| e.rule_id).collect();
        assert_eq!(order, vec![earlier.id, later.id]);
    }

    #[tokio::test]
    async fn should_report_duplicate_on_replayed_context() {
        let h = Harness::new();
        h.rules.insert(status_rule(&h, "Once", TransactionStatus::Active));
        let ctx = h.status_context(TransactionStatus::Intake, TransactionStatus::Active);

        h.engine.process(&ctx).await.unwrap();
        let replay = h.engine.process(&ctx).await.unwrap();

        assert!(matches!(
            replay.executions[0].outcome,
            ExecutionOutcome::Duplicate { .. }
        ));
        assert_eq!(h.executions.all().len(), 1);
    }

    #[tokio::test]
    async fn should_evaluate_date_rules_only_on_date_sweep() {
        let h = Harness::new();
        h.rules.insert(
            AutomationRule::builder()
                .name("Day zero")
                .condition(TriggerCondition::ContractDateOffset {
                    offset_days: 0,
                    offset_type: dealflow_domain::rule::OffsetDirection::After,
                })
                .template_id(h.template.id)
                .build()
                .unwrap(),
        );
        let tx = h.transaction.clone();
        let occurred_at = tx.created_at;

        let time_ctx = TriggerContext::new(tx.clone(), TriggerData::TimeSweep, None, occurred_at);
        let date_ctx = TriggerContext::new(tx, TriggerData::DateSweep, None, occurred_at);

        assert_eq!(h.engine.process(&time_ctx).await.unwrap().evaluated, 0);
        assert_eq!(h.engine.process(&date_ctx).await.unwrap().matched(), 1);
    }
}
