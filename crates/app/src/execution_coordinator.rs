//! Execution coordinator — owns the workflow execution lifecycle.
//!
//! For every matched rule the coordinator records a [`WorkflowExecution`],
//! applies the rule's template, notifies the transaction's agent and writes
//! the audit trail. Failed attempts are retried through the durable
//! [`RetryQueue`] with linear backoff until the retry budget is spent.
//!
//! A queue entry is removed only once its retry settles. Executions left
//! behind by a crash are picked up again: `retrying` executions without an
//! entry are requeued, and `pending`/`running` ones found at startup are
//! routed into the retry path as interrupted attempts.

use std::future::Future;
use std::time::Duration;

use dealflow_domain::audit::{AuditAction, AuditEntry};
use dealflow_domain::context::TriggerContext;
use dealflow_domain::error::{DealflowError, NotFoundError};
use dealflow_domain::execution::{ExecutionStatus, PendingRetry, WorkflowExecution};
use dealflow_domain::id::{ExecutionId, RuleId, TransactionId, WorkflowInstanceId};
use dealflow_domain::notification::Notification;
use dealflow_domain::rule::AutomationRule;
use dealflow_domain::template::WorkflowTemplate;
use dealflow_domain::time::{Timestamp, now};

use crate::ports::{
    AuditSink, ExecutionRepository, NotificationSink, RetryQueue, RuleRepository,
    TemplateRepository, TransactionRepository, WorkflowApplier,
};

/// Retry budget and backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay unit; retry `n` waits `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: 1×, 2×, 3× the base delay.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.base_delay.saturating_mul(retry_count)
    }
}

/// What happened to one rule dispatch or retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed {
        execution_id: ExecutionId,
        instance_id: WorkflowInstanceId,
    },
    RetryScheduled {
        execution_id: ExecutionId,
        retry_count: u32,
        due_at: Timestamp,
    },
    Failed {
        execution_id: ExecutionId,
        error: String,
    },
    /// An execution already exists for this occurrence.
    Duplicate {
        rule_id: RuleId,
        transaction_id: TransactionId,
    },
    /// The pending retry was dropped because its rule is inactive.
    Cancelled { execution_id: ExecutionId },
    /// A queued retry whose execution had already left `retrying`.
    Skipped { execution_id: ExecutionId },
}

/// Runs matched rules. Implemented by [`ExecutionCoordinator`].
pub trait RuleExecutor: Send + Sync {
    fn execute_rule(
        &self,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> impl Future<Output = Result<ExecutionOutcome, DealflowError>> + Send;
}

impl<T: RuleExecutor> RuleExecutor for std::sync::Arc<T> {
    fn execute_rule(
        &self,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> impl Future<Output = Result<ExecutionOutcome, DealflowError>> + Send {
        (**self).execute_rule(rule, context)
    }
}

/// Resumes, cancels and reconciles queued retries. Implemented by
/// [`ExecutionCoordinator`].
pub trait RetryHandler: Send + Sync {
    fn retry_execution(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<ExecutionOutcome, DealflowError>> + Send;

    fn cancel_retries_for_rule(
        &self,
        rule_id: RuleId,
    ) -> impl Future<Output = Result<Vec<ExecutionId>, DealflowError>> + Send;

    fn requeue_orphaned_retries(
        &self,
        at: Timestamp,
    ) -> impl Future<Output = Result<usize, DealflowError>> + Send;
}

impl<T: RetryHandler> RetryHandler for std::sync::Arc<T> {
    fn retry_execution(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<ExecutionOutcome, DealflowError>> + Send {
        (**self).retry_execution(execution_id)
    }

    fn cancel_retries_for_rule(
        &self,
        rule_id: RuleId,
    ) -> impl Future<Output = Result<Vec<ExecutionId>, DealflowError>> + Send {
        (**self).cancel_retries_for_rule(rule_id)
    }

    fn requeue_orphaned_retries(
        &self,
        at: Timestamp,
    ) -> impl Future<Output = Result<usize, DealflowError>> + Send {
        (**self).requeue_orphaned_retries(at)
    }
}

/// Everything the coordinator talks to.
pub struct CoordinatorPorts<E, T, W, N, A, Q, R, X> {
    pub executions: E,
    pub templates: T,
    pub applier: W,
    pub notifications: N,
    pub audit: A,
    pub retries: Q,
    pub rules: R,
    pub transactions: X,
}

/// Drives [`WorkflowExecution`]s through their state machine.
pub struct ExecutionCoordinator<E, T, W, N, A, Q, R, X> {
    ports: CoordinatorPorts<E, T, W, N, A, Q, R, X>,
    policy: RetryPolicy,
}

impl<E, T, W, N, A, Q, R, X> ExecutionCoordinator<E, T, W, N, A, Q, R, X>
where
    E: ExecutionRepository,
    T: TemplateRepository,
    W: WorkflowApplier,
    N: NotificationSink,
    A: AuditSink,
    Q: RetryQueue,
    R: RuleRepository,
    X: TransactionRepository,
{
    /// Create a new coordinator.
    pub fn new(ports: CoordinatorPorts<E, T, W, N, A, Q, R, X>, policy: RetryPolicy) -> Self {
        Self { ports, policy }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record and run a new execution of `rule` for `context`.
    ///
    /// Returns [`ExecutionOutcome::Duplicate`] without side effects when an
    /// execution already exists for the same rule, transaction and
    /// occurrence. Failures while running the attempt are turned into a
    /// scheduled retry or a terminal failure rather than an error.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the execution row cannot be inserted or
    /// its state cannot be persisted.
    #[tracing::instrument(skip_all, fields(rule_id = %rule.id, transaction_id = %context.transaction_id))]
    pub async fn execute_rule(
        &self,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> Result<ExecutionOutcome, DealflowError> {
        let execution = WorkflowExecution::pending(rule, context, now());
        if !self.ports.executions.insert_if_absent(&execution).await? {
            tracing::info!(
                fingerprint = %execution.metadata.trigger_fingerprint,
                "occurrence already executed, skipping duplicate"
            );
            return Ok(ExecutionOutcome::Duplicate {
                rule_id: rule.id,
                transaction_id: context.transaction_id,
            });
        }
        tracing::info!(execution_id = %execution.id, rule_name = %rule.name, "execution created");
        self.run(execution, rule, context).await
    }

    /// Resume an execution waiting in `retrying`.
    ///
    /// The rule and transaction are reloaded so the retry sees current data.
    /// An inactive rule cancels the retry; a missing rule or transaction
    /// counts as a failed attempt. The queue entry is removed once the retry
    /// settles; on a storage error it stays leased and is handed out again.
    ///
    /// # Errors
    ///
    /// Returns [`DealflowError::NotFound`] when the execution itself is gone,
    /// or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn retry_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionOutcome, DealflowError> {
        let result = self.resume(execution_id).await;
        let settled = match &result {
            Ok(outcome) => !matches!(outcome, ExecutionOutcome::RetryScheduled { .. }),
            Err(err) => matches!(err, DealflowError::NotFound(_)),
        };
        if settled {
            self.release(execution_id).await;
        }
        result
    }

    async fn resume(&self, execution_id: ExecutionId) -> Result<ExecutionOutcome, DealflowError> {
        let Some(execution) = self.ports.executions.get_by_id(execution_id).await? else {
            tracing::warn!("queued retry refers to a missing execution");
            return Err(NotFoundError {
                entity: "Execution",
                id: execution_id.to_string(),
            }
            .into());
        };
        if execution.status != ExecutionStatus::Retrying {
            tracing::info!(status = %execution.status, "execution no longer awaiting retry");
            return Ok(ExecutionOutcome::Skipped { execution_id });
        }

        let Some(rule) = self.ports.rules.get_by_id(execution.rule_id).await? else {
            let err = NotFoundError {
                entity: "Rule",
                id: execution.rule_id.to_string(),
            };
            return self.fail_attempt(execution, err.into()).await;
        };
        if !rule.is_active {
            return self.cancel(execution, &rule).await;
        }

        let Some(transaction) = self
            .ports
            .transactions
            .get_by_id(execution.transaction_id)
            .await?
        else {
            let err = NotFoundError {
                entity: "Transaction",
                id: execution.transaction_id.to_string(),
            };
            return self.fail_attempt(execution, err.into()).await;
        };

        let mut context = execution.metadata.trigger_context.clone();
        context.transaction = transaction;
        tracing::info!(retry_count = execution.retry_count, "retrying execution");
        self.run(execution, &rule, &context).await
    }

    /// Drop every queued retry of `rule_id` and mark those executions failed.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the queue or the execution store.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_retries_for_rule(
        &self,
        rule_id: RuleId,
    ) -> Result<Vec<ExecutionId>, DealflowError> {
        let cancelled = self.ports.retries.cancel_for_rule(rule_id).await?;
        for execution_id in &cancelled {
            let Some(mut execution) = self.ports.executions.get_by_id(*execution_id).await? else {
                continue;
            };
            if execution.status != ExecutionStatus::Retrying {
                continue;
            }
            let message = format!("Rule {rule_id} deactivated; pending retry cancelled");
            execution.fail(message.clone(), now())?;
            self.ports.executions.update(&execution).await?;
            self.record(AuditEntry::failure(
                execution.id,
                AuditAction::RetryCancelled,
                serde_json::json!({
                    "rule_id": rule_id,
                    "retry_count": execution.retry_count,
                    "reason": message,
                }),
            ))
            .await;
        }
        if !cancelled.is_empty() {
            tracing::info!(count = cancelled.len(), "cancelled pending retries");
        }
        Ok(cancelled)
    }

    /// Queue a retry for every `retrying` execution that has no queue entry,
    /// due one backoff step after `at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the queue or the execution store.
    pub async fn requeue_orphaned_retries(&self, at: Timestamp) -> Result<usize, DealflowError> {
        let waiting = self
            .ports
            .executions
            .list_by_status(ExecutionStatus::Retrying)
            .await?;
        let mut requeued = 0;
        for execution in waiting {
            if self.ports.retries.contains(execution.id).await? {
                continue;
            }
            let due_at = due_after(at, self.policy.delay_for(execution.retry_count));
            self.ports
                .retries
                .enqueue(PendingRetry {
                    execution_id: execution.id,
                    rule_id: execution.rule_id,
                    attempt: execution.retry_count,
                    due_at,
                })
                .await?;
            tracing::warn!(execution_id = %execution.id, "retrying execution had no queued retry, requeued");
            requeued += 1;
        }
        Ok(requeued)
    }

    /// Route every `pending` or `running` execution into the retry path as
    /// an interrupted attempt.
    ///
    /// Only call this before any rule starts executing, typically at
    /// startup: every execution still in flight is assumed dead. An
    /// interrupted attempt may already have applied its template, so the
    /// retry gives at-least-once delivery.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the execution store.
    pub async fn recover_interrupted(&self) -> Result<Vec<ExecutionOutcome>, DealflowError> {
        let mut outcomes = Vec::new();
        for status in [ExecutionStatus::Pending, ExecutionStatus::Running] {
            for mut execution in self.ports.executions.list_by_status(status).await? {
                tracing::warn!(execution_id = %execution.id, %status, "recovering interrupted execution");
                if execution.status == ExecutionStatus::Pending {
                    execution.start()?;
                    self.ports.executions.update(&execution).await?;
                }
                let outcome = self
                    .handle_execution_error(execution, &DealflowError::Interrupted)
                    .await?;
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    async fn run(
        &self,
        mut execution: WorkflowExecution,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> Result<ExecutionOutcome, DealflowError> {
        let (template, instance_id) = match self.attempt(&mut execution, rule, context).await {
            Ok(applied) => applied,
            Err(err) => return self.handle_execution_error(execution, &err).await,
        };

        self.notify(&execution, rule, &template, context).await;

        execution.complete(now())?;
        self.ports.executions.update(&execution).await?;
        self.record(AuditEntry::success(
            execution.id,
            AuditAction::WorkflowApplied,
            serde_json::json!({
                "rule_id": rule.id,
                "rule_name": rule.name,
                "template_id": template.id,
                "transaction_id": context.transaction_id,
                "workflow_instance_id": instance_id,
                "retry_count": execution.retry_count,
            }),
        ))
        .await;
        tracing::info!(execution_id = %execution.id, %instance_id, "workflow applied");

        Ok(ExecutionOutcome::Completed {
            execution_id: execution.id,
            instance_id,
        })
    }

    async fn attempt(
        &self,
        execution: &mut WorkflowExecution,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> Result<(WorkflowTemplate, WorkflowInstanceId), DealflowError> {
        execution.start()?;
        self.ports.executions.update(execution).await?;

        let template = self
            .ports
            .templates
            .get_by_id(rule.template_id)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "Template",
                id: rule.template_id.to_string(),
            })?;

        let instance_id = self
            .ports
            .applier
            .apply_template(context.transaction_id, template.id, context.user_id)
            .await?;
        Ok((template, instance_id))
    }

    /// Count a retry that could not even start as a failed attempt.
    async fn fail_attempt(
        &self,
        mut execution: WorkflowExecution,
        error: DealflowError,
    ) -> Result<ExecutionOutcome, DealflowError> {
        execution.start()?;
        self.ports.executions.update(&execution).await?;
        self.handle_execution_error(execution, &error).await
    }

    async fn handle_execution_error(
        &self,
        mut execution: WorkflowExecution,
        error: &DealflowError,
    ) -> Result<ExecutionOutcome, DealflowError> {
        let message = error.to_string();

        if execution.retry_count < self.policy.max_retries {
            let retry_count = execution.schedule_retry(message.clone())?;
            let delay = self.policy.delay_for(retry_count);
            let due_at = due_after(now(), delay);
            self.ports.executions.update(&execution).await?;

            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(
                execution_id = %execution.id,
                retry_count,
                delay_ms,
                error = %message,
                "execution attempt failed, retry scheduled"
            );
            self.record(AuditEntry::failure(
                execution.id,
                AuditAction::RetryScheduled,
                serde_json::json!({
                    "retry_count": retry_count,
                    "delay_ms": delay_ms,
                    "error": message,
                }),
            ))
            .await;

            let queued = self
                .ports
                .retries
                .enqueue(PendingRetry {
                    execution_id: execution.id,
                    rule_id: execution.rule_id,
                    attempt: retry_count,
                    due_at,
                })
                .await;
            if let Err(err) = queued {
                // the execution is already retrying, reconciliation requeues it
                tracing::error!(execution_id = %execution.id, error = %err, "failed to queue retry");
            }

            return Ok(ExecutionOutcome::RetryScheduled {
                execution_id: execution.id,
                retry_count,
                due_at,
            });
        }

        execution.fail(message.clone(), now())?;
        self.ports.executions.update(&execution).await?;
        tracing::error!(
            execution_id = %execution.id,
            retry_count = execution.retry_count,
            error = %message,
            "execution failed permanently"
        );
        self.record(AuditEntry::failure(
            execution.id,
            AuditAction::ExecutionFailed,
            serde_json::json!({
                "retry_count": execution.retry_count,
                "error": message,
            }),
        ))
        .await;

        Ok(ExecutionOutcome::Failed {
            execution_id: execution.id,
            error: message,
        })
    }

    async fn cancel(
        &self,
        mut execution: WorkflowExecution,
        rule: &AutomationRule,
    ) -> Result<ExecutionOutcome, DealflowError> {
        let message = format!("Rule {} is inactive; pending retry cancelled", rule.id);
        execution.fail(message.clone(), now())?;
        self.ports.executions.update(&execution).await?;
        tracing::info!(execution_id = %execution.id, "rule inactive, retry cancelled");
        self.record(AuditEntry::failure(
            execution.id,
            AuditAction::RetryCancelled,
            serde_json::json!({
                "rule_id": rule.id,
                "retry_count": execution.retry_count,
                "reason": message,
            }),
        ))
        .await;
        Ok(ExecutionOutcome::Cancelled {
            execution_id: execution.id,
        })
    }

    /// Tell the transaction's agent about the applied workflow.
    async fn notify(
        &self,
        execution: &WorkflowExecution,
        rule: &AutomationRule,
        template: &WorkflowTemplate,
        context: &TriggerContext,
    ) {
        let Some(agent_id) = context.transaction.agent_id else {
            tracing::debug!("transaction has no agent, no notification sent");
            return;
        };
        let message = format!(
            "Workflow \"{}\" was applied to \"{}\" by automation rule \"{}\"",
            template.name, context.transaction.title, rule.name
        );
        let notification = Notification::unread(agent_id, context.transaction_id, message);
        if let Err(err) = self.ports.notifications.send(notification).await {
            tracing::warn!(
                execution_id = %execution.id,
                user_id = %agent_id,
                error = %err,
                "failed to send automation notification"
            );
            self.record(AuditEntry::failure(
                execution.id,
                AuditAction::NotificationSent,
                serde_json::json!({
                    "user_id": agent_id,
                    "error": err.to_string(),
                }),
            ))
            .await;
        }
    }

    async fn release(&self, execution_id: ExecutionId) {
        if let Err(err) = self.ports.retries.remove(execution_id).await {
            tracing::warn!(%execution_id, error = %err, "failed to remove settled retry");
        }
    }

    async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        let execution_id = entry.execution_id;
        if let Err(err) = self.ports.audit.append(entry).await {
            tracing::warn!(%execution_id, %action, error = %err, "failed to write audit entry");
        }
    }
}

fn due_after(from: Timestamp, delay: Duration) -> Timestamp {
    chrono::TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(from)
}

impl<E, T, W, N, A, Q, R, X> RuleExecutor for ExecutionCoordinator<E, T, W, N, A, Q, R, X>
where
    E: ExecutionRepository,
    T: TemplateRepository,
    W: WorkflowApplier,
    N: NotificationSink,
    A: AuditSink,
    Q: RetryQueue,
    R: RuleRepository,
    X: TransactionRepository,
{
    fn execute_rule(
        &self,
        rule: &AutomationRule,
        context: &TriggerContext,
    ) -> impl Future<Output = Result<ExecutionOutcome, DealflowError>> + Send {
        ExecutionCoordinator::execute_rule(self, rule, context)
    }
}

impl<E, T, W, N, A, Q, R, X> RetryHandler for ExecutionCoordinator<E, T, W, N, A, Q, R, X>
where
    E: ExecutionRepository,
    T: TemplateRepository,
    W: WorkflowApplier,
    N: NotificationSink,
    A: AuditSink,
    Q: RetryQueue,
    R: RuleRepository,
    X: TransactionRepository,
{
    fn retry_execution(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<ExecutionOutcome, DealflowError>> + Send {
        ExecutionCoordinator::retry_execution(self, execution_id)
    }

    fn cancel_retries_for_rule(
        &self,
        rule_id: RuleId,
    ) -> impl Future<Output = Result<Vec<ExecutionId>, DealflowError>> + Send {
        ExecutionCoordinator::cancel_retries_for_rule(self, rule_id)
    }

    fn requeue_orphaned_retries(
        &self,
        at: Timestamp,
    ) -> impl Future<Output = Result<usize, DealflowError>> + Send {
        ExecutionCoordinator::requeue_orphaned_retries(self, at)
    }
}
