//! In-memory port implementations and a wired-up harness for unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use dealflow_domain::audit::AuditEntry;
use dealflow_domain::context::{TriggerContext, TriggerData};
use dealflow_domain::error::DealflowError;
use dealflow_domain::event::{DomainEvent, OutboxEntry};
use dealflow_domain::execution::{ExecutionStatus, WorkflowExecution};
use dealflow_domain::id::{
    DocumentId, ExecutionId, RuleId, TaskId, TemplateId, TransactionId, UserId, WorkflowInstanceId,
};
use dealflow_domain::notification::Notification;
use dealflow_domain::rule::{AutomationRule, TriggerCondition};
use dealflow_domain::template::{TemplateTask, WorkflowTemplate};
use dealflow_domain::time::{Timestamp, now};
use dealflow_domain::transaction::{Document, Task, TaskPriority, Transaction, TransactionStatus};

use crate::execution_coordinator::{CoordinatorPorts, ExecutionCoordinator, RetryPolicy};
use crate::ports::{
    AuditSink, DocumentRepository, EventOutbox, ExecutionRepository, NotificationSink,
    RuleRepository, TaskRepository, TemplateRepository, TransactionRepository, WorkflowApplier,
};
use crate::retry_queue::InMemoryRetryQueue;
use crate::rule_engine::RuleEngine;
use crate::services::rule_service::RuleService;
use crate::trigger_detector::TriggerDetector;

fn storage_error(message: &str) -> DealflowError {
    DealflowError::Storage(Box::new(std::io::Error::other(message.to_string())))
}

#[derive(Clone, Default)]
pub struct InMemoryRules {
    store: Arc<Mutex<HashMap<RuleId, AutomationRule>>>,
}

impl InMemoryRules {
    pub fn insert(&self, rule: AutomationRule) {
        self.store.lock().unwrap().insert(rule.id, rule);
    }
}

impl RuleRepository for InMemoryRules {
    fn create(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, DealflowError>> + Send {
        self.insert(rule.clone());
        async { Ok(rule) }
    }

    fn get_by_id(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, DealflowError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<AutomationRule>, DealflowError>> + Send {
        let result: Vec<AutomationRule> = self.store.lock().unwrap().values().cloned().collect();
        async { Ok(result) }
    }

    fn list_active(
        &self,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, DealflowError>> + Send {
        let mut result: Vec<AutomationRule> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|rule| rule.is_active)
            .cloned()
            .collect();
        result.sort_by_key(|rule| (rule.created_at, rule.id));
        async { Ok(result) }
    }

    fn update(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, DealflowError>> + Send {
        self.insert(rule.clone());
        async { Ok(rule) }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTemplates {
    store: Arc<Mutex<HashMap<TemplateId, WorkflowTemplate>>>,
}

impl InMemoryTemplates {
    pub fn insert(&self, template: WorkflowTemplate) {
        self.store.lock().unwrap().insert(template.id, template);
    }
}

impl TemplateRepository for InMemoryTemplates {
    fn get_by_id(
        &self,
        id: TemplateId,
    ) -> impl Future<Output = Result<Option<WorkflowTemplate>, DealflowError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTransactions {
    store: Arc<Mutex<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactions {
    pub fn insert(&self, transaction: Transaction) {
        self.store
            .lock()
            .unwrap()
            .insert(transaction.id, transaction);
    }

    pub fn remove(&self, id: TransactionId) {
        self.store.lock().unwrap().remove(&id);
    }
}

impl TransactionRepository for InMemoryTransactions {
    fn get_by_id(
        &self,
        id: TransactionId,
    ) -> impl Future<Output = Result<Option<Transaction>, DealflowError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn list_by_status(
        &self,
        statuses: &[TransactionStatus],
    ) -> impl Future<Output = Result<Vec<Transaction>, DealflowError>> + Send {
        let result: Vec<Transaction> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|tx| statuses.contains(&tx.status))
            .cloned()
            .collect();
        async { Ok(result) }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTasks {
    store: Arc<Mutex<HashMap<TaskId, Task>>>,
}

impl InMemoryTasks {
    pub fn insert(&self, task: Task) {
        self.store.lock().unwrap().insert(task.id, task);
    }
}

impl TaskRepository for InMemoryTasks {
    fn get_by_id(
        &self,
        id: TaskId,
    ) -> impl Future<Output = Result<Option<Task>, DealflowError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDocuments {
    store: Arc<Mutex<HashMap<DocumentId, Document>>>,
}

impl InMemoryDocuments {
    pub fn insert(&self, document: Document) {
        self.store.lock().unwrap().insert(document.id, document);
    }
}

impl DocumentRepository for InMemoryDocuments {
    fn get_by_id(
        &self,
        id: DocumentId,
    ) -> impl Future<Output = Result<Option<Document>, DealflowError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }
}

#[derive(Default)]
struct ExecutionStore {
    rows: HashMap<ExecutionId, WorkflowExecution>,
    history: Vec<(ExecutionId, ExecutionStatus)>,
    fail_next_insert: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryExecutions {
    inner: Arc<Mutex<ExecutionStore>>,
}

impl InMemoryExecutions {
    pub fn get(&self, id: ExecutionId) -> WorkflowExecution {
        self.inner.lock().unwrap().rows[&id].clone()
    }

    pub fn all(&self) -> Vec<WorkflowExecution> {
        let mut rows: Vec<_> = self.inner.lock().unwrap().rows.values().cloned().collect();
        rows.sort_by_key(|e| e.created_at);
        rows
    }

    /// Every status the execution was persisted with, in order.
    pub fn status_history(&self, id: ExecutionId) -> Vec<ExecutionStatus> {
        self.inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|(exec_id, _)| *exec_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn fail_next_insert(&self) {
        self.inner.lock().unwrap().fail_next_insert = true;
    }
}

impl ExecutionRepository for InMemoryExecutions {
    fn insert_if_absent(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<bool, DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = if std::mem::take(&mut inner.fail_next_insert) {
            Err(storage_error("disk full"))
        } else if inner
            .rows
            .values()
            .any(|row| row.dedup_key() == execution.dedup_key())
        {
            Ok(false)
        } else {
            inner.rows.insert(execution.id, execution.clone());
            inner.history.push((execution.id, execution.status));
            Ok(true)
        };
        async { result }
    }

    fn update(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap();
        inner.rows.insert(execution.id, execution.clone());
        inner.history.push((execution.id, execution.status));
        async { Ok(()) }
    }

    fn get_by_id(
        &self,
        id: ExecutionId,
    ) -> impl Future<Output = Result<Option<WorkflowExecution>, DealflowError>> + Send {
        let result = self.inner.lock().unwrap().rows.get(&id).cloned();
        async { Ok(result) }
    }

    fn list_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, DealflowError>> + Send {
        let result: Vec<_> = self
            .all()
            .into_iter()
            .filter(|e| e.transaction_id == transaction_id)
            .collect();
        async { Ok(result) }
    }

    fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, DealflowError>> + Send {
        let result: Vec<_> = self
            .all()
            .into_iter()
            .filter(|e| e.status == status)
            .collect();
        async { Ok(result) }
    }
}

#[derive(Default)]
struct ApplierState {
    applied: Vec<(TransactionId, TemplateId, Option<UserId>)>,
    failures_left: u32,
}

/// Records applications; can be told to fail the next `n` calls.
#[derive(Clone, Default)]
pub struct RecordingApplier {
    inner: Arc<Mutex<ApplierState>>,
}

impl RecordingApplier {
    pub fn applied(&self) -> Vec<(TransactionId, TemplateId, Option<UserId>)> {
        self.inner.lock().unwrap().applied.clone()
    }

    pub fn fail_times(&self, n: u32) {
        self.inner.lock().unwrap().failures_left = n;
    }
}

impl WorkflowApplier for RecordingApplier {
    fn apply_template(
        &self,
        transaction_id: TransactionId,
        template_id: TemplateId,
        applied_by: Option<UserId>,
    ) -> impl Future<Output = Result<WorkflowInstanceId, DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = if inner.failures_left > 0 {
            inner.failures_left -= 1;
            Err(storage_error("workflow service unavailable"))
        } else {
            inner.applied.push((transaction_id, template_id, applied_by));
            Ok(WorkflowInstanceId::new())
        };
        async { result }
    }
}

#[derive(Default)]
struct NotificationState {
    sent: Vec<Notification>,
    failure: Option<String>,
}

#[derive(Clone, Default)]
pub struct RecordingNotifications {
    inner: Arc<Mutex<NotificationState>>,
}

impl RecordingNotifications {
    pub fn sent(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn fail_with(&self, message: &str) {
        self.inner.lock().unwrap().failure = Some(message.to_string());
    }
}

impl NotificationSink for RecordingNotifications {
    fn send(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = match &inner.failure {
            Some(message) => Err(DealflowError::Notification(message.clone())),
            None => {
                inner.sent.push(notification);
                Ok(())
            }
        };
        async { result }
    }
}

#[derive(Default)]
struct AuditState {
    entries: Vec<AuditEntry>,
    failing: bool,
}

#[derive(Clone, Default)]
pub struct RecordingAudit {
    inner: Arc<Mutex<AuditState>>,
}

impl RecordingAudit {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    pub fn fail(&self) {
        self.inner.lock().unwrap().failing = true;
    }
}

impl AuditSink for RecordingAudit {
    fn append(&self, entry: AuditEntry) -> impl Future<Output = Result<(), DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = if inner.failing {
            Err(storage_error("audit table locked"))
        } else {
            inner.entries.push(entry);
            Ok(())
        };
        async { result }
    }
}

#[derive(Default)]
struct OutboxState {
    entries: Vec<(OutboxEntry, Option<Timestamp>)>,
    fail_next_mark: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    inner: Arc<Mutex<OutboxState>>,
}

impl InMemoryOutbox {
    /// Append `event` and return it for comparison.
    pub fn record(&self, event: DomainEvent) -> DomainEvent {
        let mut inner = self.inner.lock().unwrap();
        let seq = i64::try_from(inner.entries.len()).unwrap() + 1;
        inner.entries.push((
            OutboxEntry {
                seq,
                event: event.clone(),
            },
            None,
        ));
        event
    }

    pub fn undelivered(&self) -> Vec<OutboxEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|(_, delivered_at)| delivered_at.is_none())
            .map(|(entry, _)| entry.clone())
            .collect()
    }

    pub fn fail_next_mark(&self) {
        self.inner.lock().unwrap().fail_next_mark = true;
    }
}

impl EventOutbox for InMemoryOutbox {
    fn fetch_undelivered(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<OutboxEntry>, DealflowError>> + Send {
        let result: Vec<OutboxEntry> = self.undelivered().into_iter().take(limit).collect();
        async { Ok(result) }
    }

    fn mark_delivered(
        &self,
        seq: i64,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send {
        let mut inner = self.inner.lock().unwrap();
        let result = if std::mem::take(&mut inner.fail_next_mark) {
            Err(storage_error("outbox locked"))
        } else {
            for (entry, delivered_at) in &mut inner.entries {
                if entry.seq == seq {
                    *delivered_at = Some(at);
                }
            }
            Ok(())
        };
        async { result }
    }
}

pub type TestCoordinator = ExecutionCoordinator<
    InMemoryExecutions,
    InMemoryTemplates,
    RecordingApplier,
    RecordingNotifications,
    RecordingAudit,
    InMemoryRetryQueue,
    InMemoryRules,
    InMemoryTransactions,
>;
pub type TestEngine = RuleEngine<InMemoryRules, Arc<TestCoordinator>>;
pub type TestDetector =
    TriggerDetector<InMemoryTransactions, InMemoryTasks, InMemoryDocuments, Arc<TestEngine>>;

/// Every component wired to shared in-memory ports, plus one template and
/// one open transaction with an assigned agent.
pub struct Harness {
    pub rules: InMemoryRules,
    pub templates: InMemoryTemplates,
    pub transactions: InMemoryTransactions,
    pub tasks: InMemoryTasks,
    pub documents: InMemoryDocuments,
    pub executions: InMemoryExecutions,
    pub applier: RecordingApplier,
    pub notifications: RecordingNotifications,
    pub audit: RecordingAudit,
    pub retries: InMemoryRetryQueue,
    pub coordinator: Arc<TestCoordinator>,
    pub engine: Arc<TestEngine>,
    pub detector: TestDetector,
    pub rule_service: RuleService<InMemoryRules, Arc<TestCoordinator>>,
    pub template: WorkflowTemplate,
    pub transaction: Transaction,
}

impl Harness {
    pub fn new() -> Self {
        let rules = InMemoryRules::default();
        let templates = InMemoryTemplates::default();
        let transactions = InMemoryTransactions::default();
        let tasks = InMemoryTasks::default();
        let documents = InMemoryDocuments::default();
        let executions = InMemoryExecutions::default();
        let applier = RecordingApplier::default();
        let notifications = RecordingNotifications::default();
        let audit = RecordingAudit::default();
        let retries = InMemoryRetryQueue::new();

        let template = WorkflowTemplate::new(
            "Listing Checklist",
            vec![
                TemplateTask {
                    title: "Order photos".into(),
                    priority: TaskPriority::High,
                    due_in_days: Some(2),
                },
                TemplateTask {
                    title: "Publish listing".into(),
                    priority: TaskPriority::Medium,
                    due_in_days: None,
                },
            ],
        );
        templates.insert(template.clone());

        let transaction = Transaction::builder()
            .title("12 Harbor Lane")
            .agent_id(UserId::new())
            .build()
            .unwrap();
        transactions.insert(transaction.clone());

        let coordinator = Arc::new(ExecutionCoordinator::new(
            CoordinatorPorts {
                executions: executions.clone(),
                templates: templates.clone(),
                applier: applier.clone(),
                notifications: notifications.clone(),
                audit: audit.clone(),
                retries: retries.clone(),
                rules: rules.clone(),
                transactions: transactions.clone(),
            },
            RetryPolicy::default(),
        ));
        let engine = Arc::new(RuleEngine::new(rules.clone(), Arc::clone(&coordinator)));
        let detector = TriggerDetector::new(
            transactions.clone(),
            tasks.clone(),
            documents.clone(),
            Arc::clone(&engine),
        );
        let rule_service = RuleService::new(rules.clone(), Arc::clone(&coordinator));

        Self {
            rules,
            templates,
            transactions,
            tasks,
            documents,
            executions,
            applier,
            notifications,
            audit,
            retries,
            coordinator,
            engine,
            detector,
            rule_service,
            template,
            transaction,
        }
    }

    pub fn status_context(&self, old: TransactionStatus, new: TransactionStatus) -> TriggerContext {
        TriggerContext::new(
            self.transaction.clone(),
            TriggerData::StatusChange {
                old_status: old,
                new_status: new,
            },
            None,
            now(),
        )
    }

    /// A "moved to active" rule using the harness template, and a matching context.
    pub fn status_rule_and_context(&self) -> (AutomationRule, TriggerContext) {
        let rule = AutomationRule::builder()
            .name("Kick off listing")
            .condition(TriggerCondition::StatusChange {
                from_status: None,
                to_status: Some(TransactionStatus::Active),
            })
            .template_id(self.template.id)
            .build()
            .unwrap();
        let context = self.status_context(TransactionStatus::Intake, TransactionStatus::Active);
        (rule, context)
    }
}
