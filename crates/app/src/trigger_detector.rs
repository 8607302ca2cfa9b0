//! Trigger detector — turns application events and periodic sweeps into
//! trigger contexts for the rule engine.
//!
//! Detection is best-effort: a missing record or a processing error is
//! logged and the triggering operation is never failed.

use tokio::sync::{broadcast, watch};

use dealflow_domain::context::{TriggerContext, TriggerData};
use dealflow_domain::event::DomainEvent;
use dealflow_domain::id::{DocumentId, TaskId, TransactionId, UserId};
use dealflow_domain::time::{Timestamp, now};
use dealflow_domain::transaction::{Transaction, TransactionStatus};

use crate::ports::{DocumentRepository, TaskRepository, TransactionRepository};
use crate::rule_engine::{ContextProcessor, ProcessReport};

/// Summary of one sweep over open transactions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Transactions whose context was processed.
    pub transactions: usize,
    /// Matched rules across all transactions.
    pub matched: usize,
    /// Rule executions that returned an error.
    pub failures: usize,
    /// Transactions whose processing aborted entirely.
    pub aborted: usize,
}

/// Entry points the surrounding application calls after its own writes.
pub struct TriggerDetector<X, K, D, P> {
    transactions: X,
    tasks: K,
    documents: D,
    processor: P,
}

impl<X, K, D, P> TriggerDetector<X, K, D, P>
where
    X: TransactionRepository,
    K: TaskRepository,
    D: DocumentRepository,
    P: ContextProcessor,
{
    /// Create a new detector.
    pub fn new(transactions: X, tasks: K, documents: D, processor: P) -> Self {
        Self {
            transactions,
            tasks,
            documents,
            processor,
        }
    }

    /// A transaction moved from `old_status` to `new_status` just now.
    pub async fn detect_status_change(
        &self,
        transaction_id: TransactionId,
        old_status: TransactionStatus,
        new_status: TransactionStatus,
        user_id: Option<UserId>,
    ) -> Option<ProcessReport> {
        self.detect_status_change_at(transaction_id, old_status, new_status, user_id, now())
            .await
    }

    /// A transaction moved from `old_status` to `new_status` at `occurred_at`.
    ///
    /// The change is identified by its occurrence time, so redelivering the
    /// same change never runs a rule twice.
    #[tracing::instrument(skip(self))]
    pub async fn detect_status_change_at(
        &self,
        transaction_id: TransactionId,
        old_status: TransactionStatus,
        new_status: TransactionStatus,
        user_id: Option<UserId>,
        occurred_at: Timestamp,
    ) -> Option<ProcessReport> {
        let transaction = self.load_transaction(transaction_id).await?;
        let data = TriggerData::StatusChange {
            old_status,
            new_status,
        };
        self.dispatch(TriggerContext::new(transaction, data, user_id, occurred_at))
            .await
    }

    /// A task on the transaction was completed.
    #[tracing::instrument(skip(self))]
    pub async fn detect_task_completion(
        &self,
        task_id: TaskId,
        transaction_id: TransactionId,
        user_id: Option<UserId>,
    ) -> Option<ProcessReport> {
        let task = match self.tasks.get_by_id(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!("task not found, skipping automation");
                return None;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load task");
                return None;
            }
        };
        if task.transaction_id != transaction_id {
            tracing::warn!(
                actual = %task.transaction_id,
                "task belongs to another transaction, skipping automation"
            );
            return None;
        }
        let transaction = self.load_transaction(transaction_id).await?;
        let data = TriggerData::TaskCompleted { task };
        self.dispatch(TriggerContext::new(transaction, data, user_id, now()))
            .await
    }

    /// A document was uploaded to the transaction.
    #[tracing::instrument(skip(self))]
    pub async fn detect_document_upload(
        &self,
        document_id: DocumentId,
        transaction_id: TransactionId,
        user_id: Option<UserId>,
    ) -> Option<ProcessReport> {
        let document = match self.documents.get_by_id(document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                tracing::warn!("document not found, skipping automation");
                return None;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load document");
                return None;
            }
        };
        if document.transaction_id != transaction_id {
            tracing::warn!(
                actual = %document.transaction_id,
                "document belongs to another transaction, skipping automation"
            );
            return None;
        }
        let transaction = self.load_transaction(transaction_id).await?;
        let data = TriggerData::DocumentUploaded { document };
        self.dispatch(TriggerContext::new(transaction, data, user_id, now()))
            .await
    }

    /// Evaluate date-offset rules against every open transaction.
    pub async fn detect_date_based_triggers(&self) -> SweepReport {
        self.sweep(TriggerData::DateSweep, now()).await
    }

    /// Evaluate time-based rules against every open transaction.
    pub async fn detect_time_based_triggers(&self) -> SweepReport {
        self.sweep(TriggerData::TimeSweep, now()).await
    }

    /// Run a sweep as if the clock read `at`.
    #[tracing::instrument(skip(self, data), fields(trigger = data.kind()))]
    pub async fn sweep(&self, data: TriggerData, at: Timestamp) -> SweepReport {
        let mut report = SweepReport::default();
        let transactions = match self
            .transactions
            .list_by_status(&TransactionStatus::OPEN)
            .await
        {
            Ok(transactions) => transactions,
            Err(err) => {
                tracing::error!(error = %err, "failed to list open transactions, sweep skipped");
                return report;
            }
        };

        for transaction in transactions {
            let transaction_id = transaction.id;
            let context = TriggerContext::new(transaction, data.clone(), None, at);
            match self.processor.process(&context).await {
                Ok(processed) => {
                    report.transactions += 1;
                    report.matched += processed.matched();
                    report.failures += processed.failures.len();
                }
                Err(err) => {
                    report.aborted += 1;
                    tracing::error!(%transaction_id, error = %err, "sweep processing failed");
                }
            }
        }

        tracing::info!(
            transactions = report.transactions,
            matched = report.matched,
            failures = report.failures,
            aborted = report.aborted,
            "sweep finished"
        );
        report
    }

    /// Route a domain event to the matching detection entry point.
    pub async fn handle_event(&self, event: &DomainEvent) -> Option<ProcessReport> {
        tracing::debug!(%event, "handling domain event");
        match *event {
            DomainEvent::TransactionStatusChanged {
                transaction_id,
                old_status,
                new_status,
                user_id,
                occurred_at,
            } => {
                self.detect_status_change_at(
                    transaction_id,
                    old_status,
                    new_status,
                    user_id,
                    occurred_at,
                )
                .await
            }
            DomainEvent::TaskCompleted {
                task_id,
                transaction_id,
                user_id,
            } => {
                self.detect_task_completion(task_id, transaction_id, user_id)
                    .await
            }
            DomainEvent::DocumentUploaded {
                document_id,
                transaction_id,
                user_id,
            } => {
                self.detect_document_upload(document_id, transaction_id, user_id)
                    .await
            }
        }
    }

    /// Consume events from the bus until `shutdown` flips or the bus closes.
    pub async fn listen(
        &self,
        mut events: broadcast::Receiver<DomainEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("trigger detector listening for events");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        self.handle_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("trigger detector stopped");
    }

    /// Run a sweep every `interval` until `shutdown` flips.
    pub async fn run_sweeps(
        &self,
        data: TriggerData,
        interval: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.sweep(data.clone(), now()).await;
                }
            }
        }
    }

    async fn load_transaction(&self, transaction_id: TransactionId) -> Option<Transaction> {
        match self.transactions.get_by_id(transaction_id).await {
            Ok(Some(transaction)) => Some(transaction),
            Ok(None) => {
                tracing::warn!(%transaction_id, "transaction not found, skipping automation");
                None
            }
            Err(err) => {
                tracing::error!(%transaction_id, error = %err, "failed to load transaction");
                None
            }
        }
    }

    async fn dispatch(&self, context: TriggerContext) -> Option<ProcessReport> {
        match self.processor.process(&context).await {
            Ok(report) => {
                if !report.failures.is_empty() {
                    tracing::warn!(failures = report.failures.len(), "some rules failed");
                }
                Some(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "rule processing aborted");
                None
            }
        }
    }
}
