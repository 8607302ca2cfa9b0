//! # dealflow-app
//!
//! Application layer — automation use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `RuleRepository` — CRUD for automation rules
//!   - `TemplateRepository` — workflow template lookup
//!   - `TransactionRepository`, `TaskRepository`, `DocumentRepository` — read access
//!     to the records automations react to
//!   - `ExecutionRepository` — deduplicated execution records
//!   - `WorkflowApplier` — instantiate a template on a transaction
//!   - `AuditSink`, `NotificationSink` — side channels of every execution
//!   - `RetryQueue` — durable schedule of pending retries
//!   - `EventOutbox` — domain events recorded by the surrounding application
//! - Provide the automation pipeline:
//!   - `TriggerDetector` — events and sweeps → trigger contexts
//!   - `RuleEngine` — active rules × context → matched rules
//!   - `ConditionEvaluator` — pure condition matching
//!   - `ExecutionCoordinator` — execution lifecycle, retries, audit, notification
//!   - `RetryWorker` — resumes due retries
//!   - `OutboxRelay` — publishes recorded domain events on the bus
//! - Provide **in-process infrastructure** (event bus)
//!
//! ## Dependency rule
//! Depends on `dealflow-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod condition_evaluator;
pub mod event_bus;
pub mod execution_coordinator;
pub mod outbox_relay;
pub mod ports;
pub mod retry_worker;
pub mod rule_engine;
pub mod services;
pub mod trigger_detector;

#[cfg(test)]
mod retry_queue;
#[cfg(test)]
mod testing;
