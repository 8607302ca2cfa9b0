//! # dealflowd — dealflow automation daemon
//!
//! Composition root that wires the storage adapter into the automation
//! engine and keeps its background loops running.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository implementations (adapters)
//! - Construct the execution coordinator, rule engine and trigger detector,
//!   injecting repositories via port traits
//! - Recover executions interrupted by a previous shutdown
//! - Run the outbox relay, the event listener, the date/time sweeps and the
//!   retry worker
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use dealflow_adapter_storage_sqlite_sqlx::{
    SqliteAuditLog, SqliteDocumentRepository, SqliteEventOutbox, SqliteExecutionRepository,
    SqliteNotificationStore, SqliteRetryQueue, SqliteRuleRepository, SqliteTaskRepository,
    SqliteTemplateRepository, SqliteTransactionRepository, SqliteWorkflowApplier,
};
use dealflow_app::event_bus::InProcessEventBus;
use dealflow_app::execution_coordinator::{CoordinatorPorts, ExecutionCoordinator};
use dealflow_app::outbox_relay::OutboxRelay;
use dealflow_app::retry_worker::RetryWorker;
use dealflow_app::rule_engine::RuleEngine;
use dealflow_app::services::rule_service::RuleService;
use dealflow_app::trigger_detector::TriggerDetector;
use dealflow_domain::context::TriggerData;

use crate::config::Config;

type Coordinator = ExecutionCoordinator<
    SqliteExecutionRepository,
    SqliteTemplateRepository,
    SqliteWorkflowApplier,
    SqliteNotificationStore,
    SqliteAuditLog,
    SqliteRetryQueue,
    SqliteRuleRepository,
    SqliteTransactionRepository,
>;
type Engine = RuleEngine<SqliteRuleRepository, Arc<Coordinator>>;
type Detector = TriggerDetector<
    SqliteTransactionRepository,
    SqliteTaskRepository,
    SqliteDocumentRepository,
    Arc<Engine>,
>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = dealflow_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
        max_connections: config.database.max_connections,
    }
    .build()
    .await
    .context("failed to open database")?;
    let pool = db.pool().clone();

    // Repositories
    let rules = SqliteRuleRepository::new(pool.clone());
    let transactions = SqliteTransactionRepository::new(pool.clone());
    let retries = SqliteRetryQueue::new(pool.clone());
    let outbox = SqliteEventOutbox::new(pool.clone());

    // Use cases
    let coordinator: Arc<Coordinator> = Arc::new(ExecutionCoordinator::new(
        CoordinatorPorts {
            executions: SqliteExecutionRepository::new(pool.clone()),
            templates: SqliteTemplateRepository::new(pool.clone()),
            applier: SqliteWorkflowApplier::new(pool.clone()),
            notifications: SqliteNotificationStore::new(pool.clone()),
            audit: SqliteAuditLog::new(pool.clone()),
            retries: retries.clone(),
            rules: rules.clone(),
            transactions: transactions.clone(),
        },
        config.retry_policy(),
    ));
    let engine: Arc<Engine> = Arc::new(RuleEngine::new(rules.clone(), Arc::clone(&coordinator)));
    let detector: Arc<Detector> = Arc::new(TriggerDetector::new(
        transactions,
        SqliteTaskRepository::new(pool.clone()),
        SqliteDocumentRepository::new(pool),
        engine,
    ));
    let worker = RetryWorker::new(retries, Arc::clone(&coordinator), config.retry_poll_interval())
        .with_lease(config.retry_lease());

    let rule_service = RuleService::new(rules, Arc::clone(&coordinator));
    let active = rule_service
        .list_active()
        .await
        .context("failed to load active rules")?;
    tracing::info!(active_rules = active.len(), "automation rules loaded");

    // nothing is executing yet, so every pending or running execution is a leftover
    let recovered = coordinator
        .recover_interrupted()
        .await
        .context("failed to recover interrupted executions")?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "recovered interrupted executions");
    }

    // events recorded in the outbox reach the detector through this bus
    let event_bus = InProcessEventBus::new(config.automation.event_bus_capacity);
    let relay = OutboxRelay::new(outbox, event_bus.clone(), config.event_poll_interval());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    {
        let detector = Arc::clone(&detector);
        let events = event_bus.subscribe();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            detector.listen(events, shutdown).await;
        }));
    }
    {
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            relay.run(shutdown).await;
        }));
    }
    for (data, interval) in [
        (TriggerData::DateSweep, config.date_sweep_interval()),
        (TriggerData::TimeSweep, config.time_sweep_interval()),
    ] {
        let detector = Arc::clone(&detector);
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            detector.run_sweeps(data, interval, shutdown).await;
        }));
    }
    handles.push(tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    }));

    tracing::info!(
        max_retries = config.automation.max_retries,
        retry_base_delay_ms = config.automation.retry_base_delay_ms,
        "dealflowd running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    // every receiver is held by a task, so a send error means they all exited
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "background task panicked");
        }
    }
    drop(event_bus);
    tracing::info!("dealflowd stopped");
    Ok(())
}
