//! # dealflow-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the port traits defined in `dealflow-app::ports`
//! - Hold the `domain_events` outbox the surrounding application writes to
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `dealflow-app` (for port traits) and `dealflow-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod codec;

pub mod audit_log;
pub mod error;
pub mod event_outbox;
pub mod execution_repo;
pub mod notification_store;
pub mod pool;
pub mod retry_queue;
pub mod rule_repo;
pub mod template_repo;
pub mod transaction_repo;
pub mod workflow_applier;

pub use audit_log::SqliteAuditLog;
pub use event_outbox::SqliteEventOutbox;
pub use execution_repo::SqliteExecutionRepository;
pub use notification_store::SqliteNotificationStore;
pub use pool::{Config, Database};
pub use retry_queue::SqliteRetryQueue;
pub use rule_repo::SqliteRuleRepository;
pub use template_repo::SqliteTemplateRepository;
pub use transaction_repo::{
    SqliteDocumentRepository, SqliteTaskRepository, SqliteTransactionRepository,
};
pub use workflow_applier::SqliteWorkflowApplier;
