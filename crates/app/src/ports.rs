//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the automation core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.
//!
//! Every port is `Send + Sync` so use cases holding them can be shared
//! across tokio tasks.

pub mod audit;
pub mod event_bus;
pub mod event_outbox;
pub mod execution_repo;
pub mod notification;
pub mod retry_queue;
pub mod rule_repo;
pub mod template_repo;
pub mod transaction_repo;
pub mod workflow;

pub use audit::AuditSink;
pub use event_bus::EventPublisher;
pub use event_outbox::EventOutbox;
pub use execution_repo::ExecutionRepository;
pub use notification::NotificationSink;
pub use retry_queue::RetryQueue;
pub use rule_repo::RuleRepository;
pub use template_repo::TemplateRepository;
pub use transaction_repo::{DocumentRepository, TaskRepository, TransactionRepository};
pub use workflow::WorkflowApplier;
