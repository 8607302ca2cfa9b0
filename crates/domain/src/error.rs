//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`DealflowError`] via `#[from]` (or an explicit `From` impl for boxed
//! adapter errors).

use crate::execution::ExecutionStatus;

/// Top-level error shared by the domain, application and adapter layers.
#[derive(Debug, thiserror::Error)]
pub enum DealflowError {
    /// A domain invariant was violated.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A referenced record does not exist.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// The backing store failed (connection, query, decoding, …).
    #[error("storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),

    /// A notification could not be delivered.
    #[error("notification error: {0}")]
    Notification(String),

    /// The process stopped while an execution attempt was in flight.
    #[error("execution interrupted before it finished")]
    Interrupted,
}

/// A lookup by identifier returned nothing.
///
/// Displays as `"<Entity> not found: <id>"`, e.g. `"Template not found: …"`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    /// Human readable kind of the missing record (`"Template"`, `"Rule"`, …).
    pub entity: &'static str,
    /// Identifier that was looked up.
    pub id: String,
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("template must define at least one task")]
    NoTemplateTasks,

    #[error("trigger event {event} does not match condition type {condition}")]
    TriggerEventMismatch {
        event: &'static str,
        condition: &'static str,
    },

    #[error("day of week must be within 0..=6, got {0}")]
    InvalidDayOfWeek(u8),

    #[error("time of day must use HH:MM, got {0:?}")]
    InvalidTimeOfDay(String),

    #[error("malformed trigger condition: {0}")]
    MalformedCondition(String),

    #[error("offset of {0} days is out of range")]
    OffsetOutOfRange(u32),

    #[error("invalid execution transition from {from} to {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("unknown {kind} value {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
}
