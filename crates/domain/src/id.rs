//! Typed identifier newtypes backed by UUIDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a [`Transaction`](crate::transaction::Transaction).
    TransactionId
);

define_id!(
    /// Unique identifier for a [`Task`](crate::transaction::Task).
    TaskId
);

define_id!(
    /// Unique identifier for a [`Document`](crate::transaction::Document).
    DocumentId
);

define_id!(
    /// Unique identifier for a user (agent, coordinator, rule author).
    UserId
);

define_id!(
    /// Unique identifier for an [`AutomationRule`](crate::rule::AutomationRule).
    RuleId
);

define_id!(
    /// Unique identifier for a [`WorkflowTemplate`](crate::template::WorkflowTemplate).
    TemplateId
);

define_id!(
    /// Unique identifier for an applied workflow template instance.
    WorkflowInstanceId
);

define_id!(
    /// Unique identifier for a [`WorkflowExecution`](crate::execution::WorkflowExecution).
    ExecutionId
);

define_id!(
    /// Unique identifier for an [`AuditEntry`](crate::audit::AuditEntry).
    AuditEntryId
);

define_id!(
    /// Unique identifier for a [`Notification`](crate::notification::Notification).
    NotificationId
);
