//! Notification — an in-app message for a user about one of their transactions.

use serde::{Deserialize, Serialize};

use crate::id::{NotificationId, TransactionId, UserId};
use crate::time::Timestamp;

/// An unread-by-default message addressed to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub message: String,
    pub is_read: bool,
    pub created_at: Timestamp,
}

impl Notification {
    #[must_use]
    pub fn unread(user_id: UserId, transaction_id: TransactionId, message: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            transaction_id,
            message: message.into(),
            is_read: false,
            created_at: crate::time::now(),
        }
    }
}
