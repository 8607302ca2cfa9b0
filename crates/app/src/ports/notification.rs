//! Notification sink port.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::notification::Notification;

/// Delivers in-app [`Notification`]s.
pub trait NotificationSink: Send + Sync {
    /// Store a notification for its recipient.
    fn send(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send;
}
