//! Event bus port — publish/subscribe for domain events.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::event::DomainEvent;

/// Publishes domain events to interested subscribers.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: DomainEvent)
    -> impl Future<Output = Result<(), DealflowError>> + Send;
}

impl<T: EventPublisher> EventPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        event: DomainEvent,
    ) -> impl Future<Output = Result<(), DealflowError>> + Send {
        (**self).publish(event)
    }
}
