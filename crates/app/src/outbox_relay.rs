//! Outbox relay — publishes recorded domain events on the event bus.
//!
//! Entries are marked delivered only after they were published, so an event
//! may be published twice after a crash. The trigger detector deduplicates
//! every event kind, which makes redelivery harmless.

use std::time::Duration;

use tokio::sync::watch;

use dealflow_domain::time::now;

use crate::ports::{EventOutbox, EventPublisher};

/// Default number of entries relayed per poll.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Background loop moving [`EventOutbox`] entries onto an [`EventPublisher`].
pub struct OutboxRelay<O, P> {
    outbox: O,
    publisher: P,
    poll_interval: Duration,
    batch_size: usize,
}

impl<O: EventOutbox, P: EventPublisher> OutboxRelay<O, P> {
    /// Create a new relay polling every `poll_interval`.
    pub fn new(outbox: O, publisher: P, poll_interval: Duration) -> Self {
        Self {
            outbox,
            publisher,
            poll_interval,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Publish one batch of undelivered events in order. Returns how many
    /// were delivered; stops at the first failure so order is kept.
    pub async fn relay_pending(&self) -> usize {
        let entries = match self.outbox.fetch_undelivered(self.batch_size).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, "failed to read event outbox");
                return 0;
            }
        };

        let mut delivered = 0;
        for entry in entries {
            if let Err(err) = self.publisher.publish(entry.event.clone()).await {
                tracing::warn!(seq = entry.seq, error = %err, "failed to publish domain event");
                break;
            }
            if let Err(err) = self.outbox.mark_delivered(entry.seq, now()).await {
                tracing::warn!(seq = entry.seq, error = %err, "failed to mark event delivered");
                break;
            }
            tracing::debug!(seq = entry.seq, event = %entry.event, "domain event relayed");
            delivered += 1;
        }
        delivered
    }

    /// Poll until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(poll_interval = ?self.poll_interval, "outbox relay started");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    while self.relay_pending().await == self.batch_size {}
                }
            }
        }
        tracing::info!("outbox relay stopped");
    }
}
