use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::LifecycleEvent;

/// Envelope wrapping a lifecycle event with the time it was published.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: LifecycleEvent,
}

/// Handle for publishing lifecycle events.
///
/// Cheaply cloneable; one handle per component that needs to publish.
/// Events flow through an async channel to the NotificationRouter. A full
/// or closed channel is logged and swallowed, publication never fails a
/// workflow operation.
#[derive(Clone)]
pub struct NotifierHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl NotifierHandle {
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Publish an event asynchronously.
    pub async fn emit(&self, event: LifecycleEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to publish lifecycle event: {}", e);
        }
    }

    /// Publish without blocking. Returns false if the event was dropped.
    pub fn try_emit(&self, event: LifecycleEvent) -> bool {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to publish lifecycle event: {}", e);
                false
            }
        }
    }
}
