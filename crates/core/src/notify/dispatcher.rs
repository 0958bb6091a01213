use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::{EventEnvelope, NotifierHandle};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Destination for lifecycle events (mail gateway, webhook, dashboard feed).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, envelope: &EventEnvelope) -> Result<(), NotifyError>;
}

/// Background task that drains the event channel into a sink.
///
/// Delivery failures are logged and skipped; the router never stops on a
/// bad event.
pub struct NotificationRouter {
    rx: mpsc::Receiver<EventEnvelope>,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationRouter {
    pub fn new(rx: mpsc::Receiver<EventEnvelope>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { rx, sink }
    }

    /// Run the router, consuming events until every handle is dropped.
    ///
    /// Spawn this as a background task.
    pub async fn run(mut self) {
        tracing::info!("Notification router started");

        while let Some(envelope) = self.rx.recv().await {
            tracing::debug!(
                event_type = envelope.event.event_type(),
                ticket_id = envelope.event.ticket_id(),
                "Delivering lifecycle event"
            );
            if let Err(e) = self.sink.deliver(&envelope).await {
                tracing::error!("Failed to deliver lifecycle event: {}", e);
            }
        }

        tracing::info!("Notification router shutting down");
    }
}

/// Create a complete notification pipeline.
///
/// Returns:
/// - `NotifierHandle` - for publishing events (clone to share across tasks)
/// - `NotificationRouter` - spawn with `tokio::spawn(router.run())`
pub fn create_notifier(
    sink: Arc<dyn NotificationSink>,
    buffer_size: usize,
) -> (NotifierHandle, NotificationRouter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = NotifierHandle::new(tx);
    let router = NotificationRouter::new(rx, sink);
    (handle, router)
}
