use cachelink_spec::Error;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Connector-lifetime notifications, separate from per-call results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// The backend handshake completed. Sent once.
    Ready,
    /// A failure not tied to any in-flight call.
    Error(Error),
}

/// Broadcast side of the event channel.
#[derive(Clone, Debug)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<ConnectorEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: ConnectorEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub(crate) fn emit_error(&self, err: Error) {
        self.emit(ConnectorEvent::Error(err));
    }
}
