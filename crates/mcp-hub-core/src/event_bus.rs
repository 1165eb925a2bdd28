//! Event Bus — central distribution point for [`HubEvent`]s.
//!
//! A broadcast channel fans every event out to all current subscribers
//! (SSE clients, the Unified Upstream Endpoint's list-changed notifier,
//! the Workspace Cache watcher). Producers never know who, if anyone, is
//! listening (spec §4.5, §5 "Shared-resource policy").

use crate::event::{HubEvent, HubEventEnvelope};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HubEventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn sender(&self) -> EventSender {
        EventSender::new(self.sender.clone())
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheaply cloneable handle used by producers to emit events.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<HubEventEnvelope>,
}

impl EventSender {
    fn new(sender: broadcast::Sender<HubEventEnvelope>) -> Self {
        Self { sender }
    }

    /// Emit an event, stamping it with the current time. Returns the number
    /// of receivers that got it; zero receivers is not an error (spec §7:
    /// broadcast errors are logged, never propagated to other subscribers).
    pub fn emit(&self, event: HubEvent) -> usize {
        let envelope = HubEventEnvelope::new(event);
        match self.sender.send(envelope) {
            Ok(count) => {
                debug!(receivers = count, "emitted hub event");
                count
            }
            Err(_) => {
                debug!("emitted hub event with no receivers");
                0
            }
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<HubEventEnvelope>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<HubEventEnvelope>) -> Self {
        Self { receiver }
    }

    /// Receive the next event, transparently recovering from lag by
    /// skipping ahead to the oldest event still buffered.
    pub async fn recv(&mut self) -> Option<HubEventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bus receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_shared_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_to_subscriber() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let mut rx = bus.subscribe();

        sender.emit(HubEvent::WorkspacesUpdated);
        let envelope = rx.recv().await.unwrap();
        assert!(matches!(envelope.event, HubEvent::WorkspacesUpdated));
    }

    #[tokio::test]
    async fn fans_out_to_multiple_subscribers() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        sender.emit(HubEvent::Heartbeat { connections: 3 });
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[test]
    fn emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        let sender = bus.sender();
        assert_eq!(sender.emit(HubEvent::WorkspacesUpdated), 0);
    }

    #[test]
    fn has_subscribers_reflects_active_receivers() {
        let bus = EventBus::new();
        let sender = bus.sender();
        assert!(!sender.has_subscribers());
        let _rx = bus.subscribe();
        assert!(sender.has_subscribers());
    }
}
