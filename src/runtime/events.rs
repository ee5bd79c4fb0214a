//! Process-wide operation notifications.

use tokio::sync::broadcast;

use crate::types::OperationId;

/// Default capacity of the notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Events published by the queue service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    /// An operation reached durable storage.
    Added {
        /// Stored operation id.
        id: OperationId,
    },
}

/// Cloneable publish/subscribe handle.
///
/// Subscribing returns a receiver; dropping it unsubscribes. Publishing with
/// no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OperationEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes `event`, returning how many subscribers will see it.
    pub fn send(&self, event: OperationEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        assert_eq!(bus.send(OperationEvent::Added { id: "a".into() }), 0);
    }

    #[tokio::test]
    async fn dropping_receiver_unsubscribes() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(bus.send(OperationEvent::Added { id: "a".into() }), 1);
        assert_eq!(
            rx.recv().await.expect("recv"),
            OperationEvent::Added { id: "a".into() }
        );

        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
