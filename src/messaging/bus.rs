use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
/// Event bus for pub/sub messaging
///
/// The game publishes transitions; the audio director and anything else
/// interested subscribe. Delivery is non-blocking and in publish order.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::events::GameEvent;

/// Subscriber ID for tracking subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

struct Subscriber {
    id: SubscriberId,
    sender: Sender<GameEvent>,
}

/// Event bus for broadcasting game events to subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_id: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events, returns a receiver and subscription ID
    pub fn subscribe(&self) -> (Receiver<GameEvent>, SubscriberId) {
        let (tx, rx) = unbounded();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.subscribers.write().push(Subscriber { id, sender: tx });

        (rx, id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    /// Publish an event to all subscribers; returns how many received it
    ///
    /// Subscribers whose receiver was dropped are removed.
    pub fn publish(&self, event: GameEvent) -> usize {
        tracing::debug!("Event: {}", event);

        let mut delivered = 0;
        let mut closed = Vec::new();
        for subscriber in self.subscribers.read().iter() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(subscriber.id),
            }
        }

        if !closed.is_empty() {
            self.subscribers.write().retain(|s| !closed.contains(&s.id));
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new();
        let (_rx, _id) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_event_bus_unsubscribe() {
        let bus = EventBus::new();
        let (_rx, id) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_bus_preserves_order() {
        let bus = EventBus::new();
        let (rx, _id) = bus.subscribe();

        bus.publish(GameEvent::StartRequested);
        bus.publish(GameEvent::LevelUp { level: 2 });

        assert_eq!(rx.try_recv().unwrap(), GameEvent::StartRequested);
        assert_eq!(rx.try_recv().unwrap(), GameEvent::LevelUp { level: 2 });
    }

    #[test]
    fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new();
        let (rx1, _id1) = bus.subscribe();
        let (rx2, _id2) = bus.subscribe();

        assert_eq!(bus.publish(GameEvent::Shutdown), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let (rx, _id) = bus.subscribe();
        let (_kept, _id) = bus.subscribe();
        drop(rx);

        assert_eq!(bus.publish(GameEvent::MuteToggled), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_event_bus_clone_shares_subscribers() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let (_rx, id) = bus1.subscribe();
        assert_eq!(bus2.subscriber_count(), 1);

        bus2.unsubscribe(id);
        assert_eq!(bus1.subscriber_count(), 0);
    }
}
