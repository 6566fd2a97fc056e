//! In-process publish/subscribe fan-out
//!
//! Each subscriber gets its own unbounded channel and receives every event
//! published after it subscribed, at most once. Nothing is replayed to late
//! subscribers. Subscribers whose receiver was dropped are pruned on publish.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Fan-out publisher
pub struct Broadcast<T> {
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> Broadcast<T> {
    /// Create a publisher with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&self, event: T) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers
    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscriber channel, disconnecting their receivers
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }
}

impl<T: Clone> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let bus = Broadcast::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7);
        assert_eq!(a.try_recv(), Ok(7));
        assert_eq!(b.try_recv(), Ok(7));
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn test_no_replay_for_late_subscriber() {
        let bus = Broadcast::new();
        bus.publish("early");
        let late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = Broadcast::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(1u8);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv(), Ok(1));
    }

    #[test]
    fn test_close_disconnects() {
        let bus: Broadcast<u8> = Broadcast::new();
        let rx = bus.subscribe();
        bus.close();
        assert!(rx.recv().is_err());
    }
}
