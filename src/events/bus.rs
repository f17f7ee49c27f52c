//! # Event bus for broadcasting hub lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from many sources (hub loop, pumps, publishers).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   hub loop ──┐
//!   pump 1   ──┼──────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   pump N   ──┤  (broadcast chan)      (in Hub)
//!   publisher──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::event::HubEvent;

/// Broadcast channel for lifecycle events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<HubEvent>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<HubEvent>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: HubEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HubEventKind;

    #[tokio::test]
    async fn test_receiver_sees_only_later_events() {
        let bus = Bus::new(4);
        bus.publish(HubEvent::new(HubEventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        bus.publish(HubEvent::new(HubEventKind::AllClosedWithin));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, HubEventKind::AllClosedWithin);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(HubEvent::new(HubEventKind::ShutdownRequested));
        assert!(rx.recv().await.is_ok());
    }
}
