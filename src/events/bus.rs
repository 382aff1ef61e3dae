//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from every component (scheduler, retry
//! runner, login session, challenge solver, notifier).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                     Listener (one):
//!   GuardedScheduler ──┐
//!   RetryRunner      ──┤
//!   LoginSession     ──┼──► Bus ───► SubscriberSet::listen_until ───► subscribers
//!   ChallengeSolver  ──┤  (broadcast)
//!   Notifier         ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time,
//!   so components can always publish, attached to a listener or not.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Default for Bus {
    /// A bus with capacity 1024.
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn publish_without_receivers_is_noop() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::NotificationSkipped));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TriggerFired).with_task("t"));
        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::TriggerFired);
    }
}
