//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`], which distributes events to multiple subscribers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! Bus ──► listen_until() ──► emit(event)
//!                                │
//!                                ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!                                │    (bounded)         └──────► panic → SubscriberPanicked
//!                                └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Isolation**: slow/panicking subscriber doesn't affect others
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//!
//! `AssertUnwindSafe` is used around subscriber futures; a subscriber that
//! panics while holding a lock can leave its own state inconsistent.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::core::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(payload) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        bus_for_worker
                            .publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Returns `true` when no subscriber is attached.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Emits an event to all subscribers.
    ///
    /// Uses `try_send`; on a full or closed queue the event is dropped for that
    /// subscriber and `SubscriberOverflow` is published (never for an overflow
    /// event itself, to avoid loops).
    pub fn emit(&self, event: Arc<Event>) {
        let is_overflow_evt = matches!(event.kind, EventKind::SubscriberOverflow);

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow_evt {
                self.bus.publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Subscribes to the bus and forwards every event to the set until the bus
    /// closes or `token` is cancelled. On cancel, events already buffered on
    /// the bus are forwarded first.
    pub fn listen_until(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => self.emit(Arc::new(ev)),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return,
                    },
                    _ = token.cancelled() => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => self.emit(Arc::new(ev)),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        })
    }

    /// Drops all queues and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _ev: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber exploded");
        }
        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_starve_others() {
        let bus = Bus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(
            vec![Arc::new(Panicker), Arc::new(Counter(seen.clone()))],
            bus.clone(),
        );

        set.emit(Arc::new(Event::new(EventKind::TriggerFired)));
        set.emit(Arc::new(Event::new(EventKind::JobFinished)));

        let panicked = loop {
            let ev = rx.recv().await.expect("bus open");
            if ev.kind == EventKind::SubscriberPanicked {
                break ev;
            }
        };
        assert_eq!(panicked.reason.as_deref(), Some("subscriber exploded"));

        set.shutdown().await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_listener_forwards_buffered_events_first() {
        let bus = Bus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let set = Arc::new(SubscriberSet::new(
            vec![Arc::new(Counter(seen.clone()))],
            bus.clone(),
        ));
        let stop = CancellationToken::new();
        let listener = Arc::clone(&set).listen_until(stop.clone());

        for _ in 0..3 {
            bus.publish(Event::new(EventKind::TaskStarting));
        }
        stop.cancel();
        listener.await.expect("listener");

        let set = Arc::try_unwrap(set).ok().expect("listener released the set");
        set.shutdown().await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
