//! # Best-effort notification delivery.
//!
//! [`NotificationDispatcher`] pushes a message through an optional
//! [`NotificationSink`], retrying under its own [`BackoffPolicy`].
//!
//! ```text
//! deliver(title, body)
//!   ├─ no sink ─► NotificationSkipped ─► return
//!   └─ attempt 1..=N
//!        ├─ Ok  ─► NotificationDelivered ─► return
//!        └─ Err ─► NotificationFailed ─► sleep(policy.sleep_delay(attempt))
//!   exhausted ─► NotificationExhausted
//! ```
//!
//! Delivery never fails the caller: the returned [`DeliveryReport`] is for
//! diagnostics only.

use std::sync::Arc;

use tokio::time;

use crate::{
    error::NotifyError,
    events::{Bus, Event, EventKind},
    notify::NotificationSink,
    policies::BackoffPolicy,
};

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Whether some attempt was accepted.
    pub delivered: bool,
    /// Sink calls made (`0` when no sink is configured).
    pub attempts: u32,
    /// Error of the last failed attempt.
    pub last_error: Option<NotifyError>,
}

impl DeliveryReport {
    fn skipped() -> Self {
        Self {
            delivered: false,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Delivers messages through an optional sink.
pub struct NotificationDispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
    policy: BackoffPolicy,
    bus: Bus,
}

impl NotificationDispatcher {
    /// Creates a dispatcher; `sink = None` turns every delivery into a no-op.
    pub fn new(sink: Option<Arc<dyn NotificationSink>>, policy: BackoffPolicy, bus: Bus) -> Self {
        Self {
            sink,
            policy: policy.normalized(),
            bus,
        }
    }

    /// Dispatcher without a sink.
    pub fn silent(bus: Bus) -> Self {
        Self::new(None, BackoffPolicy::default(), bus)
    }

    /// Returns `true` if a sink is configured.
    pub fn is_configured(&self) -> bool {
        self.sink.is_some()
    }

    /// Name of the configured sink.
    pub fn sink_name(&self) -> Option<&str> {
        self.sink.as_deref().map(|s| s.name())
    }

    /// Tries to deliver one message.
    pub async fn deliver(&self, title: &str, body: &str) -> DeliveryReport {
        let Some(sink) = self.sink.as_deref() else {
            self.bus.publish(Event::new(EventKind::NotificationSkipped));
            return DeliveryReport::skipped();
        };

        let mut last_error = None;
        for attempt in 1..=self.policy.max_attempts {
            match sink.send(title, body).await {
                Ok(()) => {
                    self.bus.publish(
                        Event::new(EventKind::NotificationDelivered)
                            .with_task(sink.name())
                            .with_attempt(attempt),
                    );
                    return DeliveryReport {
                        delivered: true,
                        attempts: attempt,
                        last_error: None,
                    };
                }
                Err(e) => {
                    let mut ev = Event::new(EventKind::NotificationFailed)
                        .with_task(sink.name())
                        .with_attempt(attempt)
                        .with_reason(e.to_string());
                    last_error = Some(e);

                    if self.policy.allows_retry_after(attempt) {
                        let delay = self.policy.sleep_delay(attempt);
                        ev = ev.with_delay(delay);
                        self.bus.publish(ev);
                        time::sleep(delay).await;
                    } else {
                        self.bus.publish(ev);
                    }
                }
            }
        }

        let mut ev = Event::new(EventKind::NotificationExhausted)
            .with_task(sink.name())
            .with_attempt(self.policy.max_attempts);
        if let Some(e) = &last_error {
            ev = ev.with_reason(e.to_string());
        }
        self.bus.publish(ev);

        DeliveryReport {
            delivered: false,
            attempts: self.policy.max_attempts,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakySink {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, _title: &str, _body: &str) -> Result<(), NotifyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err(NotifyError::Transport(format!("connection reset #{n}")))
            } else {
                Ok(())
            }
        }
    }

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(2), 2.0, 3)
    }

    #[tokio::test]
    async fn no_sink_makes_no_calls() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let d = NotificationDispatcher::silent(bus);

        let report = d.deliver("checkin", "done").await;

        assert_eq!(report.attempts, 0);
        assert!(!report.delivered);
        assert_eq!(rx.try_recv().expect("event").kind, EventKind::NotificationSkipped);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let sink = Arc::new(FlakySink {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let d = NotificationDispatcher::new(Some(sink.clone() as Arc<dyn NotificationSink>), policy(), Bus::new(16));

        let started = time::Instant::now();
        let report = d.deliver("checkin", "done").await;

        assert!(report.delivered);
        assert_eq!(report.attempts, 3);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_a_report_not_an_error() {
        let sink = Arc::new(FlakySink {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let d = NotificationDispatcher::new(Some(sink.clone() as Arc<dyn NotificationSink>), policy(), bus);

        let report = d.deliver("checkin", "failed").await;

        assert!(!report.delivered);
        assert_eq!(report.attempts, 3);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            report.last_error,
            Some(NotifyError::Transport("connection reset #3".into()))
        );

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok().map(|e| e.kind)).collect();
        assert_eq!(kinds.last(), Some(&EventKind::NotificationExhausted));
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::NotificationFailed).count(),
            3
        );
    }
}
