//! # Run a single attempt of a task.
//!
//! Executes one attempt of a [`Task`] with an optional timeout, converts a
//! panic in the task body into [`TaskError::Panicked`], and publishes
//! lifecycle events to the [`Bus`].
//!
//! ## Event flow
//! ```text
//! TaskStarting ─► task.run()
//!                   ├─ Ok(())       ─► TaskSucceeded
//!                   ├─ Err(e)       ─► TaskFailed
//!                   ├─ panic        ─► TaskFailed (Panicked)
//!                   └─ timeout hit  ─► TimeoutHit ─► TaskFailed (Timeout)
//! ```
//!
//! ## Rules
//! - Always publishes **exactly one** terminal event: `TaskSucceeded` or `TaskFailed`.
//! - Never panics and never propagates a fault other than through the returned error.
//! - On timeout the task future is dropped (a `CommandTask` child is killed).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;

use crate::{
    error::TaskError,
    events::{Bus, Event, EventKind},
    tasks::Task,
};

/// Executes a single attempt of `task`, publishing lifecycle events to `bus`.
///
/// A `timeout` of `None` or zero means no per-attempt limit.
pub async fn run_once<T: Task + ?Sized>(
    task: &T,
    timeout: Option<Duration>,
    attempt: u32,
    bus: &Bus,
) -> Result<(), TaskError> {
    bus.publish(
        Event::new(EventKind::TaskStarting)
            .with_task(task.name())
            .with_attempt(attempt),
    );

    let guarded = AssertUnwindSafe(task.run()).catch_unwind();
    let caught = match timeout.filter(|d| !d.is_zero()) {
        Some(dur) => match time::timeout(dur, guarded).await {
            Ok(caught) => caught,
            Err(_elapsed) => {
                bus.publish(
                    Event::new(EventKind::TimeoutHit)
                        .with_task(task.name())
                        .with_timeout(dur)
                        .with_attempt(attempt),
                );
                Ok(Err(TaskError::Timeout { timeout: dur }))
            }
        },
        None => guarded.await,
    };

    let res = caught.unwrap_or_else(|payload| {
        Err(TaskError::Panicked {
            info: panic_message(&*payload),
        })
    });

    match &res {
        Ok(()) => bus.publish(
            Event::new(EventKind::TaskSucceeded)
                .with_task(task.name())
                .with_attempt(attempt),
        ),
        Err(e) => bus.publish(
            Event::new(EventKind::TaskFailed)
                .with_task(task.name())
                .with_attempt(attempt)
                .with_reason(e.to_string()),
        ),
    }
    res
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskFn;

    #[tokio::test]
    async fn panic_becomes_task_error() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let task = TaskFn::new("boom", || async {
            if true {
                panic!("selector vanished");
            }
            Ok(())
        });

        let res = run_once(&task, None, 1, &bus).await;
        assert_eq!(
            res,
            Err(TaskError::Panicked {
                info: "selector vanished".into()
            })
        );

        assert_eq!(rx.recv().await.expect("starting").kind, EventKind::TaskStarting);
        assert_eq!(rx.recv().await.expect("failed").kind, EventKind::TaskFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_and_returned() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let task = TaskFn::new("slow", || async {
            time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let res = run_once(&task, Some(Duration::from_secs(5)), 3, &bus).await;
        assert_eq!(
            res,
            Err(TaskError::Timeout {
                timeout: Duration::from_secs(5)
            })
        );

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok().map(|e| e.kind)).collect();
        assert_eq!(
            kinds,
            vec![EventKind::TaskStarting, EventKind::TimeoutHit, EventKind::TaskFailed]
        );
    }

    #[tokio::test]
    async fn zero_timeout_means_unbounded() {
        let bus = Bus::new(4);
        let task = TaskFn::new("ok", || async { Ok(()) });
        assert_eq!(run_once(&task, Some(Duration::ZERO), 1, &bus).await, Ok(()));
    }
}
