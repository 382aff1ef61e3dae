//! # Guarded daily scheduler.
//!
//! [`GuardedScheduler`] evaluates its triggers on a fixed poll cadence and
//! runs each due job as a spawned task holding the scheduler's single
//! [`ExclusionGuard`] permit.
//!
//! ## Architecture
//! ```text
//! ┌──────────────── poll loop (every poll_interval) ────────────────┐
//! │ for trigger in configuration order:                             │
//! │   now < due          ─► continue                                │
//! │   due += 24h (until due > now)                                  │
//! │   guard.try_enter()                                             │
//! │     ├─ None          ─► TriggerSkipped   (never queued)         │
//! │     └─ Some(permit)  ─► TriggerFired ─► spawn job(permit)       │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! job(permit):
//!   trigger.run_and_report()
//!     execute (run_once or RetryRunner) ─► JobFinished ─► notifier.deliver(report)
//!   drop(permit)
//! ```
//!
//! ## Rules
//! - Due times are computed once from the wall clock (reference offset) when a
//!   trigger is added, then kept as monotonic [`Instant`]s. Wall-clock jumps
//!   between polls have no effect.
//! - All triggers share one guard: at most one job body runs at any instant.
//! - The permit is dropped on every exit path of the job, including panics.
//! - Shutdown waits up to `grace` for the in-flight job, then aborts it and
//!   returns [`RuntimeError::GraceExceeded`].

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::SchedulerSettings,
        guard::{ExclusionGuard, GuardPermit},
        shutdown,
        trigger::{DAY, SchedulerTrigger},
    },
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    subscribers::SubscriberSet,
};

/// Result of one trigger evaluation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Triggers whose job was started.
    pub fired: Vec<Arc<str>>,
    /// Due triggers dropped because the guard was held.
    pub skipped: Vec<Arc<str>>,
}

struct Slot {
    trigger: Arc<SchedulerTrigger>,
    due: Instant,
}

struct SubscriberHandle {
    set: Arc<SubscriberSet>,
    stop: CancellationToken,
    listener: JoinHandle<()>,
}

/// Daily scheduler with a process-wide exclusion guard.
pub struct GuardedScheduler {
    settings: SchedulerSettings,
    slots: Vec<Slot>,
    guard: ExclusionGuard,
    bus: Bus,
    jobs: JoinSet<()>,
    subscribers: Option<SubscriberHandle>,
}

impl GuardedScheduler {
    /// Creates an empty scheduler publishing to `bus`.
    pub fn new(settings: SchedulerSettings, bus: Bus) -> Self {
        Self {
            settings: settings.normalized(),
            slots: Vec::new(),
            guard: ExclusionGuard::new(),
            bus,
            jobs: JoinSet::new(),
            subscribers: None,
        }
    }

    /// Forwards bus events to `set` until the scheduler stops.
    pub(crate) fn attach_subscribers(&mut self, set: SubscriberSet) {
        let set = Arc::new(set);
        let stop = CancellationToken::new();
        let listener = Arc::clone(&set).listen_until(stop.clone());
        self.subscribers = Some(SubscriberHandle {
            set,
            stop,
            listener,
        });
    }

    /// Adds a trigger, computing its first due time from the current wall clock.
    pub fn add_trigger(&mut self, trigger: SchedulerTrigger) {
        let wall = Utc::now().with_timezone(&self.settings.utc_offset);
        self.add_trigger_from(trigger, wall, Instant::now());
    }

    /// Adds a trigger whose first due time is computed from `wall_now`, anchored at `mono_now`.
    pub fn add_trigger_from(
        &mut self,
        trigger: SchedulerTrigger,
        wall_now: DateTime<FixedOffset>,
        mono_now: Instant,
    ) {
        let wall_now = wall_now.with_timezone(&self.settings.utc_offset);
        let (at, wait) = trigger.next_fire(wall_now);
        self.bus.publish(
            Event::new(EventKind::TriggerScheduled)
                .with_task(Arc::clone(trigger.name()))
                .with_reason(at.to_rfc3339())
                .with_delay(wait),
        );
        self.slots.push(Slot {
            trigger: Arc::new(trigger),
            due: mono_now + wait,
        });
    }

    /// Number of configured triggers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no trigger is configured.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The shared exclusion guard.
    pub fn guard(&self) -> &ExclusionGuard {
        &self.guard
    }

    /// The event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Effective settings.
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Next due instant of the named trigger.
    pub fn next_due(&self, name: &str) -> Option<Instant> {
        self.slots
            .iter()
            .find(|s| &**s.trigger.name() == name)
            .map(|s| s.due)
    }

    /// Evaluates every trigger once against `now`.
    ///
    /// Must be called inside a tokio runtime (jobs are spawned).
    pub fn poll(&mut self, now: Instant) -> PollReport {
        while self.jobs.try_join_next().is_some() {}

        let mut report = PollReport::default();
        for slot in &mut self.slots {
            if now < slot.due {
                continue;
            }
            while slot.due <= now {
                slot.due += DAY;
            }

            let name = Arc::clone(slot.trigger.name());
            match self.guard.try_enter(Arc::clone(&name)) {
                Some(permit) => {
                    self.bus
                        .publish(Event::new(EventKind::TriggerFired).with_task(Arc::clone(&name)));
                    self.jobs.spawn(run_job(
                        Arc::clone(&slot.trigger),
                        permit,
                        self.bus.clone(),
                        self.settings.utc_offset,
                    ));
                    report.fired.push(name);
                }
                None => {
                    let mut ev = Event::new(EventKind::TriggerSkipped).with_task(Arc::clone(&name));
                    if let Some(holder) = self.guard.holder() {
                        ev = ev.with_reason(holder);
                    }
                    self.bus.publish(ev);
                    report.skipped.push(name);
                }
            }
        }
        report
    }

    /// Polls on the configured cadence until `token` is cancelled, then waits
    /// up to `grace` for the in-flight job.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), RuntimeError> {
        self.bus.publish(
            Event::new(EventKind::SchedulerStarted)
                .with_attempt(u32::try_from(self.slots.len()).unwrap_or(u32::MAX))
                .with_delay(self.settings.poll_interval),
        );

        let mut ticker = time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll(Instant::now());
                }
            }
        }

        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        let res = self.wait_in_flight().await;
        self.close_subscribers().await;
        res
    }

    /// Like [`run`](Self::run), stopping on SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere).
    pub async fn run_until_signal(self) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            match shutdown::wait_for_shutdown_signal().await {
                Ok(()) => stopper.cancel(),
                Err(e) => tracing::warn!(error = %e, "cannot listen for termination signals"),
            }
        });
        self.run(token).await
    }

    async fn close_subscribers(&mut self) {
        let Some(handle) = self.subscribers.take() else {
            return;
        };
        handle.stop.cancel();
        let _ = handle.listener.await;
        if let Ok(set) = Arc::try_unwrap(handle.set) {
            set.shutdown().await;
        }
    }

    async fn wait_in_flight(&mut self) -> Result<(), RuntimeError> {
        let grace = self.settings.grace;
        let jobs = &mut self.jobs;
        let drained = time::timeout(grace, async {
            while jobs.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_elapsed) => {
                let running = self.guard.holder().map(|h| h.to_string());
                let mut ev = Event::new(EventKind::GraceExceeded).with_timeout(grace);
                if let Some(r) = &running {
                    ev = ev.with_reason(r.as_str());
                }
                self.bus.publish(ev);
                self.jobs.abort_all();
                Err(RuntimeError::GraceExceeded { grace, running })
            }
        }
    }
}

/// Runs one job while holding the guard; the permit drops when this future ends.
async fn run_job(
    trigger: Arc<SchedulerTrigger>,
    permit: GuardPermit,
    bus: Bus,
    offset: FixedOffset,
) {
    let _permit = permit;
    trigger.run_and_report(&bus, offset).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::notify::{NotificationDispatcher, NotificationSink};
    use crate::policies::BackoffPolicy;
    use crate::tasks::{TaskFn, TaskRef};
    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeZone};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_secs(30),
            utc_offset: FixedOffset::east_opt(8 * 3600).expect("valid offset"),
            grace: Duration::from_secs(5),
        }
    }

    /// 06:59:00 at +08:00; a 07:00 trigger is due 60s later.
    fn wall() -> DateTime<FixedOffset> {
        settings()
            .utc_offset
            .with_ymd_and_hms(2026, 3, 2, 6, 59, 0)
            .single()
            .expect("valid")
    }

    fn seven() -> NaiveTime {
        NaiveTime::from_hms_opt(7, 0, 0).expect("valid time")
    }

    fn counting(name: &'static str, calls: Arc<AtomicU32>) -> TaskRef {
        TaskFn::arc(name, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
    }

    fn gated(name: &'static str, gate: Arc<Notify>, calls: Arc<AtomicU32>) -> TaskRef {
        TaskFn::arc(name, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok(())
            }
        })
    }

    async fn drain(s: &mut GuardedScheduler) {
        while s.jobs.join_next().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn second_due_trigger_is_skipped_not_queued() {
        let mut s = GuardedScheduler::new(settings(), Bus::new(64));
        let t0 = Instant::now();
        let gate = Arc::new(Notify::new());
        let a_calls = Arc::new(AtomicU32::new(0));
        let b_calls = Arc::new(AtomicU32::new(0));

        s.add_trigger_from(
            SchedulerTrigger::new("checkin", seven(), gated("checkin", gate.clone(), a_calls.clone())),
            wall(),
            t0,
        );
        s.add_trigger_from(
            SchedulerTrigger::new("report", seven(), counting("report", b_calls.clone())),
            wall(),
            t0,
        );

        let due = t0 + Duration::from_secs(60);
        assert_eq!(s.poll(due - Duration::from_secs(1)), PollReport::default());

        let report = s.poll(due);
        assert_eq!(report.fired, vec![Arc::<str>::from("checkin")]);
        assert_eq!(report.skipped, vec![Arc::<str>::from("report")]);
        assert_eq!(s.guard().holder().as_deref(), Some("checkin"));

        gate.notify_one();
        drain(&mut s).await;
        assert!(!s.guard().is_held());

        // the skipped trigger does not run once the guard frees up
        assert_eq!(s.poll(due + Duration::from_secs(30)), PollReport::default());
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.next_due("report"), Some(due + DAY));
    }

    #[tokio::test(start_paused = true)]
    async fn guard_is_released_after_a_panicking_job() {
        let mut s = GuardedScheduler::new(settings(), Bus::new(64));
        let t0 = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let boom: TaskRef = TaskFn::arc("boom", || async {
            if true {
                panic!("driver crashed");
            }
            Ok::<(), TaskError>(())
        });

        s.add_trigger_from(SchedulerTrigger::new("boom", seven(), boom), wall(), t0);
        s.add_trigger_from(
            SchedulerTrigger::new("after", NaiveTime::from_hms_opt(7, 1, 0).expect("valid"), counting("after", calls.clone())),
            wall(),
            t0,
        );

        let report = s.poll(t0 + Duration::from_secs(60));
        assert_eq!(report.fired.len(), 1);
        drain(&mut s).await;
        assert!(!s.guard().is_held());

        let report = s.poll(t0 + Duration::from_secs(120));
        assert_eq!(report.fired, vec![Arc::<str>::from("after")]);
        drain(&mut s).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_again_exactly_one_day_later() {
        let mut s = GuardedScheduler::new(settings(), Bus::new(64));
        let t0 = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        s.add_trigger_from(
            SchedulerTrigger::new("daily", seven(), counting("daily", calls.clone())),
            wall(),
            t0,
        );
        let due = t0 + Duration::from_secs(60);

        assert_eq!(s.poll(due).fired.len(), 1);
        drain(&mut s).await;
        assert!(s.poll(due + Duration::from_secs(3600)).fired.is_empty());
        assert!(s.poll(due + DAY - Duration::from_secs(1)).fired.is_empty());
        assert_eq!(s.poll(due + DAY).fired.len(), 1);
        drain(&mut s).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.next_due("daily"), Some(due + DAY + DAY));
    }

    #[tokio::test(start_paused = true)]
    async fn long_stall_fires_once_not_per_missed_day() {
        let mut s = GuardedScheduler::new(settings(), Bus::new(64));
        let t0 = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        s.add_trigger_from(
            SchedulerTrigger::new("daily", seven(), counting("daily", calls.clone())),
            wall(),
            t0,
        );

        let late = t0 + Duration::from_secs(60) + DAY * 3 + Duration::from_secs(5);
        assert_eq!(s.poll(late).fired.len(), 1);
        assert!(s.poll(late).fired.is_empty());
        drain(&mut s).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_fires_on_cadence_and_stops_on_cancel() {
        let mut s = GuardedScheduler::new(settings(), Bus::new(64));
        let calls = Arc::new(AtomicU32::new(0));
        s.add_trigger_from(
            SchedulerTrigger::new("checkin", seven(), counting("checkin", calls.clone())),
            wall(),
            Instant::now(),
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(s.run(token.clone()));

        time::sleep(Duration::from_secs(95)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        token.cancel();
        assert_eq!(handle.await.expect("join"), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_a_job_that_outlives_grace() {
        let mut s = GuardedScheduler::new(settings(), Bus::new(64));
        let stuck: TaskRef = TaskFn::arc("stuck", || async {
            std::future::pending::<()>().await;
            Ok(())
        });
        s.add_trigger_from(SchedulerTrigger::new("stuck", seven(), stuck), wall(), Instant::now());

        let token = CancellationToken::new();
        let handle = tokio::spawn(s.run(token.clone()));
        time::sleep(Duration::from_secs(65)).await;
        token.cancel();

        assert_eq!(
            handle.await.expect("join"),
            Err(RuntimeError::GraceExceeded {
                grace: Duration::from_secs(5),
                running: Some("stuck".into()),
            })
        );
    }

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl NotificationSink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn send(&self, title: &str, _body: &str) -> Result<(), crate::error::NotifyError> {
            self.0.lock().expect("lock").push(title.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_is_retried_then_reported() {
        let bus = Bus::new(256);
        let mut s = GuardedScheduler::new(settings(), bus.clone());
        let sink = Arc::new(Recorder(Mutex::new(Vec::new())));
        let notifier = Arc::new(NotificationDispatcher::new(
            Some(sink.clone() as Arc<dyn NotificationSink>),
            BackoffPolicy::new(Duration::from_secs(2), 2.0, 3),
            bus,
        ));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let flaky: TaskRef = TaskFn::arc("flaky", move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(TaskError::fail("portal timeout"))
                } else {
                    Ok(())
                }
            }
        });
        s.add_trigger_from(
            SchedulerTrigger::new("flaky", seven(), flaky)
                .with_retry(BackoffPolicy::new(Duration::from_secs(60), 1.0, 3))
                .with_notifier(notifier),
            wall(),
            Instant::now(),
        );

        s.poll(Instant::now() + Duration::from_secs(60));
        drain(&mut s).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let titles = sink.0.lock().expect("lock").clone();
        assert_eq!(titles.len(), 1);
        assert!(titles[0].starts_with("flaky succeeded"), "{titles:?}");
    }
}
