//! # Daily time-of-day triggers.
//!
//! A [`SchedulerTrigger`] binds a task to a wall-clock time in the
//! scheduler's reference timezone. It fires once every 24 hours.
//!
//! The trigger also knows how to run its job: once through [`run_once`], or
//! through a [`RetryRunner`] when a retry policy is attached, followed by an
//! outcome report when a notifier is attached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};

use crate::{
    core::{
        retry::{RetryOutcome, RetryRunner},
        runner::run_once,
    },
    events::{Bus, Event, EventKind},
    notify::{JobReport, NotificationDispatcher},
    policies::BackoffPolicy,
    tasks::TaskRef,
};

/// Interval between two firings of the same trigger.
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// A task bound to a daily time of day.
#[derive(Clone)]
pub struct SchedulerTrigger {
    name: Arc<str>,
    at: NaiveTime,
    task: TaskRef,
    retry: Option<BackoffPolicy>,
    attempt_timeout: Option<Duration>,
    notifier: Option<Arc<NotificationDispatcher>>,
}

impl SchedulerTrigger {
    /// Creates a trigger running `task` every day at `at`, once, without notification.
    pub fn new(name: impl Into<Arc<str>>, at: NaiveTime, task: TaskRef) -> Self {
        Self {
            name: name.into(),
            at,
            task,
            retry: None,
            attempt_timeout: None,
            notifier: None,
        }
    }

    /// Runs the task through a [`RetryRunner`] with `policy`.
    pub fn with_retry(mut self, policy: BackoffPolicy) -> Self {
        self.retry = Some(policy.normalized());
        self
    }

    /// Bounds every attempt by `timeout` (zero disables the bound).
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Reports each outcome through `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<NotificationDispatcher>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Trigger name.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Time of day in the reference timezone.
    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// Retry policy, if any.
    pub fn retry(&self) -> Option<&BackoffPolicy> {
        self.retry.as_ref()
    }

    /// Attached notifier, if any.
    pub fn notifier(&self) -> Option<&Arc<NotificationDispatcher>> {
        self.notifier.as_ref()
    }

    /// Next firing strictly after `now`, with the wait until then.
    pub fn next_fire(&self, now: DateTime<FixedOffset>) -> (DateTime<FixedOffset>, Duration) {
        next_fire(self.at, now)
    }

    /// Runs the bound task once or under the retry policy.
    pub async fn execute(&self, bus: &Bus) -> RetryOutcome {
        match self.retry {
            Some(policy) => {
                let mut runner = RetryRunner::new(policy).with_bus(bus.clone());
                if let Some(t) = self.attempt_timeout {
                    runner = runner.with_attempt_timeout(t);
                }
                runner.run(self.task.as_ref()).await
            }
            None => {
                let started = tokio::time::Instant::now();
                let res = run_once(self.task.as_ref(), self.attempt_timeout, 1, bus).await;
                RetryOutcome {
                    succeeded: res.is_ok(),
                    attempts_used: 1,
                    total_elapsed: started.elapsed(),
                    last_error: res.err(),
                }
            }
        }
    }

    /// Runs the job, publishes `JobFinished`, then reports the outcome
    /// through the notifier stamped with the time in `offset`.
    pub async fn run_and_report(&self, bus: &Bus, offset: FixedOffset) -> RetryOutcome {
        let outcome = self.execute(bus).await;

        bus.publish(
            Event::new(EventKind::JobFinished)
                .with_task(Arc::clone(&self.name))
                .with_attempt(outcome.attempts_used)
                .with_elapsed(outcome.total_elapsed)
                .with_reason(if outcome.succeeded { "succeeded" } else { "failed" }),
        );

        if let Some(notifier) = &self.notifier {
            let report =
                JobReport::compose(&self.name, &outcome, Utc::now().with_timezone(&offset));
            notifier.deliver(&report.title, &report.body).await;
        }
        outcome
    }
}

impl std::fmt::Debug for SchedulerTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerTrigger")
            .field("name", &self.name)
            .field("at", &self.at)
            .field("task", &self.task.name())
            .field("retry", &self.retry)
            .field("notify", &self.notifier.is_some())
            .finish()
    }
}

/// Computes the next occurrence of `at` strictly after `now`, in `now`'s offset.
pub fn next_fire(at: NaiveTime, now: DateTime<FixedOffset>) -> (DateTime<FixedOffset>, Duration) {
    let local_now = now.naive_local();
    let mut next = local_now.date().and_time(at);
    if next <= local_now {
        next += TimeDelta::days(1);
    }
    let gap = next - local_now;
    (now + gap, gap.to_std().unwrap_or_default())
}
