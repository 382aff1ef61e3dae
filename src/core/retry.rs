//! # Retry a task under a backoff policy.
//!
//! [`RetryRunner`] drives up to `max_attempts` attempts of a task through
//! [`run_once`], sleeping `policy.sleep_delay(attempt)` between failures.
//!
//! ```text
//! attempt 1 ─► fail ─► BackoffScheduled(d1) ─► sleep d1
//! attempt 2 ─► fail ─► BackoffScheduled(d2) ─► sleep d2
//! attempt N ─► fail ─► RetryExhausted ─► RetryOutcome { succeeded: false, attempts_used: N }
//!
//! attempt k ─► ok   ─► RetryOutcome { succeeded: true, attempts_used: k }
//! ```
//!
//! A [`TaskError::Fatal`] stops the loop early; no sleep follows the last attempt.

use std::time::Duration;

use tokio::time::{self, Instant};

use crate::{
    core::runner::run_once,
    error::TaskError,
    events::{Bus, Event, EventKind},
    policies::BackoffPolicy,
    tasks::Task,
};

/// Result of a retried execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Whether some attempt succeeded.
    pub succeeded: bool,
    /// Attempts actually made (1-based count).
    pub attempts_used: u32,
    /// Wall time from the first attempt to the outcome, sleeps included.
    pub total_elapsed: Duration,
    /// Error of the last failed attempt, if the run did not succeed.
    pub last_error: Option<TaskError>,
}

impl RetryOutcome {
    /// Converts the outcome into a `Result`, keeping the last error.
    pub fn into_result(self) -> Result<(), TaskError> {
        match (self.succeeded, self.last_error) {
            (true, _) => Ok(()),
            (false, Some(e)) => Err(e),
            (false, None) => Err(TaskError::fail("no attempt was made")),
        }
    }
}

/// Runs tasks with bounded retries.
#[derive(Clone)]
pub struct RetryRunner {
    policy: BackoffPolicy,
    attempt_timeout: Option<Duration>,
    bus: Bus,
}

impl RetryRunner {
    /// Creates a runner; the policy is normalized (at least one attempt, floored delays).
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy: policy.normalized(),
            attempt_timeout: None,
            bus: Bus::new(16),
        }
    }

    /// Publishes attempt events on `bus` instead of a private one.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Bounds every attempt by `timeout` (zero disables the bound).
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Returns the effective policy.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Runs `task` until it succeeds, fails fatally, or attempts are exhausted.
    pub async fn run<T: Task + ?Sized>(&self, task: &T) -> RetryOutcome {
        let started = Instant::now();
        let max = self.policy.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max {
            match run_once(task, self.attempt_timeout, attempt, &self.bus).await {
                Ok(()) => {
                    return RetryOutcome {
                        succeeded: true,
                        attempts_used: attempt,
                        total_elapsed: started.elapsed(),
                        last_error: None,
                    };
                }
                Err(e) => {
                    if !e.is_retryable() {
                        return self.exhausted(task.name(), attempt, started, Some(e));
                    }
                    if self.policy.allows_retry_after(attempt) {
                        let delay = self.policy.sleep_delay(attempt);
                        self.bus.publish(
                            Event::new(EventKind::BackoffScheduled)
                                .with_task(task.name())
                                .with_attempt(attempt)
                                .with_delay(delay)
                                .with_reason(e.to_string()),
                        );
                        time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }
        self.exhausted(task.name(), max, started, last_error)
    }

    fn exhausted(
        &self,
        name: &str,
        attempts_used: u32,
        started: Instant,
        last_error: Option<TaskError>,
    ) -> RetryOutcome {
        let mut ev = Event::new(EventKind::RetryExhausted)
            .with_task(name)
            .with_attempt(attempts_used);
        if let Some(e) = &last_error {
            ev = ev.with_reason(e.to_string());
        }
        self.bus.publish(ev);

        RetryOutcome {
            succeeded: false,
            attempts_used,
            total_elapsed: started.elapsed(),
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskFn;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting(fail_until: u32, calls: Arc<AtomicU32>) -> impl Task {
        TaskFn::new("counting", move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            futures::future::ready(if n >= fail_until {
                Ok(())
            } else {
                Err(TaskError::fail(format!("attempt {n} failed")))
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_task_runs_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting(u32::MAX, calls.clone());
        let runner = RetryRunner::new(BackoffPolicy::new(Duration::from_secs(60), 1.0, 3));

        let outcome = runner.run(&task).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two sleeps of 60s; none after the last attempt
        assert_eq!(outcome.total_elapsed, Duration::from_secs(120));
        assert_eq!(
            outcome.last_error,
            Some(TaskError::fail("attempt 3 failed"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting(2, calls.clone());
        let runner = RetryRunner::new(BackoffPolicy::new(Duration::from_secs(2), 2.0, 5));

        let outcome = runner.run(&task).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts_used, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.total_elapsed, Duration::from_secs(2));
        assert_eq!(outcome.into_result(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_early() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let task = TaskFn::new("fatal", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(TaskError::fatal("bad credentials")) }
        });
        let runner = RetryRunner::new(BackoffPolicy::default());

        let outcome = runner.run(&task).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_is_treated_as_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting(u32::MAX, calls.clone());
        let runner = RetryRunner::new(BackoffPolicy::new(Duration::from_secs(1), 1.0, 0));

        let outcome = runner.run(&task).await;
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_events_carry_growing_delays() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting(u32::MAX, calls);
        let runner =
            RetryRunner::new(BackoffPolicy::new(Duration::from_secs(2), 2.0, 3)).with_bus(bus);

        runner.run(&task).await;

        let backoffs: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind == EventKind::BackoffScheduled)
            .collect();
        let delays: Vec<u32> = backoffs.iter().filter_map(|e| e.delay_ms).collect();
        assert_eq!(delays, vec![2_000, 4_000]);
        let reasons: Vec<&str> = backoffs.iter().filter_map(|e| e.reason.as_deref()).collect();
        assert_eq!(
            reasons,
            vec!["execution failed: attempt 1 failed", "execution failed: attempt 2 failed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn default_attempt_timeout_bounds_a_hung_task() {
        let retry = crate::core::Config::default().retry;
        let task = TaskFn::new("hung", || std::future::pending::<Result<(), TaskError>>());
        let runner = RetryRunner::new(retry.policy).with_attempt_timeout(retry.attempt_timeout);

        let outcome = runner.run(&task).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(
            outcome.last_error,
            Some(TaskError::Timeout {
                timeout: Duration::from_secs(600)
            })
        );
        // three 600s attempts and two 60s pauses
        assert_eq!(outcome.total_elapsed, Duration::from_secs(1920));
    }
}
