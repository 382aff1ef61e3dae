//! # LogWriter: renders events through `tracing`
//!
//! A subscriber that turns every [`Event`] into one structured `tracing`
//! record. Severity follows the error taxonomy: exhaustion and structural
//! faults are `error`, transient faults are `warn`, configuration absence is
//! `info`, per-attempt chatter is `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  trigger fired trigger="checkin-morning"
//! WARN  attempt failed task="checkin-morning" attempt=1 reason="execution failed: exit status 1"
//! WARN  retry scheduled task="checkin-morning" attempt=1 delay_ms=60000
//! WARN  trigger skipped, guard held trigger="report" holder="checkin-evening"
//! INFO  notification skipped, no sink configured
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let attempt = e.attempt.unwrap_or(0);

        match e.kind {
            EventKind::SubscriberPanicked => {
                error!(subscriber = task, info = reason, "subscriber panicked");
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = task, reason, "subscriber dropped an event");
            }
            EventKind::SchedulerStarted => {
                info!(triggers = attempt, poll_ms = e.delay_ms, "scheduler started");
            }
            EventKind::TriggerScheduled => {
                info!(trigger = task, at = reason, in_ms = e.delay_ms, "trigger scheduled");
            }
            EventKind::TriggerFired => {
                info!(trigger = task, "trigger fired");
            }
            EventKind::TriggerSkipped => {
                warn!(trigger = task, holder = reason, "trigger skipped, guard held");
            }
            EventKind::JobFinished => {
                info!(
                    trigger = task,
                    attempts = attempt,
                    elapsed_ms = e.elapsed_ms,
                    outcome = reason,
                    "job finished"
                );
            }
            EventKind::ShutdownRequested => {
                info!("shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!("all jobs stopped within grace");
            }
            EventKind::GraceExceeded => {
                error!(running = reason, "grace exceeded");
            }
            EventKind::TaskStarting => {
                debug!(task, attempt, "attempt starting");
            }
            EventKind::TaskSucceeded => {
                info!(task, attempt, "attempt succeeded");
            }
            EventKind::TaskFailed => {
                warn!(task, attempt, reason, "attempt failed");
            }
            EventKind::TimeoutHit => {
                warn!(task, attempt, timeout_ms = e.timeout_ms, "attempt timed out");
            }
            EventKind::BackoffScheduled => {
                warn!(task, attempt, delay_ms = e.delay_ms, "retry scheduled");
            }
            EventKind::RetryExhausted => {
                error!(
                    task,
                    attempts = attempt,
                    elapsed_ms = e.elapsed_ms,
                    reason,
                    "retries exhausted"
                );
            }
            EventKind::LoginPageLoaded => {
                debug!(url = task, budget_ms = e.timeout_ms, "login page loaded");
            }
            EventKind::LoginAttemptStarted => {
                info!(attempt, "login attempt");
            }
            EventKind::LoginAttemptFailed => {
                warn!(attempt, reason, "login attempt failed");
            }
            EventKind::LoginVerified => {
                info!(attempt, location = reason, elapsed_ms = e.elapsed_ms, "login verified");
            }
            EventKind::LoginFailed => {
                error!(attempts = attempt, elapsed_ms = e.elapsed_ms, reason, "login failed");
            }
            EventKind::ChallengeAccepted => {
                debug!(attempt, "challenge accepted");
            }
            EventKind::ChallengeRejected => {
                warn!(attempt, reason, "challenge rejected, refreshing");
            }
            EventKind::ChallengeUnavailable => {
                info!(reason, "challenge cannot be solved automatically");
            }
            EventKind::NotificationDelivered => {
                info!(sink = task, attempt, "notification delivered");
            }
            EventKind::NotificationFailed => {
                warn!(sink = task, attempt, reason, retry_in_ms = e.delay_ms, "notification attempt failed");
            }
            EventKind::NotificationExhausted => {
                error!(sink = task, attempts = attempt, reason, "notification dropped");
            }
            EventKind::NotificationSkipped => {
                info!("notification skipped, no sink configured");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
