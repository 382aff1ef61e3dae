//! # Runtime events emitted by the scheduler, retry runner, login session and notifier.
//!
//! The [`EventKind`] enum classifies event types across five groups:
//! - **Scheduler events**: triggers firing, overlaps skipped, shutdown
//! - **Attempt events**: one task attempt starting, succeeding, failing, backing off
//! - **Login events**: attempts of the login state machine and its verdict
//! - **Challenge events**: classifier answers accepted or rejected
//! - **Notification events**: delivery attempts and their final outcome
//!
//! The [`Event`] struct carries optional metadata such as the task or trigger
//! name, attempt number, delays and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use shiftvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("checkin-morning")
//!     .with_reason("submit button missing")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(60));
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("checkin-morning"));
//! assert_eq!(ev.delay_ms, Some(60_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `task` (subscriber name) and `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `task` (subscriber name) and `reason`.
    SubscriberOverflow,

    // === Scheduler events ===
    /// Scheduler loop started.
    ///
    /// Sets `attempt` (number of triggers) and `delay_ms` (poll interval).
    SchedulerStarted,

    /// A trigger's next firing time was computed.
    ///
    /// Sets `task` (trigger name), `delay_ms` (time until firing) and
    /// `reason` (reference-timezone wall-clock time).
    TriggerScheduled,

    /// A due trigger entered the exclusion guard and its job was started.
    ///
    /// Sets `task` (trigger name).
    TriggerFired,

    /// A due trigger found the exclusion guard held and was skipped (not queued).
    ///
    /// Sets `task` (trigger name) and `reason` (holder, when known).
    TriggerSkipped,

    /// A fired job finished and released the guard.
    ///
    /// Sets `task`, `attempt` (attempts used), `elapsed_ms` and `reason`
    /// (`"succeeded"` or `"failed"`).
    JobFinished,

    /// Shutdown requested (OS signal or cancelled token).
    ShutdownRequested,

    /// In-flight job finished within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; a job was still running.
    GraceExceeded,

    // === Attempt events ===
    /// A task attempt is starting.
    ///
    /// Sets `task` and `attempt` (1-based).
    TaskStarting,

    /// A task attempt succeeded.
    ///
    /// Sets `task` and `attempt`.
    TaskSucceeded,

    /// A task attempt failed (error, timeout or caught panic).
    ///
    /// Sets `task`, `attempt` and `reason`.
    TaskFailed,

    /// A task attempt exceeded its per-attempt timeout.
    ///
    /// Sets `task`, `attempt` and `timeout_ms`. Always followed by `TaskFailed`.
    TimeoutHit,

    /// Next attempt scheduled after a failure.
    ///
    /// Sets `task`, `attempt` (the failed one), `delay_ms` and `reason`.
    BackoffScheduled,

    /// All attempts were used without success, or a fatal error stopped retrying.
    ///
    /// Sets `task`, `attempt` (attempts used), `elapsed_ms` and `reason`.
    RetryExhausted,

    // === Login events ===
    /// The login page was opened; the time budget starts now.
    ///
    /// Sets `task` (entry url) and `timeout_ms` (total budget).
    LoginPageLoaded,

    /// A login attempt is starting.
    ///
    /// Sets `attempt`.
    LoginAttemptStarted,

    /// A login attempt did not authenticate.
    ///
    /// Sets `attempt` and `reason`.
    LoginAttemptFailed,

    /// Location changed after submission; login considered successful.
    ///
    /// Sets `attempt`, `elapsed_ms` and `reason` (new location).
    LoginVerified,

    /// Login session ended in `Failed`.
    ///
    /// Sets `attempt`, `elapsed_ms` and `reason`.
    LoginFailed,

    // === Challenge events ===
    /// Classifier output passed validation.
    ///
    /// Sets `attempt`.
    ChallengeAccepted,

    /// Classifier output failed validation; a refresh follows.
    ///
    /// Sets `attempt` and `reason` (raw and filtered text).
    ChallengeRejected,

    /// The challenge could not be attempted (no classifier, no image).
    ///
    /// Sets `reason`.
    ChallengeUnavailable,

    // === Notification events ===
    /// A notification was accepted by the sink.
    ///
    /// Sets `task` (sink name) and `attempt`.
    NotificationDelivered,

    /// One delivery attempt failed.
    ///
    /// Sets `task` (sink name), `attempt`, `reason` and `delay_ms` when a retry follows.
    NotificationFailed,

    /// Every delivery attempt failed; the message is dropped.
    ///
    /// Sets `task` (sink name), `attempt` and `reason`.
    NotificationExhausted,

    /// No sink configured; nothing was sent.
    NotificationSkipped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task, trigger or sink name, if applicable.
    pub task: Option<Arc<str>>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
    /// Human-readable reason (errors, outcomes, details).
    pub reason: Option<Arc<str>>,
    /// Delay before the next action in milliseconds.
    pub delay_ms: Option<u32>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u32>,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            attempt: None,
            reason: None,
            delay_ms: None,
            timeout_ms: None,
            elapsed_ms: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task, trigger or sink name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(millis(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(millis(d));
        self
    }

    /// Attaches an elapsed time (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(millis(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

fn millis(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
