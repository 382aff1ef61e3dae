//! # shiftvisor
//!
//! **Shiftvisor** runs recurring portal chores (check-ins, daily reports) on a
//! fixed daily schedule, recovers from transient failure and reports every
//! outcome through a best-effort notification channel.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//!     │ SchedulerTrigger │  │ SchedulerTrigger │  │ SchedulerTrigger │
//!     │  07:00 checkin   │  │  19:00 checkin   │  │  19:00 report    │
//!     └────────┬─────────┘  └────────┬─────────┘  └────────┬─────────┘
//!              ▼                     ▼                     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  GuardedScheduler (poll loop, reference timezone)                 │
//! │  - ExclusionGuard (one permit shared by every trigger)            │
//! │  - due times as monotonic Instants, +24h after each firing        │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼ (guard held)
//!                  ┌───────────────────────────┐
//!                  │ RetryRunner / run_once    │──► Task::run()
//!                  │ (BackoffPolicy)           │      └─ e.g. LoginSession
//!                  └─────────────┬─────────────┘           └─ ChallengeSolver
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │ NotificationDispatcher    │──► NotificationSink
//!                  │ (own BackoffPolicy)       │
//!                  └─────────────┬─────────────┘
//!                                ▼ (guard released)
//!
//! every component ──► Bus (broadcast) ──► SubscriberSet ──► LogWriter (tracing)
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                                 |
//! |-------------------|----------------------------------------------------------|----------------------------------------------------|
//! | **Scheduling**    | Daily triggers without overlap.                          | [`GuardedScheduler`], [`SchedulerTrigger`]         |
//! | **Retries**       | Whole-task retry with backoff.                           | [`RetryRunner`], [`BackoffPolicy`]                 |
//! | **Login**         | Attempt- and deadline-bounded login with challenges.     | [`LoginSession`], [`ChallengeSolver`]              |
//! | **Notifications** | Best-effort outcome reports.                             | [`NotificationDispatcher`], [`NotificationSink`]   |
//! | **Tasks**         | Closures or external programs.                           | [`Task`], [`TaskFn`], [`CommandTask`]              |
//! | **Events**        | Structured lifecycle events for subscribers.             | [`Subscribe`], [`Event`], [`EventKind`]            |
//! | **Errors**        | Typed errors per boundary.                               | [`TaskError`], [`LoginError`], [`RuntimeError`]    |
//! | **Configuration** | Defaults, `SHIFTVISOR_*` overrides and a jobs file.      | [`Config`], [`JobsFile`]                           |
//!
//! ## Optional features
//! - `logging` (default): exports the [`LogWriter`] subscriber.
//! - `wxpush` (default): WxPush / WxPusher HTTP sinks.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use shiftvisor::{BackoffPolicy, RetryRunner, TaskError, TaskFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let task = TaskFn::new("checkin", || async {
//!         // drive the portal...
//!         Ok::<_, TaskError>(())
//!     });
//!
//!     let runner = RetryRunner::new(BackoffPolicy::new(Duration::from_secs(60), 1.0, 3));
//!     let outcome = runner.run(&task).await;
//!     assert!(outcome.succeeded);
//!     assert_eq!(outcome.attempts_used, 1);
//! }
//! ```
mod auth;
mod core;
mod error;
mod events;
mod jobs;
mod notify;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use auth::{
    ChallengeClassifier, ChallengeResult, ChallengeSolver, ChallengeSource, Credentials,
    LoginPage, LoginReport, LoginSession, LoginState,
};
pub use crate::core::{
    ChallengeSettings, Config, DAY, ExclusionGuard, GuardPermit, GuardedScheduler, LoginSettings,
    PollReport, RetryOutcome, RetryRunner, RetrySettings, SchedulerBuilder, SchedulerSettings,
    SchedulerTrigger, next_fire, parse_jitter, parse_utc_offset, run_once,
    wait_for_shutdown_signal,
};
pub use error::{ChallengeError, LoginError, NotifyError, PageError, RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use jobs::{JobSpec, JobsFile, RetryOverride};
pub use notify::{DeliveryReport, JobReport, NotificationDispatcher, NotificationSink};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{CommandTask, Task, TaskFn, TaskRef};

// HTTP notification sinks.
// Enable with: `--features wxpush`
#[cfg(feature = "wxpush")]
pub use notify::{WXPUSHER_ENDPOINT, WxPushSink, WxPusherSink, sink_from_env};

// Built-in subscriber rendering events through `tracing`.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
