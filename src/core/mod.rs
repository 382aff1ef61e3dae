//! Runtime core: running, retrying and scheduling tasks.
//!
//! - [`runner`]: executes one attempt with timeout, panic capture and event publishing;
//! - [`retry`]: re-runs a task under a backoff policy ([`RetryRunner`]);
//! - [`guard`]: the single-permit [`ExclusionGuard`];
//! - [`trigger`]: daily time-of-day triggers;
//! - [`scheduler`]: the poll loop ([`GuardedScheduler`]);
//! - [`builder`]: wires a scheduler to subscribers and notifiers;
//! - [`config`]: runtime settings and environment overrides;
//! - [`shutdown`]: cross-platform termination signals.

mod builder;
mod config;
mod guard;
mod retry;
mod runner;
mod scheduler;
mod shutdown;
mod trigger;

pub use builder::SchedulerBuilder;
pub use config::{
    ChallengeSettings, Config, LoginSettings, RetrySettings, SchedulerSettings, parse_jitter,
    parse_utc_offset,
};
pub use guard::{ExclusionGuard, GuardPermit};
pub use retry::{RetryOutcome, RetryRunner};
pub use runner::run_once;
pub use scheduler::{GuardedScheduler, PollReport};
pub use shutdown::wait_for_shutdown_signal;
pub use trigger::{DAY, SchedulerTrigger, next_fire};

pub(crate) use runner::panic_message;
