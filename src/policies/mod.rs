//! Retry policies.
//!
//! This module groups the knobs that control **how often** an operation is
//! tried and **how long** to wait between tries.
//!
//! ## Contents
//! - [`BackoffPolicy`] attempt budget and delay growth (base / factor / cap)
//! - [`JitterPolicy`]  randomization of the actual sleep
//!
//! ## Quick wiring
//! ```text
//! RetryRunner            ─► policy.max_attempts, policy.sleep_delay(attempt)
//! NotificationDispatcher ─► its own BackoffPolicy (shorter delays)
//! SchedulerTrigger       ─► optional BackoffPolicy wrapping the bound task
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → base=60s, factor=1.0, attempts=3, cap=1h.
//! - `JitterPolicy::None`.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
