//! # Event subscribers for the shiftvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`]
//! fan-out and (with the `logging` feature) the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Components ── publish(Event) ──► Bus ──► SubscriberSet::listen_until
//!                                               │
//!                                        ┌──────┴──────┬─────────┐
//!                                        ▼             ▼         ▼
//!                                    LogWriter      Metrics    Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
