//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `GuardedScheduler`, `RetryRunner`, `run_once`,
//!   `LoginSession`, `ChallengeSolver`, `NotificationDispatcher`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `SubscriberSet::listen_until` fans events out to subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
