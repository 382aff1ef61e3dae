//! # Task abstraction.
//!
//! A [`Task`] is one end-to-end unit of external work (log in, navigate,
//! submit a report). It has a stable [`name`](Task::name) and an async
//! [`run`](Task::run) that reports success as `Ok(())`.
//!
//! The retry runner may call `run` several times, so implementations must be
//! safe to repeat. Each call should start from a clean external state (for
//! example a fresh browser context).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, repeatable unit of work.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use shiftvisor::{Task, TaskError};
///
/// struct Ping;
///
/// #[async_trait]
/// impl Task for Ping {
///     fn name(&self) -> &str { "ping" }
///
///     async fn run(&self) -> Result<(), TaskError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Performs the work once.
    ///
    /// Return [`TaskError::Fatal`] for faults another attempt cannot fix.
    async fn run(&self) -> Result<(), TaskError>;
}
