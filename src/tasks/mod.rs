//! # Task abstractions.
//!
//! This module provides the core task-related types:
//! - [`Task`] - trait for repeatable async units of work
//! - [`TaskRef`] - shared reference to a task (`Arc<dyn Task>`)
//! - [`TaskFn`] - closure-backed implementation
//! - [`CommandTask`] - external-program implementation

mod command;
mod task;
mod task_fn;

pub use command::CommandTask;
pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
