//! # External-program task (`CommandTask`)
//!
//! Runs one program per attempt. Exit status `0` is success; a non-zero exit
//! is a retryable [`TaskError::Fail`] carrying the tail of stderr; a program
//! that cannot be spawned at all is [`TaskError::Fatal`].
//!
//! The child is killed if the attempt future is dropped (per-attempt timeout).
//!
//! ## Example
//! ```rust
//! use shiftvisor::{CommandTask, TaskRef};
//!
//! let t: TaskRef = CommandTask::new("checkin", "/opt/portal/checkin.sh")
//!     .arg("--headless")
//!     .env("PORTAL_USER", "alice")
//!     .into_ref();
//! assert_eq!(t.name(), "checkin");
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::TaskError;
use crate::tasks::task::{Task, TaskRef};

/// Longest stderr excerpt carried in a failure reason.
const STDERR_TAIL: usize = 512;

/// Task that runs an external program.
#[derive(Debug, Clone)]
pub struct CommandTask {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    workdir: Option<PathBuf>,
}

impl CommandTask {
    /// Creates a task running `program` with no arguments.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            workdir: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets one environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Runs the child in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Wraps the task in a shared handle.
    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }
}

#[async_trait]
impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), TaskError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| {
            TaskError::fatal(format!("cannot spawn {}: {e}", self.program.display()))
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
            Some((idx, _)) => &stderr[idx..],
            None => stderr,
        };
        Err(TaskError::fail(if tail.is_empty() {
            output.status.to_string()
        } else {
            format!("{}: {tail}", output.status)
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_is_success() {
        let t = CommandTask::new("ok", "sh").args(["-c", "exit 0"]);
        assert_eq!(t.run().await, Ok(()));
    }

    #[tokio::test]
    async fn non_zero_exit_is_retryable_failure_with_stderr() {
        let t = CommandTask::new("bad", "sh").args(["-c", "echo nope >&2; exit 3"]);
        let err = t.run().await.expect_err("must fail");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("nope"), "{err}");
    }

    #[tokio::test]
    async fn missing_program_is_fatal() {
        let t = CommandTask::new("ghost", "/definitely/not/here");
        let err = t.run().await.expect_err("must fail");
        assert!(matches!(err, TaskError::Fatal { .. }));
    }

    #[tokio::test]
    async fn env_reaches_child() {
        let t = CommandTask::new("env", "sh")
            .args(["-c", "test \"$SHIFT\" = evening"])
            .env("SHIFT", "evening");
        assert_eq!(t.run().await, Ok(()));
    }
}
