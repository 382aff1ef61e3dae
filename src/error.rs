//! Error types used by the shiftvisor runtime, tasks and collaborators.
//!
//! Each component boundary has its own enum so that structural faults,
//! transient faults and exhaustion are told apart by type:
//!
//! - [`RuntimeError`] errors raised by the scheduler runtime itself.
//! - [`TaskError`] errors raised by one execution of a task.
//! - [`PageError`] faults reported by the page/action layer.
//! - [`ChallengeError`] why a challenge could not be solved.
//! - [`LoginError`] terminal failures of a login session.
//! - [`NotifyError`] why a notification sink refused a message.
//!
//! All of them provide `as_label` for logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the scheduler runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded while a job was still running.
    #[error("shutdown timeout {grace:?} exceeded; still running: {running:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Name of the trigger whose job did not finish in time.
        running: Option<String>,
    },

    /// The configuration could not be loaded.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use shiftvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), running: None };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Config { .. } => "runtime_config",
        }
    }
}

/// # Errors produced by one task execution.
///
/// `Fail` and `Timeout` are retryable; `Fatal` is structural and stops the
/// retry loop; `Panicked` is a caught fault and is retried like a failure.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Execution exceeded its per-attempt timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable error (should not be retried).
    #[error("fatal error (no retry): {reason}")]
    Fatal {
        /// The underlying error message.
        reason: String,
    },

    /// Execution failed but may succeed if retried.
    #[error("execution failed: {reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// The task body panicked; the panic was caught by the runner.
    #[error("task panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(reason: impl Into<String>) -> Self {
        TaskError::Fail {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(reason: impl Into<String>) -> Self {
        TaskError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use shiftvisor::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }

    /// Indicates whether another attempt may help.
    ///
    /// # Example
    /// ```
    /// use shiftvisor::TaskError;
    ///
    /// assert!(TaskError::fail("boom").is_retryable());
    /// assert!(!TaskError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::Fatal { .. })
    }
}

/// # Faults reported by the page/action layer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// The page could not be loaded at all.
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        /// Target location.
        url: String,
        /// Underlying cause.
        reason: String,
    },

    /// An expected element was missing or not interactable.
    #[error("element {selector} unavailable: {reason}")]
    Element {
        /// Which element.
        selector: String,
        /// Underlying cause.
        reason: String,
    },

    /// The action layer gave up waiting.
    #[error("page action timed out after {timeout:?}")]
    Timeout {
        /// How long it waited.
        timeout: Duration,
    },

    /// Anything else.
    #[error("page error: {0}")]
    Other(String),
}

/// # Why a challenge could not be solved.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    /// No classifier is configured. A configuration fact, not a transient fault.
    #[error("challenge classifier unavailable")]
    ClassifierUnavailable,

    /// The challenge image could not be acquired.
    #[error("challenge image unavailable: {0}")]
    Acquisition(PageError),

    /// Every attempt produced an invalid answer.
    #[error("challenge not solved after {attempts} attempts")]
    Exhausted {
        /// Classifier calls made.
        attempts: u32,
    },
}

impl ChallengeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChallengeError::ClassifierUnavailable => "challenge_classifier_unavailable",
            ChallengeError::Acquisition(_) => "challenge_acquisition",
            ChallengeError::Exhausted { .. } => "challenge_exhausted",
        }
    }
}

/// # Terminal failures of a login session.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The entry page could not be opened. Structural, never retried.
    #[error("login page unreachable: {0}")]
    Navigation(PageError),

    /// The attempt budget ran out.
    #[error("login failed after {attempts} attempts")]
    AttemptsExhausted {
        /// Attempts consumed.
        attempts: u32,
    },

    /// The time budget ran out.
    #[error("login deadline of {timeout:?} exceeded after {attempts} attempts")]
    DeadlineExceeded {
        /// Configured total timeout.
        timeout: Duration,
        /// Attempts consumed.
        attempts: u32,
    },
}

impl LoginError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LoginError::Navigation(_) => "login_navigation",
            LoginError::AttemptsExhausted { .. } => "login_attempts_exhausted",
            LoginError::DeadlineExceeded { .. } => "login_deadline_exceeded",
        }
    }

    /// `true` for faults that another attempt cannot fix.
    pub fn is_structural(&self) -> bool {
        matches!(self, LoginError::Navigation(_))
    }
}

impl From<LoginError> for TaskError {
    fn from(err: LoginError) -> Self {
        if err.is_structural() {
            TaskError::fatal(err.to_string())
        } else {
            TaskError::fail(err.to_string())
        }
    }
}

/// # Why a notification sink refused a message.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered but did not accept the message.
    #[error("rejected by service: {0}")]
    Rejected(String),

    /// The response could not be understood.
    #[error("unreadable response: {0}")]
    Decode(String),
}
