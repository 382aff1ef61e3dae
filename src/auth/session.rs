//! # Login state machine.
//!
//! [`LoginSession`] drives a [`LoginPage`] through credential submission
//! under two bounds at once: an attempt count and a wall-clock deadline.
//!
//! ```text
//!  Init ──open(entry)──► PageLoaded ──► AttemptInProgress ──location changed──► Verified
//!   │ navigation fault                     │    ▲
//!   ▼                                      │    └── challenge failed / location unchanged /
//!  Failed ◄── attempts or deadline spent ──┘        page fault (logged, not re-thrown)
//! ```
//!
//! Opening and reloading the entry page are bounded by `nav_timeout`. The
//! deadline starts when the entry page has loaded. Each attempt runs under
//! `tokio::time::timeout(remaining budget)` and the pauses between attempts
//! are cut short at the deadline, so a hung page call cannot outlive it.
//!
//! "Location changed" (current location differs from the entry URL) is the
//! only success signal.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};

use crate::{
    auth::challenge::{ChallengeSolver, ChallengeSource},
    core::{Config, LoginSettings},
    error::{ChallengeError, LoginError, PageError},
    events::{Bus, Event, EventKind},
};

/// Page-level actions the login flow needs.
#[async_trait]
pub trait LoginPage: Send + Sync {
    /// Navigates to `url` and waits for it to settle.
    async fn open(&self, url: &str) -> Result<(), PageError>;

    /// Reloads the current page.
    async fn reload(&self) -> Result<(), PageError>;

    /// Types username and password into the form.
    async fn fill_credentials(&self, credentials: &Credentials) -> Result<(), PageError>;

    /// Enters the challenge answer and submits the form.
    async fn submit(&self, answer: &str) -> Result<(), PageError>;

    /// Closes the post-login notice dialog. A missing dialog is `Ok(())`.
    async fn dismiss_notice(&self) -> Result<(), PageError>;

    /// Location the page currently shows.
    async fn current_location(&self) -> Result<String, PageError>;
}

/// Username and password. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Secret.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Nothing done yet.
    Init,
    /// Entry page loaded; the deadline is running.
    PageLoaded,
    /// Credentials are being submitted.
    AttemptInProgress,
    /// Location changed after a submission.
    Verified,
    /// A bound was exhausted or the entry page was unreachable.
    Failed,
}

/// Summary of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReport {
    /// Attempts consumed, the successful one included.
    pub attempts: u32,
    /// Time from `run` entry to verification.
    pub elapsed: Duration,
    /// Location reached after login.
    pub location: String,
}

enum AttemptOutcome {
    Verified(String),
    Unverified,
    Challenge(ChallengeError),
}

/// One login run against one entry URL.
pub struct LoginSession {
    entry_url: String,
    settings: LoginSettings,
    state: LoginState,
    attempt: u32,
    started: Option<Instant>,
    deadline: Option<Instant>,
    bus: Bus,
}

impl LoginSession {
    /// Creates a session in [`LoginState::Init`].
    pub fn new(entry_url: impl Into<String>, settings: LoginSettings) -> Self {
        Self {
            entry_url: entry_url.into(),
            settings: LoginSettings {
                max_attempts: settings.max_attempts.max(1),
                ..settings
            },
            state: LoginState::Init,
            attempt: 0,
            started: None,
            deadline: None,
            bus: Bus::new(16),
        }
    }

    /// Creates a session bounded by `cfg.login`, publishing on `bus`.
    pub fn from_config(entry_url: impl Into<String>, cfg: &Config, bus: Bus) -> Self {
        Self::new(entry_url, cfg.login).with_bus(bus)
    }

    /// Publishes login events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Current state.
    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// When the last `run` started.
    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    /// Deadline of the attempt loop, once the page has loaded.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs the whole flow until `Verified` or `Failed`.
    pub async fn run(
        &mut self,
        page: &dyn LoginPage,
        challenge: &dyn ChallengeSource,
        solver: &ChallengeSolver,
        credentials: &Credentials,
    ) -> Result<LoginReport, LoginError> {
        let started = Instant::now();
        self.started = Some(started);
        self.state = LoginState::Init;
        self.attempt = 0;

        let nav = self.settings.nav_timeout;
        let opened = match time::timeout(nav, page.open(&self.entry_url)).await {
            Ok(res) => res,
            Err(_elapsed) => Err(PageError::Timeout { timeout: nav }),
        };
        if let Err(e) = opened {
            return Err(self.fail(LoginError::Navigation(e), started));
        }
        time::sleep(self.settings.load_pause).await;

        let deadline = Instant::now() + self.settings.total_timeout;
        self.deadline = Some(deadline);
        self.state = LoginState::PageLoaded;
        self.bus.publish(
            Event::new(EventKind::LoginPageLoaded)
                .with_task(self.entry_url.as_str())
                .with_timeout(self.settings.total_timeout),
        );

        while self.attempt < self.settings.max_attempts && Instant::now() < deadline {
            self.attempt += 1;
            self.state = LoginState::AttemptInProgress;
            self.bus
                .publish(Event::new(EventKind::LoginAttemptStarted).with_attempt(self.attempt));

            let remaining = deadline.saturating_duration_since(Instant::now());
            let res = time::timeout(
                remaining,
                self.attempt_once(page, challenge, solver, credentials),
            )
            .await;
            let pause = match res {
                Ok(Ok(AttemptOutcome::Verified(location))) => {
                    self.state = LoginState::Verified;
                    let elapsed = started.elapsed();
                    self.bus.publish(
                        Event::new(EventKind::LoginVerified)
                            .with_attempt(self.attempt)
                            .with_reason(location.as_str())
                            .with_elapsed(elapsed),
                    );
                    return Ok(LoginReport {
                        attempts: self.attempt,
                        elapsed,
                        location,
                    });
                }
                Ok(Ok(AttemptOutcome::Unverified)) => {
                    self.attempt_failed("location unchanged after submit");
                    self.settings.retry_pause
                }
                Ok(Ok(AttemptOutcome::Challenge(e))) => {
                    self.attempt_failed(&e.to_string());
                    self.settings.load_pause
                }
                Ok(Err(e)) => {
                    self.attempt_failed(&e.to_string());
                    self.settings.retry_pause
                }
                Err(_elapsed) => {
                    self.attempt_failed("attempt cut off by the login deadline");
                    Duration::ZERO
                }
            };
            time::sleep(pause.min(deadline.saturating_duration_since(Instant::now()))).await;
        }

        let err = if Instant::now() >= deadline {
            LoginError::DeadlineExceeded {
                timeout: self.settings.total_timeout,
                attempts: self.attempt,
            }
        } else {
            LoginError::AttemptsExhausted {
                attempts: self.attempt,
            }
        };
        Err(self.fail(err, started))
    }

    async fn attempt_once(
        &self,
        page: &dyn LoginPage,
        challenge: &dyn ChallengeSource,
        solver: &ChallengeSolver,
        credentials: &Credentials,
    ) -> Result<AttemptOutcome, PageError> {
        page.fill_credentials(credentials).await?;

        let answer = match solver.solve(challenge).await {
            Ok(answer) => answer,
            Err(e) => {
                let nav = self.settings.nav_timeout;
                time::timeout(nav, page.reload())
                    .await
                    .map_err(|_| PageError::Timeout { timeout: nav })??;
                return Ok(AttemptOutcome::Challenge(e));
            }
        };

        page.submit(&answer).await?;
        time::sleep(self.settings.settle).await;

        if let Err(e) = page.dismiss_notice().await {
            tracing::debug!(error = %e, "notice dialog not dismissed");
        }

        let location = page.current_location().await?;
        if location != self.entry_url {
            Ok(AttemptOutcome::Verified(location))
        } else {
            Ok(AttemptOutcome::Unverified)
        }
    }

    fn attempt_failed(&self, reason: &str) {
        self.bus.publish(
            Event::new(EventKind::LoginAttemptFailed)
                .with_attempt(self.attempt)
                .with_reason(reason),
        );
    }

    fn fail(&mut self, err: LoginError, started: Instant) -> LoginError {
        self.state = LoginState::Failed;
        self.bus.publish(
            Event::new(EventKind::LoginFailed)
                .with_attempt(self.attempt)
                .with_elapsed(started.elapsed())
                .with_reason(err.to_string()),
        );
        err
    }
}
