//! # Runtime configuration.
//!
//! Provides [`Config`], the settings shared by the scheduler, the retry
//! wrapper, the login state machine and the notification dispatcher.
//!
//! `Config::default()` carries the production values. [`Config::from_env`]
//! overrides them from `SHIFTVISOR_*` variables:
//!
//! | variable                            | field                                  |
//! |-------------------------------------|----------------------------------------|
//! | `SHIFTVISOR_BUS_CAPACITY`           | `bus_capacity`                         |
//! | `SHIFTVISOR_RETRY_ATTEMPTS`         | `retry.policy.max_attempts`            |
//! | `SHIFTVISOR_RETRY_DELAY_SECS`       | `retry.policy.base_delay`              |
//! | `SHIFTVISOR_RETRY_FACTOR`           | `retry.policy.factor`                  |
//! | `SHIFTVISOR_RETRY_JITTER`           | `retry.policy.jitter`                  |
//! | `SHIFTVISOR_ATTEMPT_TIMEOUT_SECS`   | `retry.attempt_timeout` (`0` = none)   |
//! | `SHIFTVISOR_NOTIFY_ATTEMPTS`        | `notify.max_attempts`                  |
//! | `SHIFTVISOR_NOTIFY_DELAY_SECS`      | `notify.base_delay`                    |
//! | `SHIFTVISOR_NOTIFY_FACTOR`          | `notify.factor`                        |
//! | `SHIFTVISOR_LOGIN_ATTEMPTS`         | `login.max_attempts`                   |
//! | `SHIFTVISOR_LOGIN_TIMEOUT_SECS`     | `login.total_timeout`                  |
//! | `SHIFTVISOR_LOGIN_NAV_TIMEOUT_SECS` | `login.nav_timeout`                    |
//! | `SHIFTVISOR_CHALLENGE_ATTEMPTS`     | `challenge.max_attempts`               |
//! | `SHIFTVISOR_POLL_SECS`              | `scheduler.poll_interval` (1..=300)    |
//! | `SHIFTVISOR_UTC_OFFSET`             | `scheduler.utc_offset` (`+08:00`)      |
//! | `SHIFTVISOR_GRACE_SECS`             | `scheduler.grace`                      |
//!
//! ## Sentinel values
//! - Values that do not parse are ignored (the default stays).
//! - Parsed values are clamped into range, never rejected.
//! - `attempt_timeout = 0s` → no per-attempt timeout (default 600s).

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Whole-task retry settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetrySettings {
    /// Policy applied to every trigger without its own override.
    pub policy: BackoffPolicy,
    /// Per-attempt timeout, 600s by default (`Duration::ZERO` = none).
    pub attempt_timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::new(Duration::from_secs(60), 1.0, 3),
            attempt_timeout: Duration::from_secs(600),
        }
    }
}

/// Bounds and pauses of the login state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoginSettings {
    /// Maximum credential submissions.
    pub max_attempts: u32,
    /// Budget for the whole attempt loop, measured from page load.
    pub total_timeout: Duration,
    /// Bound on opening or reloading the entry page.
    pub nav_timeout: Duration,
    /// Pause after opening or reloading the entry page.
    pub load_pause: Duration,
    /// Wait between submit and reading the location.
    pub settle: Duration,
    /// Pause between unsuccessful attempts.
    pub retry_pause: Duration,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            total_timeout: Duration::from_secs(300),
            nav_timeout: Duration::from_secs(60),
            load_pause: Duration::from_secs(2),
            settle: Duration::from_secs(3),
            retry_pause: Duration::from_secs(2),
        }
    }
}

/// Bounds of the challenge-solving sub-loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChallengeSettings {
    /// Classification attempts before giving up.
    pub max_attempts: u32,
    /// Pause after requesting a fresh challenge.
    pub refresh_pause: Duration,
    /// Number of digits a valid answer has.
    pub expected_len: usize,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            refresh_pause: Duration::from_millis(600),
            expected_len: 4,
        }
    }
}

/// Poll loop and shutdown settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Cadence of trigger evaluation.
    pub poll_interval: Duration,
    /// Reference timezone of every trigger time.
    pub utc_offset: FixedOffset,
    /// Maximum wait for an in-flight job at shutdown.
    pub grace: Duration,
}

impl SchedulerSettings {
    /// Shortest accepted poll interval.
    pub const MIN_POLL: Duration = Duration::from_secs(1);
    /// Longest accepted poll interval.
    pub const MAX_POLL: Duration = Duration::from_secs(300);

    /// Default reference offset, UTC+08:00.
    pub fn default_offset() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Returns a copy with the poll interval clamped into range.
    pub fn normalized(mut self) -> Self {
        self.poll_interval = self.poll_interval.clamp(Self::MIN_POLL, Self::MAX_POLL);
        self
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            utc_offset: Self::default_offset(),
            grace: Duration::from_secs(60),
        }
    }
}

/// Settings for the whole runtime.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
    /// Default whole-task retry.
    pub retry: RetrySettings,
    /// Notification delivery policy.
    pub notify: BackoffPolicy,
    /// Login state machine bounds.
    pub login: LoginSettings,
    /// Challenge sub-loop bounds.
    pub challenge: ChallengeSettings,
    /// Scheduler loop.
    pub scheduler: SchedulerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            retry: RetrySettings::default(),
            notify: BackoffPolicy::new(Duration::from_secs(2), 2.0, 3),
            login: LoginSettings::default(),
            challenge: ChallengeSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl Config {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let float = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());
        let secs = |key: &str| num(key).map(Duration::from_secs);
        let count = |key: &str| num(key).map(|n| n.min(u64::from(u32::MAX)) as u32);

        if let Some(n) = num("SHIFTVISOR_BUS_CAPACITY") {
            cfg.bus_capacity = usize::try_from(n).unwrap_or(usize::MAX).max(1);
        }

        let retry = &mut cfg.retry.policy;
        if let Some(n) = count("SHIFTVISOR_RETRY_ATTEMPTS") {
            retry.max_attempts = n;
        }
        if let Some(d) = secs("SHIFTVISOR_RETRY_DELAY_SECS") {
            retry.base_delay = d;
        }
        if let Some(f) = float("SHIFTVISOR_RETRY_FACTOR") {
            retry.factor = f;
        }
        if let Some(j) = lookup("SHIFTVISOR_RETRY_JITTER").and_then(|v| parse_jitter(&v)) {
            retry.jitter = j;
        }
        *retry = retry.normalized();
        if let Some(d) = secs("SHIFTVISOR_ATTEMPT_TIMEOUT_SECS") {
            cfg.retry.attempt_timeout = d;
        }

        if let Some(n) = count("SHIFTVISOR_NOTIFY_ATTEMPTS") {
            cfg.notify.max_attempts = n;
        }
        if let Some(d) = secs("SHIFTVISOR_NOTIFY_DELAY_SECS") {
            cfg.notify.base_delay = d;
        }
        if let Some(f) = float("SHIFTVISOR_NOTIFY_FACTOR") {
            cfg.notify.factor = f;
        }
        cfg.notify = cfg.notify.normalized();

        if let Some(n) = count("SHIFTVISOR_LOGIN_ATTEMPTS") {
            cfg.login.max_attempts = n.max(1);
        }
        if let Some(d) = secs("SHIFTVISOR_LOGIN_TIMEOUT_SECS") {
            cfg.login.total_timeout = d.max(Duration::from_secs(1));
        }
        if let Some(d) = secs("SHIFTVISOR_LOGIN_NAV_TIMEOUT_SECS") {
            cfg.login.nav_timeout = d.max(Duration::from_secs(1));
        }
        if let Some(n) = count("SHIFTVISOR_CHALLENGE_ATTEMPTS") {
            cfg.challenge.max_attempts = n.max(1);
        }

        if let Some(d) = secs("SHIFTVISOR_POLL_SECS") {
            cfg.scheduler.poll_interval = d;
        }
        if let Some(off) = lookup("SHIFTVISOR_UTC_OFFSET").and_then(|v| parse_utc_offset(&v)) {
            cfg.scheduler.utc_offset = off;
        }
        if let Some(d) = secs("SHIFTVISOR_GRACE_SECS") {
            cfg.scheduler.grace = d;
        }
        cfg.scheduler = cfg.scheduler.normalized();

        cfg
    }
}

/// Parses a jitter name (`none`, `full`, `equal`, `decorrelated`).
pub fn parse_jitter(s: &str) -> Option<JitterPolicy> {
    match s.trim().to_ascii_lowercase().as_str() {
        "none" => Some(JitterPolicy::None),
        "full" => Some(JitterPolicy::Full),
        "equal" => Some(JitterPolicy::Equal),
        "decorrelated" => Some(JitterPolicy::Decorrelated),
        _ => None,
    }
}

/// Parses `+HH:MM`, `-HH:MM`, `+HH` or a bare hour count such as `8`.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => (1, s),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..=23).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_production_values() {
        let cfg = Config::default();
        assert_eq!(cfg.retry.policy.max_attempts, 3);
        assert_eq!(cfg.retry.policy.base_delay, Duration::from_secs(60));
        assert_eq!(cfg.retry.attempt_timeout, Duration::from_secs(600));
        assert_eq!(cfg.login.nav_timeout, Duration::from_secs(60));
        assert_eq!(cfg.notify.max_attempts, 3);
        assert_eq!(cfg.notify.base_delay, Duration::from_secs(2));
        assert_eq!(cfg.login.max_attempts, 10);
        assert_eq!(cfg.login.total_timeout, Duration::from_secs(300));
        assert_eq!(cfg.challenge.expected_len, 4);
        assert_eq!(cfg.scheduler.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.scheduler.utc_offset.local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn overrides_are_clamped_not_rejected() {
        let cfg = Config::from_lookup(lookup(&[
            ("SHIFTVISOR_RETRY_ATTEMPTS", "0"),
            ("SHIFTVISOR_RETRY_DELAY_SECS", "0"),
            ("SHIFTVISOR_RETRY_FACTOR", "0.5"),
            ("SHIFTVISOR_POLL_SECS", "3600"),
            ("SHIFTVISOR_LOGIN_ATTEMPTS", "0"),
            ("SHIFTVISOR_LOGIN_NAV_TIMEOUT_SECS", "0"),
            ("SHIFTVISOR_ATTEMPT_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(cfg.retry.policy.max_attempts, 1);
        assert_eq!(cfg.retry.policy.base_delay, BackoffPolicy::MIN_DELAY);
        assert_eq!(cfg.retry.policy.factor, 1.0);
        assert_eq!(cfg.scheduler.poll_interval, SchedulerSettings::MAX_POLL);
        assert_eq!(cfg.login.max_attempts, 1);
        assert_eq!(cfg.login.nav_timeout, Duration::from_secs(1));
        assert_eq!(cfg.retry.attempt_timeout, Duration::ZERO);
    }

    #[test]
    fn garbage_values_keep_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            ("SHIFTVISOR_RETRY_ATTEMPTS", "many"),
            ("SHIFTVISOR_UTC_OFFSET", "tokyo"),
            ("SHIFTVISOR_RETRY_JITTER", "chaotic"),
        ]));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn offset_and_jitter_parse() {
        let cfg = Config::from_lookup(lookup(&[
            ("SHIFTVISOR_UTC_OFFSET", "-05:30"),
            ("SHIFTVISOR_RETRY_JITTER", "Equal"),
            ("SHIFTVISOR_ATTEMPT_TIMEOUT_SECS", "90"),
        ]));
        assert_eq!(cfg.scheduler.utc_offset.local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(cfg.retry.policy.jitter, JitterPolicy::Equal);
        assert_eq!(cfg.retry.attempt_timeout, Duration::from_secs(90));
        assert_eq!(parse_utc_offset("8").map(|o| o.local_minus_utc()), Some(8 * 3600));
        assert_eq!(parse_utc_offset("+25:00"), None);
    }
}
