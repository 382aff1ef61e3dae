//! # Jobs file.
//!
//! The binary reads its triggers from a TOML file:
//!
//! ```toml
//! [[job]]
//! name = "checkin-morning"
//! at = "07:00"
//! program = "/opt/portal/checkin.sh"
//! args = ["--shift", "morning"]
//! env = { PORTAL_HEADLESS = "1" }
//! attempt_timeout_secs = 600
//!
//! [[job]]
//! name = "daily-report"
//! at = "19:00:30"
//! program = "/opt/portal/report.sh"
//! notify = false
//! retry = { attempts = 5, delay_secs = 30, factor = 2.0, jitter = "equal" }
//! ```
//!
//! Every job runs under the configured retry policy; a `retry` table
//! overrides individual fields, clamped like environment overrides.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Deserialize;

use crate::{
    core::{Config, SchedulerTrigger},
    error::RuntimeError,
    notify::NotificationDispatcher,
    policies::{BackoffPolicy, JitterPolicy},
    tasks::CommandTask,
};

/// Parsed jobs file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsFile {
    /// Jobs in file order.
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobSpec>,
}

/// One `[[job]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Unique trigger name.
    pub name: String,
    /// Time of day in the reference timezone, `HH:MM` or `HH:MM:SS`.
    pub at: String,
    /// Program to run.
    pub program: PathBuf,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the program.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Per-attempt timeout; `0` disables it. Defaults to the configured value.
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
    /// Whether outcomes are sent to the notification sink.
    #[serde(default = "default_notify")]
    pub notify: bool,
    /// Field-wise overrides of the configured retry policy.
    #[serde(default)]
    pub retry: Option<RetryOverride>,
}

fn default_notify() -> bool {
    true
}

/// Field-wise retry overrides.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryOverride {
    /// Maximum attempts (min 1).
    pub attempts: Option<u32>,
    /// Base delay in seconds (min 1).
    pub delay_secs: Option<u64>,
    /// Growth factor (min 1.0).
    pub factor: Option<f64>,
    /// Delay cap in seconds.
    pub max_delay_secs: Option<u64>,
    /// Jitter applied to sleeps.
    pub jitter: Option<JitterPolicy>,
}

impl JobsFile {
    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self, RuntimeError> {
        let file: JobsFile = toml::from_str(text).map_err(|e| RuntimeError::Config {
            reason: e.to_string(),
        })?;
        file.validate()?;
        Ok(file)
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let text = std::fs::read_to_string(path).map_err(|e| RuntimeError::Config {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::parse(&text)
    }

    /// Looks a job up by name.
    pub fn find(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| j.name == name)
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(config_err("job with an empty name"));
            }
            if !seen.insert(job.name.as_str()) {
                return Err(config_err(format!("duplicate job name {:?}", job.name)));
            }
            job.time()?;
        }
        Ok(())
    }
}

impl JobSpec {
    /// Parsed time of day.
    pub fn time(&self) -> Result<NaiveTime, RuntimeError> {
        let at = self.at.trim();
        NaiveTime::parse_from_str(at, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(at, "%H:%M"))
            .map_err(|_| config_err(format!("job {:?}: invalid time {:?}", self.name, self.at)))
    }

    /// `base` with this job's overrides applied, normalized.
    pub fn policy(&self, base: &BackoffPolicy) -> BackoffPolicy {
        let mut p = *base;
        if let Some(o) = &self.retry {
            if let Some(n) = o.attempts {
                p.max_attempts = n;
            }
            if let Some(s) = o.delay_secs {
                p.base_delay = Duration::from_secs(s);
            }
            if let Some(f) = o.factor {
                p.factor = f;
            }
            if let Some(s) = o.max_delay_secs {
                p.max_delay = Duration::from_secs(s);
            }
            if let Some(j) = o.jitter {
                p.jitter = j;
            }
        }
        p.normalized()
    }

    /// The external program this job runs.
    pub fn command(&self) -> CommandTask {
        let mut cmd = CommandTask::new(self.name.clone(), self.program.clone()).args(self.args.iter().cloned());
        for (k, v) in &self.env {
            cmd = cmd.env(k.clone(), v.clone());
        }
        if let Some(dir) = &self.workdir {
            cmd = cmd.current_dir(dir.clone());
        }
        cmd
    }

    /// Builds the scheduler trigger; `notifier` is attached only when the job notifies.
    pub fn to_trigger(
        &self,
        cfg: &Config,
        notifier: Option<Arc<NotificationDispatcher>>,
    ) -> Result<SchedulerTrigger, RuntimeError> {
        let timeout = self
            .attempt_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(cfg.retry.attempt_timeout);

        let mut trigger = SchedulerTrigger::new(self.name.as_str(), self.time()?, self.command().into_ref())
            .with_retry(self.policy(&cfg.retry.policy))
            .with_attempt_timeout(timeout);
        if let Some(n) = notifier.filter(|_| self.notify) {
            trigger = trigger.with_notifier(n);
        }
        Ok(trigger)
    }
}

fn config_err(reason: impl Into<String>) -> RuntimeError {
    RuntimeError::Config {
        reason: reason.into(),
    }
}
