//! Outcome report sent after each scheduled job.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::core::RetryOutcome;

/// Title and body describing how a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// One-line headline carrying the job name and outcome.
    pub title: String,
    /// Markdown body.
    pub body: String,
}

impl JobReport {
    /// Builds the report for `job`, stamped with `finished_at` in the reference timezone.
    pub fn compose(job: &str, outcome: &RetryOutcome, finished_at: DateTime<FixedOffset>) -> Self {
        let verdict = if outcome.succeeded { "succeeded" } else { "failed" };
        let title = format!("{job} {verdict} ({})", finished_at.format("%m-%d %H:%M"));

        let mut body = format!(
            "**Job**: {job}\n\n**Date**: {}\n\n**Time**: {} (UTC{})\n\n**Status**: {verdict}\n\n**Attempts**: {}\n\n**Elapsed**: {}",
            finished_at.format("%Y-%m-%d"),
            finished_at.format("%H:%M:%S"),
            finished_at.offset(),
            outcome.attempts_used,
            human_duration(outcome.total_elapsed),
        );
        if let Some(e) = outcome.last_error.as_ref().filter(|_| !outcome.succeeded) {
            body.push_str(&format!("\n\n**Last error**: {e}"));
        }
        Self { title, body }
    }
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, s) => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use chrono::TimeZone;

    fn at() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .expect("valid offset")
            .with_ymd_and_hms(2026, 3, 2, 7, 1, 5)
            .single()
            .expect("valid")
    }

    #[test]
    fn success_report_has_name_and_local_time() {
        let outcome = RetryOutcome {
            succeeded: true,
            attempts_used: 1,
            total_elapsed: Duration::from_secs(42),
            last_error: None,
        };
        let r = JobReport::compose("checkin-morning", &outcome, at());
        assert_eq!(r.title, "checkin-morning succeeded (03-02 07:01)");
        assert!(r.body.contains("**Date**: 2026-03-02"));
        assert!(r.body.contains("07:01:05 (UTC+08:00)"));
        assert!(r.body.contains("**Elapsed**: 42s"));
        assert!(!r.body.contains("Last error"));
    }

    #[test]
    fn failure_report_carries_last_error() {
        let outcome = RetryOutcome {
            succeeded: false,
            attempts_used: 3,
            total_elapsed: Duration::from_secs(3725),
            last_error: Some(TaskError::fail("portal returned 502")),
        };
        let r = JobReport::compose("report", &outcome, at());
        assert!(r.title.starts_with("report failed"));
        assert!(r.body.contains("**Attempts**: 3"));
        assert!(r.body.contains("1h 2m 5s"));
        assert!(r.body.contains("portal returned 502"));
    }
}
