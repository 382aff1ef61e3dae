//! # Jitter for retry sleeps.
//!
//! [`JitterPolicy`] randomizes the sleep between retries so that several
//! processes hitting the same portal at the same scheduled minute do not retry
//! in lockstep.
//!
//! - [`JitterPolicy::None`] exact delay (default)
//! - [`JitterPolicy::Full`] random in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`] random in `[base, delay × 3]`, capped
//!
//! Jitter never feeds back into [`BackoffPolicy::next_delay`](crate::BackoffPolicy::next_delay);
//! it only shapes [`BackoffPolicy::sleep_delay`](crate::BackoffPolicy::sleep_delay).

use rand::Rng;
use std::time::Duration;

/// Randomization strategy for retry sleeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Exact backoff delay.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// `delay/2 + random[0, delay/2]`; keeps about 75% of the delay on average.
    Equal,
    /// Random delay in `[base, delay × 3]`, capped at the policy maximum.
    ///
    /// Needs extra context, see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    ///
    /// `Decorrelated` returns the input unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
        }
    }

    /// Applies decorrelated jitter with full context.
    ///
    /// Falls back to [`apply`](Self::apply) for the other variants.
    pub fn apply_decorrelated(&self, base: Duration, delay: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(delay);
        }

        let base_ms = base.as_millis() as u64;
        let max_ms = max.as_millis() as u64;
        let upper = (delay.as_millis() as u64).saturating_mul(3).min(max_ms).max(base_ms);

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return delay;
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity() {
        let d = Duration::from_millis(1234);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn test_full_jitter_bounds() {
        for _ in 0..100 {
            assert!(JitterPolicy::Full.apply(Duration::from_secs(2)) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_decorrelated_bounds() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(10);
        for _ in 0..100 {
            let d = JitterPolicy::Decorrelated.apply_decorrelated(base, Duration::from_secs(2), max);
            assert!(d >= base);
            assert!(d <= Duration::from_secs(6));
        }
    }
}
