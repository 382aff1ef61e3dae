//! # Backoff policy for retrying tasks.
//!
//! [`BackoffPolicy`] controls how many times an operation is tried and how long
//! to wait between tries. It is parameterized by:
//! - [`BackoffPolicy::base_delay`] the delay after the first failed attempt;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max_attempts`] the attempt budget;
//! - [`BackoffPolicy::max_delay`] the cap that keeps huge exponents finite.
//!
//! The delay after attempt `n` (1-based) is `base_delay × factor^(n-1)`,
//! clamped to `[MIN_DELAY, max_delay]`. Jitter is only applied by
//! [`BackoffPolicy::sleep_delay`], so [`BackoffPolicy::next_delay`] stays pure.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use shiftvisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::new(Duration::from_secs(2), 2.0, 4);
//!
//! assert_eq!(backoff.next_delay(1), Duration::from_secs(2));
//! assert_eq!(backoff.next_delay(2), Duration::from_secs(4));
//! assert_eq!(backoff.next_delay(3), Duration::from_secs(8));
//!
//! // Malformed input is normalized at construction.
//! let odd = BackoffPolicy::new(Duration::ZERO, 0.5, 0);
//! assert_eq!(odd.max_attempts, 1);
//! assert_eq!(odd.next_delay(1), BackoffPolicy::MIN_DELAY);
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
///
/// Build it with [`BackoffPolicy::new`] or normalize a hand-built value with
/// [`BackoffPolicy::normalized`]; both guarantee `base_delay >= MIN_DELAY`,
/// `factor >= 1.0`, `max_attempts >= 1` and `max_delay >= base_delay`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Multiplicative growth factor (`>= 1.0`).
    pub factor: f64,
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Randomization applied by [`BackoffPolicy::sleep_delay`].
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `base_delay = 60s`;
    /// - `factor = 1.0` (constant delay);
    /// - `max_attempts = 3`;
    /// - `max_delay = 1h`, no jitter.
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 1.0, 3)
    }
}

impl BackoffPolicy {
    /// Smallest delay ever returned.
    pub const MIN_DELAY: Duration = Duration::from_secs(1);

    /// Default cap for a single delay.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(3600);

    /// Creates a normalized policy without jitter.
    pub fn new(base_delay: Duration, factor: f64, max_attempts: u32) -> Self {
        Self {
            base_delay,
            factor,
            max_attempts,
            max_delay: Self::DEFAULT_MAX_DELAY,
            jitter: JitterPolicy::None,
        }
        .normalized()
    }

    /// Returns a copy with the same parameters and the given jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns a normalized copy with the given delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self.normalized()
    }

    /// Clamps every field into its safe range.
    pub fn normalized(mut self) -> Self {
        self.base_delay = self.base_delay.max(Self::MIN_DELAY);
        if !self.factor.is_finite() || self.factor < 1.0 {
            self.factor = 1.0;
        }
        self.max_attempts = self.max_attempts.max(1);
        self.max_delay = self.max_delay.max(self.base_delay);
        self
    }

    /// Computes the wait after the given attempt (1-based, `0` is treated as `1`).
    ///
    /// Deterministic and non-decreasing in `attempt`. Never below
    /// [`BackoffPolicy::MIN_DELAY`].
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exp);

        let delay = if !secs.is_finite() || secs > self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        };
        delay.max(Self::MIN_DELAY)
    }

    /// The delay retry loops actually sleep: [`next_delay`](Self::next_delay)
    /// with jitter applied, floored at [`BackoffPolicy::MIN_DELAY`].
    pub fn sleep_delay(&self, attempt: u32) -> Duration {
        let base = self.next_delay(attempt);
        let jittered = match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.base_delay, base, self.max_delay)
            }
            _ => self.jitter.apply(base),
        };
        jittered.max(Self::MIN_DELAY)
    }

    /// Returns `true` if another attempt is allowed after `attempt`.
    #[inline]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
