//! # Process-wide mutual exclusion for scheduled jobs.
//!
//! [`ExclusionGuard`] is a single-permit [`Semaphore`]. A trigger that fires
//! while another job holds the permit is **skipped**, never queued.
//!
//! The permit is released when the [`GuardPermit`] is dropped, which covers
//! success, failure, panic and cancellation of the owning job.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Single-holder guard shared by all triggers of a scheduler.
#[derive(Clone, Debug)]
pub struct ExclusionGuard {
    permits: Arc<Semaphore>,
    holder: Arc<Mutex<Option<Arc<str>>>>,
}

/// Proof of exclusive execution; releases the guard on drop.
#[derive(Debug)]
pub struct GuardPermit {
    _permit: OwnedSemaphorePermit,
    holder: Arc<Mutex<Option<Arc<str>>>>,
}

impl Default for ExclusionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ExclusionGuard {
    /// Creates a free guard.
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            holder: Arc::new(Mutex::new(None)),
        }
    }

    /// Takes the guard for `who` if it is free; returns `None` when busy.
    pub fn try_enter(&self, who: impl Into<Arc<str>>) -> Option<GuardPermit> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = Some(who.into());
        Some(GuardPermit {
            _permit: permit,
            holder: Arc::clone(&self.holder),
        })
    }

    /// Returns `true` while some job holds the guard.
    pub fn is_held(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Name of the current holder, if any.
    pub fn holder(&self) -> Option<Arc<str>> {
        self.holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        // cleared before the semaphore permit field is released
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
