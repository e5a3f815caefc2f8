//! Rate-limit guard — shared flag halting outbound calls after a 429.
//!
//! An injected instance (cloned handles share state), not a process global,
//! so tests and multi-tenant setups get isolation.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use inboxpilot_core::error::{PilotError, Result};

/// Fallback backoff when a 429 carries no usable Retry-After.
pub const DEFAULT_BACKOFF_SECS: i64 = 60;

#[derive(Clone, Default)]
pub struct RateLimitGuard {
    reset_at: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl RateLimitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check before an outbound call. Clears an expired trip; errors with
    /// `RateLimited` while one is active.
    pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
        let mut reset_at = self.reset_at.lock().unwrap();
        match *reset_at {
            Some(at) if now < at => Err(PilotError::RateLimited { reset_at: at }),
            Some(_) => {
                *reset_at = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Trip the guard until `reset_at`.
    pub fn trip(&self, reset_at: DateTime<Utc>) {
        tracing::warn!("rate limit guard tripped until {reset_at}");
        *self.reset_at.lock().unwrap() = Some(reset_at);
    }

    /// Trip with the advertised retry delay, or the default backoff.
    pub fn trip_after(&self, now: DateTime<Utc>, retry_after_secs: Option<i64>) {
        let secs = retry_after_secs.unwrap_or(DEFAULT_BACKOFF_SECS);
        self.trip(now + Duration::seconds(secs));
    }

    /// Reset time if the guard is currently active.
    pub fn active_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let reset_at = self.reset_at.lock().unwrap();
        reset_at.filter(|at| now < *at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_guard_passes() {
        let guard = RateLimitGuard::new();
        assert!(guard.check(Utc::now()).is_ok());
    }

    #[test]
    fn test_tripped_guard_blocks_until_reset() {
        let guard = RateLimitGuard::new();
        let now = Utc::now();
        guard.trip_after(now, Some(60));

        // Within the window: blocked.
        let err = guard.check(now + Duration::seconds(59)).unwrap_err();
        assert!(matches!(err, PilotError::RateLimited { .. }));

        // At 61s: the trip has expired and the guard clears itself.
        assert!(guard.check(now + Duration::seconds(61)).is_ok());
        assert!(guard.active_until(now + Duration::seconds(61)).is_none());
    }

    #[test]
    fn test_default_backoff_applies() {
        let guard = RateLimitGuard::new();
        let now = Utc::now();
        guard.trip_after(now, None);
        let until = guard.active_until(now).unwrap();
        assert_eq!(until, now + Duration::seconds(DEFAULT_BACKOFF_SECS));
    }

    #[test]
    fn test_clones_share_state() {
        let guard = RateLimitGuard::new();
        let other = guard.clone();
        let now = Utc::now();
        guard.trip_after(now, Some(30));
        assert!(other.check(now).is_err());
    }
}
