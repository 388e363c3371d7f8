//! Bounded exponential backoff for feed recovery
//!
//! Attempt `n` (1-based) waits `base_delay * 2^(n-1)`. With the defaults
//! of 5 attempts at a 5 second base that is 5s, 10s, 20s, 40s, 80s, after
//! which the pipeline gives up and reports degraded service.

use crate::error::{Result, SyncError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Default number of recovery attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay for the first recovery attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Backoff policy for feed recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy, validating its bounds.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(SyncError::config("max_attempts must be at least 1"));
        }
        if base_delay.is_zero() {
            return Err(SyncError::config("base_delay must be non-zero"));
        }
        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    /// Maximum number of attempts before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given 1-based attempt, saturating on overflow.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether the given 1-based attempt exceeds the policy.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

/// Tracks recovery attempts for one capture run.
///
/// One controller lives for the duration of a run; a successful
/// resubscribe resets the attempt counter so later outages get the full
/// budget again.
#[derive(Debug)]
pub struct RetryController {
    policy: RetryPolicy,
    attempt: AtomicU32,
    waiting: AtomicBool,
}

impl RetryController {
    /// Create a controller for a fresh run.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: AtomicU32::new(0),
            waiting: AtomicBool::new(false),
        }
    }

    /// Attempts consumed since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt.load(Ordering::Relaxed)
    }

    /// Whether a backoff timer is currently pending.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Claim the next attempt, or None if the budget is spent.
    pub fn begin_attempt(&self) -> Option<(u32, Duration)> {
        let next = self.attempt.load(Ordering::Relaxed) + 1;
        if self.policy.is_exhausted(next) {
            return None;
        }
        self.attempt.store(next, Ordering::Relaxed);
        Some((next, self.policy.delay_for_attempt(next)))
    }

    /// Reset after a successful resubscribe.
    pub fn reset(&self) {
        self.attempt.store(0, Ordering::Relaxed);
    }

    /// Wait out a backoff delay. Returns false if cancelled first.
    pub async fn wait(&self, delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
        if *cancel.borrow() {
            return false;
        }
        self.waiting.store(true, Ordering::Relaxed);
        let outcome = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            changed = cancel.changed() => {
                // A dropped sender counts as cancellation.
                match changed {
                    Ok(()) => !*cancel.borrow(),
                    Err(_) => false,
                }
            }
        };
        self.waiting.store(false, Ordering::Relaxed);
        if !outcome {
            debug!("backoff wait cancelled");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::new(0, Duration::from_secs(5)).is_err());
        assert!(RetryPolicy::new(5, Duration::ZERO).is_err());
        assert!(RetryPolicy::new(1, Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_default_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(40));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(80));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(5)).unwrap();
        // Far past any realistic attempt count. Must not panic.
        let delay = policy.delay_for_attempt(1_000);
        assert!(delay >= policy.delay_for_attempt(999));
    }

    #[test]
    fn test_controller_budget() {
        let controller = RetryController::new(RetryPolicy::default());

        for expected in 1..=5u32 {
            let (attempt, delay) = controller.begin_attempt().unwrap();
            assert_eq!(attempt, expected);
            assert_eq!(delay, Duration::from_secs(5) * 2u32.pow(expected - 1));
        }
        assert!(controller.begin_attempt().is_none());
        assert_eq!(controller.attempts(), 5);
    }

    #[test]
    fn test_controller_reset_restores_budget() {
        let controller = RetryController::new(RetryPolicy::default());
        controller.begin_attempt().unwrap();
        controller.begin_attempt().unwrap();

        controller.reset();
        assert_eq!(controller.attempts(), 0);
        let (attempt, delay) = controller.begin_attempt().unwrap();
        assert_eq!(attempt, 1);
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_completes_after_delay() {
        let controller = RetryController::new(RetryPolicy::default());
        let (_tx, mut rx) = watch::channel(false);

        let start = tokio::time::Instant::now();
        assert!(controller.wait(Duration::from_secs(5), &mut rx).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(!controller.is_waiting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled_by_signal() {
        let controller = RetryController::new(RetryPolicy::default());
        let (tx, mut rx) = watch::channel(false);

        tx.send(true).unwrap();
        assert!(!controller.wait(Duration::from_secs(60), &mut rx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled_by_dropped_sender() {
        let controller = RetryController::new(RetryPolicy::default());
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        assert!(!controller.wait(Duration::from_secs(60), &mut rx).await);
    }
}
