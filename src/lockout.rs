//! Failed-PIN lockout policy

use crate::config::LockoutConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Thresholds for the PIN lock
#[derive(Clone, Debug)]
pub struct LockoutPolicy {
    max_attempts: u8,
    lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lockout_duration: Duration::from_secs(30),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u8, lockout_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout_duration,
        }
    }

    pub fn from_config(config: &LockoutConfig) -> Self {
        Self::new(config.max_attempts, config.lockout_duration())
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    pub fn lockout_duration(&self) -> Duration {
        self.lockout_duration
    }
}

/// Result of recording a PIN mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still unlocked; this many attempts remain before the lock engages
    Retry { remaining_attempts: u8 },
    /// Lock engaged until the given instant
    Locked { until: Instant },
    /// Input arrived while already locked and was ignored
    Rejected { remaining: Duration },
}

/// Per-session failure counter. Never persisted across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockoutState {
    attempts: u8,
    locked_until: Option<Instant>,
}

impl LockoutState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn locked_until(&self) -> Option<Instant> {
        self.locked_until
    }

    /// Locked iff `now < locked_until`
    pub fn is_locked(&self, now: Instant) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }

    /// Time left on the lock, zero when unlocked
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.locked_until {
            Some(until) if now < until => until - now,
            _ => Duration::ZERO,
        }
    }

    /// Whole seconds left on the lock, rounded up so a countdown never shows 0 while locked
    pub fn remaining_seconds(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Clear an elapsed lock. Returns true if a lock was lifted.
    pub fn expire_if_elapsed(&mut self, now: Instant) -> bool {
        match self.locked_until {
            Some(until) if now >= until => {
                self.attempts = 0;
                self.locked_until = None;
                true
            }
            _ => false,
        }
    }

    /// Record a PIN mismatch. Counts only while unlocked.
    pub fn register_failure(&mut self, now: Instant, policy: &LockoutPolicy) -> FailureOutcome {
        self.expire_if_elapsed(now);

        if self.is_locked(now) {
            return FailureOutcome::Rejected {
                remaining: self.remaining(now),
            };
        }

        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= policy.max_attempts() {
            let until = now + policy.lockout_duration();
            self.locked_until = Some(until);
            FailureOutcome::Locked { until }
        } else {
            FailureOutcome::Retry {
                remaining_attempts: policy.max_attempts() - self.attempts,
            }
        }
    }

    /// Successful authorization or session close
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.locked_until = None;
    }
}
