// src/supervisor/backoff.rs

//! Crash backoff policy.
//!
//! Consecutive crashes wait `initial * multiplier^(n-1)`, capped at `max`.
//! A child that stayed up for at least `reset_after` before exiting resets
//! the counter, so the next crash waits `initial` again.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
    pub reset_after: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2,
            reset_after: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the automatic restart following the `crash`-th
    /// consecutive crash (1-based).
    pub fn delay_for(&self, crash: u32) -> Duration {
        let exponent = crash.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Per-unit crash counter driving [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct CrashBackoff {
    policy: BackoffPolicy,
    consecutive: u32,
}

impl CrashBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
        }
    }

    /// Record a crash of a child that had been running for `uptime` and
    /// return how long to wait before restarting it.
    pub fn record_crash(&mut self, uptime: Duration) -> Duration {
        if uptime >= self.policy.reset_after {
            self.consecutive = 0;
        }
        self.consecutive = self.consecutive.saturating_add(1);
        self.policy.delay_for(self.consecutive)
    }

    /// Number of crashes since the last reset.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
