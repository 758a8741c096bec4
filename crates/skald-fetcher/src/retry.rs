// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

/// Bounded retry schedule for transient fetch failures.
///
/// Explicit attempt counter and delay table rather than an open-ended loop,
/// so tests can enumerate exactly how many attempts a policy yields.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to sleep after the given 1-based failed attempt.
    ///
    /// Exponential: base, 2*base, 4*base, ... capped to avoid shift overflow.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}
