//! Reconnection budget.
//!
//! ```text
//! failure, attempts_used < max_attempts  -> attempts_used += 1, Scheduled
//! failure, attempts_used == max_attempts -> Exhausted
//! failure, reason not retryable          -> NotRetryable
//! success                                -> attempts_used = 0
//! ```
//!
//! The policy only decides; the session owns the timer and the state
//! transition to `Reconnecting` or `Failed`.

use std::time::Duration;

/// Default wait before a reconnection attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Reasons containing this marker describe a destination that can never
/// succeed, so retrying would only burn the budget.
const MALFORMED_ENDPOINT: &str = "Endpoint malformed";

/// Outcome of feeding one failure into the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect after `delay`; `attempt` is 1-based.
    Scheduled { attempt: u32, delay: Duration },
    Exhausted,
    NotRetryable,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    attempts_used: u32,
    delay: Duration,
    last_reason: Option<String>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            attempts_used: 0,
            delay,
            last_reason: None,
        }
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts;
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_used)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn last_reason(&self) -> Option<&str> {
        self.last_reason.as_deref()
    }

    /// Record a failure and decide using the configured delay.
    pub fn on_failure(&mut self, reason: &str) -> RetryDecision {
        self.schedule(reason, self.delay)
    }

    /// Record a failure and decide using an explicit delay.
    pub fn schedule(&mut self, reason: &str, delay: Duration) -> RetryDecision {
        self.last_reason = Some(reason.to_string());
        if reason.contains(MALFORMED_ENDPOINT) {
            return RetryDecision::NotRetryable;
        }
        if self.attempts_used >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        self.attempts_used += 1;
        RetryDecision::Scheduled {
            attempt: self.attempts_used,
            delay,
        }
    }

    /// A connection succeeded: grant a fresh budget.
    pub fn on_success(&mut self) {
        self.attempts_used = 0;
    }

    /// Forget everything about previous failures, keeping the limits.
    pub fn reset(&mut self) {
        self.attempts_used = 0;
        self.last_reason = None;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0, DEFAULT_RETRY_DELAY)
    }
}
