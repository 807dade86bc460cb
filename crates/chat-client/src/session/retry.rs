//! Reconnect backoff state

use std::time::Duration;

/// Explicit retry state driving the reconnect loop.
///
/// The first attempt after a drop waits the short delay; every attempt
/// after a failed one waits the longer delay.
#[derive(Debug, Clone)]
pub struct RetryState {
    delay: Duration,
    failed_delay: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl RetryState {
    #[must_use]
    pub fn new(delay: Duration, failed_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            failed_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` when the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return None;
        }
        let delay = if self.attempts == 0 {
            self.delay
        } else {
            self.failed_delay
        };
        self.attempts += 1;
        Some(delay)
    }

    /// Attempts made since the last successful session
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called once a session reaches steady state
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
