//! Reconnection policy for unsolicited transport closes
//!
//! TVs drop their remote-control sockets when they go to standby or when the
//! user walks through a network hiccup. The policy retries with a fixed delay
//! and gives up silently after a bounded number of attempts; recovering after
//! that requires an explicit `connect()` from the caller.

use std::time::Duration;

/// Default delay between reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default attempt budget after an unsolicited close
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed wait before each attempt
    pub delay: Duration,
    /// Attempts allowed after a close before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self { delay, max_attempts }
    }

    /// Policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    ///
    /// `attempts_made` counts attempts since the last successful open.
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        (attempts_made < self.max_attempts).then_some(self.delay)
    }
}
