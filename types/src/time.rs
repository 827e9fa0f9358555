//! Timestamp type used throughout the node.
//!
//! Timestamps are Unix epoch seconds (UTC). Upgrade scheduling assumes the
//! pool's clocks are synchronized (NTP or equivalent).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs();
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds from `now` until this timestamp; zero when already due.
    pub fn secs_until(&self, now: Timestamp) -> u64 {
        self.0.saturating_sub(now.0)
    }

    /// Whether this timestamp has passed relative to `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        now.0 >= self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_until_saturates() {
        let t = Timestamp::new(100);
        assert_eq!(t.secs_until(Timestamp::new(40)), 60);
        assert_eq!(t.secs_until(Timestamp::new(100)), 0);
        assert_eq!(t.secs_until(Timestamp::new(500)), 0);
    }

    #[test]
    fn is_due_boundary() {
        let t = Timestamp::new(100);
        assert!(!t.is_due(Timestamp::new(99)));
        assert!(t.is_due(Timestamp::new(100)));
        assert!(t.is_due(Timestamp::new(101)));
    }
}
