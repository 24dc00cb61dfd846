//! Time sources consumed by the session controller
//!
//! Two clocks are needed: calibrated epoch seconds for credential expiry and
//! a monotonic millisecond counter for reconnect spacing. An epoch value of
//! 0 means the clock has not been synchronized yet.

use std::time::Instant;

/// Source of epoch and monotonic time
pub trait TimeSource: Send {
    /// Seconds since 1970-01-01T00:00:00Z, or 0 while unsynchronized
    fn epoch_seconds(&self) -> u64;

    /// Milliseconds since an arbitrary fixed start, never decreasing
    fn uptime_ms(&self) -> u64;
}

/// Host clock: wall time from the system, uptime from a monotonic [`Instant`]
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    started: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn epoch_seconds(&self) -> u64 {
        // A clock before the epoch is as good as no clock
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }

    fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_synchronized() {
        let clock = SystemTimeSource::new();
        // 2020-01-01T00:00:00Z
        assert!(clock.epoch_seconds() > 1_577_836_800);
    }

    #[test]
    fn test_uptime_is_monotonic() {
        let clock = SystemTimeSource::new();
        let first = clock.uptime_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.uptime_ms() >= first + 5);
    }
}
