//! Time handling for vibration streams
//!
//! Sample rates of tens of kHz put consecutive samples tens of microseconds
//! apart, so every timestamp in RotorGuard is a `u64` count of microseconds.
//! Clock sources are abstracted so feedback windows and RUL projections can be
//! driven by a fixed clock in tests.

/// Timestamp in microseconds since epoch (or since acquisition start)
pub type Timestamp = u64;

/// Microseconds per second
pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Microseconds per hour
pub const MICROS_PER_HOUR: u64 = 3_600 * MICROS_PER_SECOND;

/// Microseconds per day
pub const MICROS_PER_DAY: u64 = 24 * MICROS_PER_HOUR;

/// Source of time for the system
pub trait TimeSource: Send + Sync {
    /// Current timestamp in microseconds
    fn now(&self) -> Timestamp;

    /// Whether this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;
}

/// Wall clock backed by `std::time::SystemTime`
#[derive(Debug, Clone, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Fixed time source for testing
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    /// Create a clock frozen at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// Jump to an absolute timestamp
    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Move forward by `micros`
    pub fn advance(&mut self, micros: u64) {
        self.timestamp += micros;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// Timestamp of sample `index` counted from `start` at `sample_rate` Hz
pub fn sample_timestamp(start: Timestamp, index: usize, sample_rate: f64) -> Timestamp {
    if sample_rate <= 0.0 {
        return start;
    }
    start + (index as f64 * MICROS_PER_SECOND as f64 / sample_rate).round() as u64
}

/// Elapsed hours between two timestamps, negative when `later` precedes `earlier`
pub fn hours_between(earlier: Timestamp, later: Timestamp) -> f64 {
    (later as f64 - earlier as f64) / MICROS_PER_HOUR as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_time_advances() {
        let mut time = FixedTime::new(1000);
        assert_eq!(time.now(), 1000);

        time.advance(500);
        assert_eq!(time.now(), 1500);
    }

    #[test]
    fn sample_spacing_at_20khz() {
        assert_eq!(sample_timestamp(0, 1, 20_000.0), 50);
        assert_eq!(sample_timestamp(1_000, 20_000, 20_000.0), 1_000 + MICROS_PER_SECOND);
    }

    #[test]
    fn hours_are_signed() {
        assert_eq!(hours_between(0, MICROS_PER_HOUR), 1.0);
        assert_eq!(hours_between(MICROS_PER_HOUR, 0), -1.0);
    }
}
