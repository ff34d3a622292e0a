//! Rolling per-interval counters for status reporting.

use std::time::{Duration, Instant};

/// Counts events over fixed reporting intervals.
#[derive(Debug, Clone)]
pub struct RateCounter {
    interval: Duration,
    window_start: Instant,
    count: u64,
}

/// The count accumulated over one completed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateReport {
    /// Events counted in the interval.
    pub count: u64,
    /// Actual length of the interval.
    pub elapsed: Duration,
}

impl RateReport {
    /// Events per second over the interval.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        }
    }
}

impl RateCounter {
    /// Starts a counter whose first interval begins at `now`.
    #[must_use]
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            count: 0,
        }
    }

    /// Adds `n` events to the current interval.
    #[inline]
    pub fn add(&mut self, n: u64) {
        self.count += n;
    }

    /// Closes the interval if it has run its length, returning its report
    /// and starting the next one at `now`.
    pub fn tick(&mut self, now: Instant) -> Option<RateReport> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let report = RateReport {
            count: self.count,
            elapsed,
        };
        self.count = 0;
        self.window_start = now;
        Some(report)
    }
}
