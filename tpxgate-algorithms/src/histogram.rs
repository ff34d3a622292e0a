//! Live 2D hit histogram with periodic snapshots.
//!
//! Counters are `u16` and wrap silently past 65535 within one window; the
//! publish period has to be short enough for the expected per-pixel rate.

use std::time::{Duration, Instant};
use tpxgate_core::{PixelHit, DETECTOR_PIXELS, DETECTOR_SIZE};

/// Counts for one publish window, row-major by y then x.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    /// `DETECTOR_PIXELS` counters; cell `x + 256 * y`.
    pub counts: Vec<u16>,
    /// Hits folded into this window.
    pub hits: u64,
}

impl HistogramSnapshot {
    /// Counter at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u8, y: u8) -> u16 {
        self.counts[usize::from(x) + DETECTOR_SIZE * usize::from(y)]
    }

    /// Sum of all counters.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Encodes the counters as big-endian `u16`s.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.counts.iter().flat_map(|c| c.to_be_bytes()).collect()
    }

    /// Decodes a published snapshot. Returns `None` unless the buffer holds
    /// exactly one full grid.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != DETECTOR_PIXELS * 2 {
            return None;
        }
        let counts: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let hits = counts.iter().map(|&c| u64::from(c)).sum();
        Some(Self { counts, hits })
    }
}

/// Accumulates hits into a fixed 256×256 grid.
#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    grid: Vec<u16>,
    hits: u64,
    period: Duration,
    last_publish: Instant,
}

impl HistogramAccumulator {
    /// Creates an empty grid whose first window starts at `now`.
    #[must_use]
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            grid: vec![0; DETECTOR_PIXELS],
            hits: 0,
            period,
            last_publish: now,
        }
    }

    /// Increments the cell under `hit`.
    #[inline]
    pub fn add_hit(&mut self, hit: &PixelHit) {
        let cell = &mut self.grid[hit.grid_index()];
        *cell = cell.wrapping_add(1);
        self.hits += 1;
    }

    /// Increments the cells under every hit.
    pub fn add_hits<'a, I>(&mut self, hits: I)
    where
        I: IntoIterator<Item = &'a PixelHit>,
    {
        for hit in hits {
            self.add_hit(hit);
        }
    }

    /// Folds a big-endian packed hit buffer. Returns the number of hits.
    ///
    /// # Errors
    /// Returns an error if the buffer is not a whole number of words.
    pub fn add_packed(&mut self, bytes: &[u8]) -> tpxgate_core::Result<usize> {
        let mut n = 0;
        for hit in PixelHit::iter_packed(bytes)? {
            self.add_hit(&hit);
            n += 1;
        }
        Ok(n)
    }

    /// Current count at `(x, y)`.
    #[must_use]
    pub fn count(&self, x: u8, y: u8) -> u16 {
        self.grid[usize::from(x) + DETECTOR_SIZE * usize::from(y)]
    }

    /// Hits accumulated in the current window.
    #[must_use]
    pub fn pending_hits(&self) -> u64 {
        self.hits
    }

    /// Publish period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Changes the publish period; checked on the next poll.
    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    /// Returns a snapshot and resets the grid once the period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<HistogramSnapshot> {
        if now.saturating_duration_since(self.last_publish) >= self.period {
            Some(self.take_snapshot(now))
        } else {
            None
        }
    }

    /// Unconditionally snapshots and resets, starting a new window at `now`.
    pub fn take_snapshot(&mut self, now: Instant) -> HistogramSnapshot {
        let counts = std::mem::replace(&mut self.grid, vec![0; DETECTOR_PIXELS]);
        let hits = std::mem::take(&mut self.hits);
        self.last_publish = now;
        HistogramSnapshot { counts, hits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_hit_lands_in_cell() {
        let start = Instant::now();
        let mut hist = HistogramAccumulator::new(Duration::from_millis(10), start);
        hist.add_hit(&PixelHit::new(10, 20, 0, 50));
        assert_eq!(hist.count(10, 20), 1);
        assert_eq!(hist.count(20, 10), 0);
    }

    #[test]
    fn test_poll_respects_period_and_resets() {
        let start = Instant::now();
        let mut hist = HistogramAccumulator::new(Duration::from_millis(100), start);
        hist.add_hit(&PixelHit::new(1, 1, 0, 1));
        assert!(hist.poll(start + Duration::from_millis(50)).is_none());

        let snapshot = hist.poll(start + Duration::from_millis(100)).unwrap();
        assert_eq!(snapshot.get(1, 1), 1);
        assert_eq!(snapshot.total(), 1);
        assert_eq!(hist.count(1, 1), 0);
        assert_eq!(hist.pending_hits(), 0);

        // New window starts at the publish instant.
        assert!(hist.poll(start + Duration::from_millis(150)).is_none());
    }

    #[test]
    fn test_counter_wraps_without_panicking() {
        let start = Instant::now();
        let mut hist = HistogramAccumulator::new(Duration::from_secs(1), start);
        let hit = PixelHit::new(0, 0, 0, 1);
        for _ in 0..=u32::from(u16::MAX) {
            hist.add_hit(&hit);
        }
        assert_eq!(hist.count(0, 0), 0);
    }

    #[test]
    fn test_snapshot_encoding() {
        let start = Instant::now();
        let mut hist = HistogramAccumulator::new(Duration::ZERO, start);
        hist.add_hit(&PixelHit::new(1, 0, 0, 1));
        let snapshot = hist.take_snapshot(start);
        let bytes = snapshot.encode();
        assert_eq!(bytes.len(), DETECTOR_PIXELS * 2);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
        assert_eq!(HistogramSnapshot::decode(&bytes).unwrap(), snapshot);
        assert!(HistogramSnapshot::decode(&bytes[1..]).is_none());
    }
}
