//! ToA rollover correction.
//!
//! The full ToA assembled from a pixel word is 34 bits wide and wraps
//! roughly every 26.8 s. The published hit format reserves 38 bits for the
//! time, so the 4 spare bits carry an epoch counter that keeps the stream
//! monotonic across wraps (itself wrapping after 16 epochs).

use tpxgate_core::TOA_MASK;

/// Width of the raw detector ToA.
pub const RAW_TOA_BITS: u32 = 34;

const RAW_TOA_RANGE: u64 = 1 << RAW_TOA_BITS;
const HALF_RANGE: u64 = RAW_TOA_RANGE / 2;
const EPOCHS: u64 = 1 << (38 - RAW_TOA_BITS);

/// Tracks the epoch of a 34-bit ToA stream.
#[derive(Debug, Clone, Default)]
pub struct RolloverCorrector {
    epoch: u64,
    last_raw: Option<u64>,
    rollovers: u64,
}

impl RolloverCorrector {
    /// Creates a corrector starting at epoch 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the epoch-extended ToA for a raw 34-bit value.
    ///
    /// A drop of more than half the range starts a new epoch. A jump forward
    /// of more than half the range is a straggler from the previous epoch
    /// (epoch 0 while no wrap has been seen) and does not move the
    /// reference point.
    pub fn correct(&mut self, raw_toa: u64) -> u64 {
        let raw = raw_toa & (RAW_TOA_RANGE - 1);
        let Some(last) = self.last_raw else {
            self.last_raw = Some(raw);
            return self.extend(raw, self.epoch);
        };

        if raw < last && last - raw > HALF_RANGE {
            self.epoch = (self.epoch + 1) % EPOCHS;
            self.rollovers += 1;
            self.last_raw = Some(raw);
            self.extend(raw, self.epoch)
        } else if raw > last && raw - last > HALF_RANGE {
            // Before the first wrap there is no earlier epoch to fall back to.
            let epoch = if self.rollovers == 0 {
                self.epoch
            } else {
                (self.epoch + EPOCHS - 1) % EPOCHS
            };
            self.extend(raw, epoch)
        } else {
            self.last_raw = Some(raw);
            self.extend(raw, self.epoch)
        }
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of rollovers observed since creation or the last reset.
    #[must_use]
    pub fn rollovers(&self) -> u64 {
        self.rollovers
    }

    /// Forgets all history, e.g. when the upstream source changes.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    fn extend(&self, raw: u64, epoch: u64) -> u64 {
        ((epoch << RAW_TOA_BITS) | raw) & TOA_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_stream_is_untouched() {
        let mut corrector = RolloverCorrector::new();
        assert_eq!(corrector.correct(100), 100);
        assert_eq!(corrector.correct(200), 200);
        assert_eq!(corrector.rollovers(), 0);
    }

    #[test]
    fn test_wrap_advances_epoch() {
        let mut corrector = RolloverCorrector::new();
        let near_end = RAW_TOA_RANGE - 10;
        assert_eq!(corrector.correct(near_end), near_end);
        assert_eq!(corrector.correct(5), RAW_TOA_RANGE + 5);
        assert_eq!(corrector.epoch(), 1);
        assert_eq!(corrector.rollovers(), 1);
    }

    #[test]
    fn test_straggler_keeps_previous_epoch() {
        let mut corrector = RolloverCorrector::new();
        corrector.correct(RAW_TOA_RANGE - 10);
        corrector.correct(5);
        // A late hit from just before the wrap.
        assert_eq!(corrector.correct(RAW_TOA_RANGE - 3), RAW_TOA_RANGE - 3);
        // The stream continues in epoch 1.
        assert_eq!(corrector.correct(8), RAW_TOA_RANGE + 8);
    }

    #[test]
    fn test_backward_jump_before_any_wrap_stays_in_epoch_zero() {
        let mut corrector = RolloverCorrector::new();
        corrector.correct(5);
        assert_eq!(corrector.correct(RAW_TOA_RANGE - 3), RAW_TOA_RANGE - 3);
        assert_eq!(corrector.epoch(), 0);
        assert_eq!(corrector.correct(9), 9);
    }

    #[test]
    fn test_straggler_after_epoch_wraps_to_zero() {
        let mut corrector = RolloverCorrector::new();
        corrector.correct(0);
        for _ in 0..EPOCHS {
            corrector.correct(HALF_RANGE);
            corrector.correct(RAW_TOA_RANGE - 1);
            corrector.correct(0);
        }
        assert_eq!(corrector.epoch(), 0);
        let late = corrector.correct(RAW_TOA_RANGE - 2);
        assert_eq!(late, ((EPOCHS - 1) << RAW_TOA_BITS) | (RAW_TOA_RANGE - 2));
    }

    #[test]
    fn test_epoch_wraps_within_38_bits() {
        let mut corrector = RolloverCorrector::new();
        corrector.correct(0);
        for _ in 0..EPOCHS {
            corrector.correct(HALF_RANGE);
            corrector.correct(RAW_TOA_RANGE - 1);
            corrector.correct(0);
        }
        assert_eq!(corrector.rollovers(), EPOCHS);
        assert_eq!(corrector.epoch(), 0);
        assert!(corrector.correct(1) <= TOA_MASK);
    }
}
