//! Pixel hit type and its packed bus representation.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Width and height of a single detector chip, in pixels.
pub const DETECTOR_SIZE: usize = 256;

/// Number of pixels on a single detector chip.
pub const DETECTOR_PIXELS: usize = DETECTOR_SIZE * DETECTOR_SIZE;

/// Mask for the 38 significant bits of a (rollover-extended) time of arrival.
pub const TOA_MASK: u64 = 0x3F_FFFF_FFFF;

/// Mask for the 10 significant bits of a time over threshold.
pub const TOT_MASK: u16 = 0x3FF;

/// A single decoded pixel event.
///
/// `toa` counts ~1.5625 ns ticks. The raw detector counter is 34 bits wide;
/// the upper 4 of the 38 bits carry an optional rollover epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelHit {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
    /// Time of arrival.
    pub toa: u64,
    /// Time over threshold (charge proxy).
    pub tot: u16,
}

impl PixelHit {
    /// Creates a new hit.
    #[inline]
    #[must_use]
    pub fn new(x: u8, y: u8, toa: u64, tot: u16) -> Self {
        Self { x, y, toa, tot }
    }

    /// Flat histogram index (`x + 256 * y`).
    #[inline]
    #[must_use]
    pub fn grid_index(&self) -> usize {
        usize::from(self.x) + DETECTOR_SIZE * usize::from(self.y)
    }

    /// Packs the hit as `x<<56 | y<<48 | tot<<38 | toa`.
    #[inline]
    #[must_use]
    pub fn to_packed(&self) -> u64 {
        (u64::from(self.x) << 56)
            | (u64::from(self.y) << 48)
            | ((u64::from(self.tot) & u64::from(TOT_MASK)) << 38)
            | (self.toa & TOA_MASK)
    }

    /// Unpacks a hit from its 64-bit bus form.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_packed(raw: u64) -> Self {
        Self {
            x: (raw >> 56) as u8,
            y: (raw >> 48) as u8,
            toa: raw & TOA_MASK,
            tot: ((raw >> 38) & u64::from(TOT_MASK)) as u16,
        }
    }

    /// Appends the big-endian packed form to `out`.
    #[inline]
    pub fn write_packed(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_packed().to_be_bytes());
    }

    /// Iterates over the hits in a big-endian packed buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer length is not a multiple of 8.
    pub fn iter_packed(bytes: &[u8]) -> Result<impl Iterator<Item = PixelHit> + '_> {
        if bytes.len() % 8 != 0 {
            return Err(Error::InvalidPackedLength(bytes.len()));
        }
        Ok(bytes.chunks_exact(8).map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            PixelHit::from_packed(u64::from_be_bytes(word))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_layout() {
        let hit = PixelHit::new(10, 20, 0x12_3456_789A, 50);
        let raw = hit.to_packed();
        assert_eq!(raw >> 56, 10);
        assert_eq!((raw >> 48) & 0xFF, 20);
        assert_eq!((raw >> 38) & 0x3FF, 50);
        assert_eq!(raw & TOA_MASK, 0x12_3456_789A);
        assert_eq!(PixelHit::from_packed(raw), hit);
    }

    #[test]
    fn test_grid_index() {
        assert_eq!(PixelHit::new(10, 20, 0, 1).grid_index(), 10 + 256 * 20);
        assert_eq!(PixelHit::new(255, 255, 0, 1).grid_index(), DETECTOR_PIXELS - 1);
    }

    #[test]
    fn test_iter_packed_rejects_partial_word() {
        assert!(PixelHit::iter_packed(&[0u8; 7]).is_err());

        let mut buf = Vec::new();
        PixelHit::new(1, 2, 3, 4).write_packed(&mut buf);
        PixelHit::new(5, 6, 7, 8).write_packed(&mut buf);
        let hits: Vec<_> = PixelHit::iter_packed(&buf).unwrap().collect();
        assert_eq!(hits, vec![PixelHit::new(1, 2, 3, 4), PixelHit::new(5, 6, 7, 8)]);
    }
}
