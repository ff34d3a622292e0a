//! TPX3 word types and field extraction.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Word types distinguished by the top nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WordKind {
    /// Pixel hit data (type 0xB).
    PixelHit,
    /// TDC timestamp (type 0x6).
    Tdc,
    /// Global time (type 0x4).
    GlobalTime,
    /// Control packet (type 0x7).
    Control,
    /// Any other nibble.
    Other(u8),
}

impl WordKind {
    /// Classifies a word by its header nibble.
    #[must_use]
    pub fn from_header(header: u8) -> Self {
        match header {
            0xB => WordKind::PixelHit,
            0x6 => WordKind::Tdc,
            0x4 => WordKind::GlobalTime,
            0x7 => WordKind::Control,
            other => WordKind::Other(other),
        }
    }
}

/// A raw 64-bit readout word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tpx3Word(pub u64);

impl Tpx3Word {
    /// Builds a pixel-event word from decoded fields; the inverse of the
    /// accessors below. Only the low 34 bits of `toa` are representable.
    #[must_use]
    pub fn encode_pixel(x: u8, y: u8, tot: u16, toa: u64) -> Self {
        let (x, y) = (u64::from(x), u64::from(y));
        let addr = ((y >> 1) << 9) | ((x >> 2) << 3) | ((y & 0x1) << 2) | (x & 0x3);
        let ftoa = (toa & 0xF) ^ 0xF;
        let coarse = (toa >> 4) & 0x3FFF;
        let stamp = (toa >> 18) & 0xFFFF;
        Self(
            (0xB_u64 << 60)
                | (addr << 44)
                | (coarse << 30)
                | ((u64::from(tot) & 0x3FF) << 20)
                | (ftoa << 16)
                | stamp,
        )
    }

    /// Reads a word from 8 little-endian bytes.
    #[inline]
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Header nibble (bits 60–63).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn header(&self) -> u8 {
        ((self.0 >> 60) & 0xF) as u8
    }

    /// Word classification.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> WordKind {
        WordKind::from_header(self.header())
    }

    /// True for pixel-event words.
    #[inline]
    #[must_use]
    pub fn is_pixel(&self) -> bool {
        self.header() == 0xB
    }

    /// Pixel address (bits 44–59).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn pixel_address(&self) -> u16 {
        ((self.0 >> 44) & 0xFFFF) as u16
    }

    /// Column: `((addr>>1)&0xFC) | (addr&0x03)`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn x(&self) -> u8 {
        let addr = self.pixel_address();
        (((addr >> 1) & 0xFC) | (addr & 0x03)) as u8
    }

    /// Row: `((addr>>8)&0xFE) | ((addr>>2)&0x01)`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn y(&self) -> u8 {
        let addr = self.pixel_address();
        (((addr >> 8) & 0xFE) | ((addr >> 2) & 0x01)) as u8
    }

    /// Time over threshold (bits 20–29).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn tot(&self) -> u16 {
        ((self.0 >> 20) & 0x3FF) as u16
    }

    /// Coarse ToA (bits 30–43).
    #[inline]
    #[must_use]
    pub fn coarse_toa(&self) -> u64 {
        (self.0 >> 30) & 0x3FFF
    }

    /// Fine ToA (bits 16–19), inverted as the chip reports it counting down.
    #[inline]
    #[must_use]
    pub fn fine_toa(&self) -> u64 {
        ((self.0 >> 16) & 0xF) ^ 0xF
    }

    /// Readout-board timestamp (bits 0–15).
    #[inline]
    #[must_use]
    pub fn spidr_time(&self) -> u64 {
        self.0 & 0xFFFF
    }

    /// Full 34-bit ToA: `(spidr_time<<18) | (toa<<4) | ftoa`.
    #[inline]
    #[must_use]
    pub fn full_toa(&self) -> u64 {
        (self.spidr_time() << 18) | (self.coarse_toa() << 4) | self.fine_toa()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_kind_from_header() {
        assert_eq!(WordKind::from_header(0xB), WordKind::PixelHit);
        assert_eq!(WordKind::from_header(0x4), WordKind::GlobalTime);
        assert_eq!(WordKind::from_header(0x6), WordKind::Tdc);
        assert_eq!(WordKind::from_header(0x0), WordKind::Other(0));
    }

    #[test]
    fn test_field_extraction() {
        // addr = 0xFFFF gives x = 0xFC | 0x03, y = 0xFE | 0x01
        let word = Tpx3Word(0xB000_0000_0000_0000 | (0xFFFF_u64 << 44));
        assert_eq!(word.x(), 255);
        assert_eq!(word.y(), 255);

        let word = Tpx3Word(0xB000_0000_0000_0000 | (0x3FF << 20) | (0x2 << 16) | 0x1);
        assert_eq!(word.tot(), 0x3FF);
        assert_eq!(word.fine_toa(), 0xD);
        assert_eq!(word.spidr_time(), 1);
        assert_eq!(word.full_toa(), (1 << 18) | 0xD);
    }

    #[test]
    fn test_encode_pixel_inverts_accessors() {
        for &(x, y) in &[(0u8, 0u8), (10, 20), (255, 0), (3, 254), (128, 129)] {
            let word = Tpx3Word::encode_pixel(x, y, 50, 0x3_1234_5678);
            assert!(word.is_pixel());
            assert_eq!((word.x(), word.y()), (x, y));
            assert_eq!(word.tot(), 50);
            assert_eq!(word.full_toa(), 0x3_1234_5678);
        }
    }
}
