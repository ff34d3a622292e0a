//! Buffer-level decoding of the raw readout stream.

use crate::packet::Tpx3Word;
use crate::rollover::RolloverCorrector;
use crate::{Error, Result};
use std::iter::FusedIterator;
use std::slice::ChunksExact;
use tpxgate_core::PixelHit;

const WORD_SIZE: usize = 8;

/// Decodes a buffer of raw readout words into pixel hits.
///
/// The returned iterator is lazy and can be cloned to restart decoding from
/// the same position. Hits come out in word order; non-pixel words are
/// skipped.
///
/// # Errors
/// Returns [`Error::InvalidLength`] if `bytes` is not a multiple of 8 long.
pub fn decode(bytes: &[u8]) -> Result<HitIter<'_>> {
    if bytes.len() % WORD_SIZE != 0 {
        return Err(Error::InvalidLength(bytes.len()));
    }
    Ok(HitIter {
        words: bytes.chunks_exact(WORD_SIZE),
    })
}

/// Lazy iterator over the pixel hits of one buffer.
#[derive(Debug, Clone)]
pub struct HitIter<'a> {
    words: ChunksExact<'a, u8>,
}

impl Iterator for HitIter<'_> {
    type Item = PixelHit;

    fn next(&mut self) -> Option<PixelHit> {
        for chunk in self.words.by_ref() {
            let word = read_word(chunk);
            if word.is_pixel() {
                return Some(hit_from_word(word));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.words.len()))
    }
}

impl FusedIterator for HitIter<'_> {}

#[inline]
fn read_word(chunk: &[u8]) -> Tpx3Word {
    let mut bytes = [0u8; WORD_SIZE];
    bytes.copy_from_slice(chunk);
    Tpx3Word::from_le_bytes(bytes)
}

#[inline]
fn hit_from_word(word: Tpx3Word) -> PixelHit {
    PixelHit::new(word.x(), word.y(), word.full_toa(), word.tot())
}

/// Running counters kept by a [`PacketDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Words examined in accepted buffers.
    pub words: u64,
    /// Words that produced a hit.
    pub pixel_words: u64,
    /// Buffers rejected for a bad length.
    pub rejected_chunks: u64,
}

impl DecodeStats {
    /// Words that were consumed without producing a hit.
    #[must_use]
    pub fn other_words(&self) -> u64 {
        self.words - self.pixel_words
    }
}

/// Stateful decoder with optional rollover correction.
#[derive(Debug, Clone, Default)]
pub struct PacketDecoder {
    rollover: Option<RolloverCorrector>,
    stats: DecodeStats,
}

impl PacketDecoder {
    /// Creates a decoder. With `correct_rollover` set, hit times are extended
    /// across wraps of the 34-bit detector clock.
    #[must_use]
    pub fn new(correct_rollover: bool) -> Self {
        Self {
            rollover: correct_rollover.then(RolloverCorrector::new),
            stats: DecodeStats::default(),
        }
    }

    /// Decodes `bytes`, appending hits to `out`. Returns the number appended.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLength`] for a partial trailing word; nothing
    /// is appended in that case.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut Vec<PixelHit>) -> Result<usize> {
        let hits = match decode(bytes) {
            Ok(hits) => hits,
            Err(e) => {
                self.stats.rejected_chunks += 1;
                return Err(e);
            }
        };

        let before = out.len();
        out.extend(hits.map(|mut hit| {
            if let Some(corrector) = self.rollover.as_mut() {
                hit.toa = corrector.correct(hit.toa);
            }
            hit
        }));
        let produced = out.len() - before;

        self.stats.words += (bytes.len() / WORD_SIZE) as u64;
        self.stats.pixel_words += produced as u64;
        Ok(produced)
    }

    /// Decodes `bytes` straight into the packed big-endian bus form.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLength`] for a partial trailing word.
    pub fn decode_packed(&mut self, bytes: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        let mut hits = Vec::with_capacity(bytes.len() / WORD_SIZE);
        let produced = self.decode_into(bytes, &mut hits)?;
        out.reserve(produced * WORD_SIZE);
        for hit in &hits {
            hit.write_packed(out);
        }
        Ok(produced)
    }

    /// Counters accumulated so far.
    #[must_use]
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Clears counters and rollover history.
    pub fn reset(&mut self) {
        if let Some(corrector) = self.rollover.as_mut() {
            corrector.reset();
        }
        self.stats = DecodeStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[u64]) -> Vec<u8> {
        values.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_single_pixel_word() {
        let raw = Tpx3Word::encode_pixel(10, 20, 50, 12345).0;
        let hits: Vec<_> = decode(&words(&[raw])).unwrap().collect();
        assert_eq!(hits, vec![PixelHit::new(10, 20, 12345, 50)]);
    }

    #[test]
    fn test_decode_skips_other_words() {
        let data = words(&[
            0x4000_0000_0000_1234,
            Tpx3Word::encode_pixel(1, 2, 3, 4).0,
            0x6F00_0000_0000_0000,
            Tpx3Word::encode_pixel(5, 6, 7, 8).0,
        ]);
        let hits: Vec<_> = decode(&data).unwrap().collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1], PixelHit::new(5, 6, 8, 7));
    }

    #[test]
    fn test_decode_rejects_partial_word() {
        assert_eq!(decode(&[0u8; 12]).unwrap_err(), Error::InvalidLength(12));
        assert_eq!(decode(&[]).unwrap().count(), 0);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let data = words(&[Tpx3Word::encode_pixel(1, 1, 1, 1).0; 3]);
        let iter = decode(&data).unwrap();
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_packet_decoder_stats_and_rejection() {
        let mut decoder = PacketDecoder::new(false);
        let mut hits = Vec::new();
        let data = words(&[Tpx3Word::encode_pixel(1, 1, 1, 1).0, 0x7000_0000_0000_0000]);
        assert_eq!(decoder.decode_into(&data, &mut hits).unwrap(), 1);
        assert!(decoder.decode_into(&data[..9], &mut hits).is_err());
        assert_eq!(hits.len(), 1);

        let stats = decoder.stats();
        assert_eq!(stats.words, 2);
        assert_eq!(stats.pixel_words, 1);
        assert_eq!(stats.other_words(), 1);
        assert_eq!(stats.rejected_chunks, 1);
    }

    #[test]
    fn test_decode_packed_is_big_endian() {
        let mut decoder = PacketDecoder::new(false);
        let mut out = Vec::new();
        let data = words(&[Tpx3Word::encode_pixel(10, 20, 50, 7).0]);
        decoder.decode_packed(&data, &mut out).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 10);
        assert_eq!(out[1], 20);
        let hit = PixelHit::iter_packed(&out).unwrap().next().unwrap();
        assert_eq!(hit, PixelHit::new(10, 20, 7, 50));
    }
}
