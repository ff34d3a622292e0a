#![allow(clippy::cast_possible_truncation, clippy::unreadable_literal)]
use tpxgate_tpx::{decode, PacketDecoder, PixelHit, Tpx3Word};

fn to_bytes(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

// Deterministic mix of pixel, TDC and global-time words.
fn mixed_chunk(seed: u64, len: usize) -> Vec<u64> {
    let mut state = seed;
    (0..len)
        .map(|i| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            match i % 5 {
                3 => 0x6F00_0000_0000_0000 | (state >> 8),
                4 => 0x4000_0000_0000_0000 | (state >> 8),
                _ => Tpx3Word::encode_pixel(
                    (state >> 8) as u8,
                    (state >> 16) as u8,
                    ((state >> 24) & 0x3FF) as u16,
                    (state >> 30) & 0x3_FFFF_FFFF,
                )
                .0,
            }
        })
        .collect()
}

#[test]
fn test_single_word_scenario() {
    let bytes = to_bytes(&[Tpx3Word::encode_pixel(10, 20, 50, 999).0]);
    let hits: Vec<PixelHit> = decode(&bytes).unwrap().collect();
    assert_eq!(hits.len(), 1);
    assert_eq!((hits[0].x, hits[0].y, hits[0].tot), (10, 20, 50));
}

#[test]
fn test_decode_distributes_over_concatenation() {
    let a = to_bytes(&mixed_chunk(1, 40));
    let b = to_bytes(&mixed_chunk(2, 25));

    let mut separate: Vec<PixelHit> = decode(&a).unwrap().collect();
    separate.extend(decode(&b).unwrap());

    let mut joined = a.clone();
    joined.extend_from_slice(&b);
    let together: Vec<PixelHit> = decode(&joined).unwrap().collect();

    assert_eq!(separate, together);
    assert_eq!(together.len(), 24 + 15);
}

#[test]
fn test_decode_is_pure() {
    let bytes = to_bytes(&mixed_chunk(7, 50));
    let first: Vec<PixelHit> = decode(&bytes).unwrap().collect();
    let second: Vec<PixelHit> = decode(&bytes).unwrap().collect();
    assert_eq!(first, second);
}

#[test]
fn test_rollover_correction_across_chunks() {
    let before_wrap = (1u64 << 34) - 16;
    let a = to_bytes(&[Tpx3Word::encode_pixel(1, 1, 1, before_wrap).0]);
    let b = to_bytes(&[Tpx3Word::encode_pixel(1, 1, 1, 32).0]);

    let mut decoder = PacketDecoder::new(true);
    let mut hits = Vec::new();
    decoder.decode_into(&a, &mut hits).unwrap();
    decoder.decode_into(&b, &mut hits).unwrap();

    assert_eq!(hits[0].toa, before_wrap);
    assert_eq!(hits[1].toa, (1u64 << 34) + 32);
    assert!(hits[1].toa > hits[0].toa);

    let mut plain = PacketDecoder::new(false);
    let mut raw_hits = Vec::new();
    plain.decode_into(&b, &mut raw_hits).unwrap();
    assert_eq!(raw_hits[0].toa, 32);
}
