//! The decoder and accumulator stages chained without the bus.

use std::time::{Duration, Instant};
use tpxgate_algorithms::HistogramAccumulator;
use tpxgate_tpx::{decode, PacketDecoder, Tpx3Word};

#[test]
fn test_single_word_lands_in_its_cell() {
    let bytes = Tpx3Word::encode_pixel(10, 20, 50, 12_345).0.to_le_bytes();
    let start = Instant::now();
    let mut histogram = HistogramAccumulator::new(Duration::from_millis(100), start);

    let hits: Vec<_> = decode(&bytes).unwrap().collect();
    assert_eq!(hits.len(), 1);
    assert_eq!((hits[0].x, hits[0].y, hits[0].tot), (10, 20, 50));
    histogram.add_hits(&hits);

    let snapshot = histogram.poll(start + Duration::from_millis(100)).unwrap();
    assert_eq!(snapshot.get(10, 20), 1);
    assert_eq!(snapshot.total(), 1);
}

#[test]
fn test_packed_bus_form_feeds_histogram() {
    let words: Vec<u8> = [(0, 0), (255, 255), (0, 0)]
        .iter()
        .flat_map(|&(x, y)| Tpx3Word::encode_pixel(x, y, 1, 7).0.to_le_bytes())
        .collect();
    let mut decoder = PacketDecoder::new(true);
    let mut packed = Vec::new();
    assert_eq!(decoder.decode_packed(&words, &mut packed).unwrap(), 3);

    let start = Instant::now();
    let mut histogram = HistogramAccumulator::new(Duration::from_secs(1), start);
    assert_eq!(histogram.add_packed(&packed).unwrap(), 3);
    let snapshot = histogram.take_snapshot(start);
    assert_eq!(snapshot.get(0, 0), 2);
    assert_eq!(snapshot.get(255, 255), 1);
}
