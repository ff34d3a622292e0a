#![allow(clippy::cast_possible_truncation)]
use std::time::{Duration, Instant};
use tpxgate_algorithms::HistogramAccumulator;
use tpxgate_core::PixelHit;

#[test]
fn test_snapshot_sums_match_hits_per_window() {
    let start = Instant::now();
    let period = Duration::from_millis(100);
    let mut hist = HistogramAccumulator::new(period, start);

    let mut now = start;
    let mut since_publish = 0u64;
    let mut snapshots = 0;
    for step in 0..1000u32 {
        now += Duration::from_millis(1);
        let hit = PixelHit::new((step % 256) as u8, (step / 7 % 256) as u8, u64::from(step), 1);
        hist.add_hit(&hit);
        since_publish += 1;

        if let Some(snapshot) = hist.poll(now) {
            assert_eq!(snapshot.total(), since_publish);
            assert_eq!(snapshot.hits, since_publish);
            since_publish = 0;
            snapshots += 1;
        }
    }
    assert_eq!(snapshots, 10);
}

#[test]
fn test_period_change_takes_effect_on_next_poll() {
    let start = Instant::now();
    let mut hist = HistogramAccumulator::new(Duration::from_secs(10), start);
    hist.add_hit(&PixelHit::new(10, 20, 0, 50));
    assert!(hist.poll(start + Duration::from_millis(20)).is_none());

    hist.set_period(Duration::from_millis(10));
    let snapshot = hist.poll(start + Duration::from_millis(20)).unwrap();
    assert_eq!(snapshot.get(10, 20), 1);
}
