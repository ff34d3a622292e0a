//! Sink files read back through the decoding path.

use tpxgate_core::{ClusterRecord, PixelHit};
use tpxgate_io::{ClusterFileReader, ClusterFileWriter, RawChunkWriter};
use tpxgate_tpx::{decode, Tpx3Word};

#[test]
fn test_raw_chunks_decode_to_original_hits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.tpx3");
    let mut writer = RawChunkWriter::create(&path).unwrap();

    let hits = [
        PixelHit::new(0, 0, 1, 1),
        PixelHit::new(255, 255, 0x3_FFFF_FFFF, 1023),
        PixelHit::new(17, 200, 123_456, 40),
    ];
    let mut datagram = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        if i == 1 {
            datagram.extend_from_slice(&0x6F00_0000_0000_0000_u64.to_le_bytes());
        }
        let word = Tpx3Word::encode_pixel(hit.x, hit.y, hit.tot, hit.toa);
        datagram.extend_from_slice(&word.0.to_le_bytes());
    }
    assert_eq!(writer.write_datagram(&datagram).unwrap(), 3);
    writer.flush().unwrap();

    let data = std::fs::read(&path).unwrap();
    let size = u16::from_le_bytes([data[6], data[7]]) as usize;
    assert_eq!(size, 24);
    let decoded: Vec<PixelHit> = decode(&data[8..8 + size]).unwrap().collect();
    assert_eq!(decoded, hits);
}

#[test]
fn test_cluster_file_appends_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.clusters");
    let mut writer = ClusterFileWriter::create(&path).unwrap();
    for batch in 0..4_u32 {
        let records: Vec<ClusterRecord> = (0..25_u32)
            .map(|i| {
                let t = f64::from(batch * 100 + i);
                ClusterRecord::new(f64::from(i), f64::from(batch), t, 1.0)
            })
            .collect();
        writer.write_records(&records).unwrap();
    }
    writer.flush().unwrap();
    assert_eq!(writer.records_written(), 100);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 8 + 100 * 8);

    let records = ClusterFileReader::read_all(&path).unwrap();
    assert_eq!(records.len(), 100);
    assert!(records.windows(2).all(|w| w[0].t < w[1].t));
}

#[test]
fn test_truncated_cluster_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.clusters");
    let mut bytes = b"CLUSTERS".to_vec();
    bytes.extend_from_slice(&[0, 1, 2]);
    std::fs::write(&path, bytes).unwrap();
    assert!(ClusterFileReader::read_all(&path).is_err());
}
