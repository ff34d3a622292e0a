//! Completed cluster records.

use crate::hit::TOA_MASK;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A flushed cluster: the tot-weighted centroid of its hits.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterRecord {
    /// Weighted mean column.
    pub x: f64,
    /// Weighted mean row.
    pub y: f64,
    /// Weighted mean time of arrival.
    pub t: f64,
    /// Accumulated weight (sum of tot).
    pub weight: f64,
}

impl ClusterRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(x: f64, y: f64, t: f64, weight: f64) -> Self {
        Self { x, y, t, weight }
    }

    /// Packs the record as `x<<56 | y<<48 | t` (t right-aligned, 38 bits).
    ///
    /// Coordinates and time are truncated toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_packed(&self) -> u64 {
        (((self.x as u64) & 0xFF) << 56)
            | (((self.y as u64) & 0xFF) << 48)
            | ((self.t as u64) & TOA_MASK)
    }

    /// Unpacks a record. The weight is not carried on the wire and reads as 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_packed(raw: u64) -> Self {
        Self {
            x: ((raw >> 56) & 0xFF) as f64,
            y: ((raw >> 48) & 0xFF) as f64,
            t: (raw & TOA_MASK) as f64,
            weight: 0.0,
        }
    }

    /// Encodes records as consecutive big-endian packed words.
    #[must_use]
    pub fn encode_all(records: &[ClusterRecord]) -> Vec<u8> {
        let mut out = Vec::with_capacity(records.len() * 8);
        for record in records {
            out.extend_from_slice(&record.to_packed().to_be_bytes());
        }
        out
    }

    /// Decodes a buffer of big-endian packed words.
    ///
    /// # Errors
    /// Returns an error if the buffer length is not a multiple of 8.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<ClusterRecord>> {
        if bytes.len() % 8 != 0 {
            return Err(Error::InvalidPackedLength(bytes.len()));
        }
        Ok(bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                ClusterRecord::from_packed(u64::from_be_bytes(word))
            })
            .collect())
    }
}
