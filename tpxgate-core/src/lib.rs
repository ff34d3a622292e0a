//! tpxgate-core: Core types for the tpxgate acquisition gateway.
//!
//! This crate defines the hit and cluster records that flow between the
//! decoder, the clustering and histogram stages, and the sink files, along
//! with their canonical packed 64-bit forms.
//!

pub mod cluster;
pub mod error;
pub mod hit;

pub use cluster::ClusterRecord;
pub use error::{Error, Result};
pub use hit::{PixelHit, DETECTOR_PIXELS, DETECTOR_SIZE, TOA_MASK, TOT_MASK};
