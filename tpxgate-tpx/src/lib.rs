//! tpxgate-tpx: decoder for the raw TPX3 readout stream.
//!
//! The detector readout delivers datagrams of 64-bit words. Only pixel-event
//! words (top nibble `0xB`) produce hits; every other word type is skipped.
//!
//! # Key Components
//!
//! - [`decode`] - Stateless, lazy decoding of one buffer into [`PixelHit`]s
//! - [`PacketDecoder`] - Stateful decoder applying rollover correction
//! - [`RolloverCorrector`] - Extends the 34-bit ToA with a 4-bit epoch
//! - [`Tpx3Word`] - Bit-exact field extraction for a single word

mod decoder;
mod error;
mod packet;
mod rollover;

pub use decoder::{decode, DecodeStats, HitIter, PacketDecoder};
pub use error::{Error, Result};
pub use packet::{Tpx3Word, WordKind};
pub use rollover::RolloverCorrector;

// Re-export core types for convenience
pub use tpxgate_core::PixelHit;
