//! tpxgate-io: append-only sink files for the acquisition gateway.
//!
//! - [`ClusterFileWriter`] / [`ClusterFileReader`] - the `CLUSTERS` record file
//! - [`RawChunkWriter`] - raw pixel words saved as TPX3 chunks
//!

mod cluster_file;
mod error;
mod raw;

pub use cluster_file::{ClusterFileReader, ClusterFileWriter, CLUSTER_FILE_MAGIC};
pub use error::{Error, Result};
pub use raw::{RawChunkWriter, TPX3_CHUNK_MAGIC};
