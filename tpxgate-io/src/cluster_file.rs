//! The cluster sink file.
//!
//! Layout: the 8-byte magic `CLUSTERS`, then one 8-byte big-endian word per
//! cluster, `x<<56 | y<<48 | t` with t right-aligned in the low 38 bits.

use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tpxgate_core::ClusterRecord;

/// File-level magic header.
pub const CLUSTER_FILE_MAGIC: &[u8; 8] = b"CLUSTERS";

/// Append-only writer for cluster records.
pub struct ClusterFileWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    records: u64,
}

impl ClusterFileWriter {
    /// Creates (truncating) the file and writes the magic header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(CLUSTER_FILE_MAGIC)?;
        Ok(Self {
            writer,
            path,
            records: 0,
        })
    }

    /// Appends records.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn write_records(&mut self, records: &[ClusterRecord]) -> Result<()> {
        for record in records {
            self.writer.write_all(&record.to_packed().to_be_bytes())?;
        }
        self.records += records.len() as u64;
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Path of the file being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered records.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Reader for cluster sink files.
pub struct ClusterFileReader;

impl ClusterFileReader {
    /// Reads every record from a cluster file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the magic is missing, or
    /// the body is not a whole number of records.
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<ClusterRecord>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| Error::InvalidFormat("file shorter than header".into()))?;
        if &magic != CLUSTER_FILE_MAGIC {
            return Err(Error::InvalidFormat(format!(
                "bad magic {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        Ok(ClusterRecord::decode_all(&body)?)
    }
}
