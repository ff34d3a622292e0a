//! Raw readout capture as TPX3 chunk files.
//!
//! Each accepted datagram becomes one chunk: `"TPX3"`, chip index, readout
//! mode, a little-endian `u16` byte count, then the pixel words of the
//! datagram in their original byte order. Non-pixel words are not saved.

use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tpxgate_tpx::Tpx3Word;

/// Chunk header magic.
pub const TPX3_CHUNK_MAGIC: &[u8; 4] = b"TPX3";

const WORD_SIZE: usize = 8;
// The u16 size field caps a chunk at 8191 words.
const MAX_CHUNK_WORDS: usize = (u16::MAX as usize) / WORD_SIZE;

/// Writer for raw TPX3 chunk files.
pub struct RawChunkWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    chip_index: u8,
    bytes_written: u64,
}

impl RawChunkWriter {
    /// Creates (truncating) a raw capture file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            chip_index: 0,
            bytes_written: 0,
        })
    }

    /// Writes the pixel words of one datagram. Returns the number of words
    /// saved. Buffers with a partial trailing word are rejected.
    ///
    /// # Errors
    /// Returns an error on a bad buffer length or a failed write.
    pub fn write_datagram(&mut self, bytes: &[u8]) -> Result<usize> {
        if bytes.len() % WORD_SIZE != 0 {
            return Err(tpxgate_tpx::Error::InvalidLength(bytes.len()).into());
        }
        let pixel_words: Vec<&[u8]> = bytes
            .chunks_exact(WORD_SIZE)
            .filter(|chunk| {
                let mut word = [0u8; WORD_SIZE];
                word.copy_from_slice(chunk);
                Tpx3Word::from_le_bytes(word).is_pixel()
            })
            .collect();

        for chunk in pixel_words.chunks(MAX_CHUNK_WORDS) {
            self.write_chunk(chunk)?;
        }
        Ok(pixel_words.len())
    }

    /// Bytes written so far, headers included.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the capture file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered data.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_chunk(&mut self, words: &[&[u8]]) -> Result<()> {
        let size = (words.len() * WORD_SIZE) as u16;
        self.writer.write_all(TPX3_CHUNK_MAGIC)?;
        self.writer.write_all(&[self.chip_index, 0])?;
        self.writer.write_all(&size.to_le_bytes())?;
        for word in words {
            self.writer.write_all(word)?;
        }
        self.bytes_written += 8 + u64::from(size);
        Ok(())
    }
}
