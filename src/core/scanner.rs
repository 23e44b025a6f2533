//! Chunked byte scanner
//!
//! Reads a backup file in bounded windows. Every window after the first is
//! prefixed with the tail of the previous one so that a pattern instance
//! split by a read boundary is still seen whole by the matchers.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::config::ConfigError;

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// The backup could not be opened or read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid scan configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The prefetch thread died before handing over its result
    #[error("chunk reader thread terminated unexpectedly")]
    ReaderPanicked,
}

impl ScanError {
    fn io(path: &Path, source: io::Error) -> Self {
        ScanError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One read window: carried prefix followed by newly read bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    index: usize,
    offset: u64,
    data: Vec<u8>,
    carry_len: usize,
    is_last: bool,
}

impl RawChunk {
    /// Build a chunk directly; used by tests and by callers feeding in-memory data
    pub fn new(index: usize, offset: u64, data: Vec<u8>, carry_len: usize, is_last: bool) -> Self {
        let carry_len = carry_len.min(data.len());
        Self {
            index,
            offset,
            data,
            carry_len,
            is_last,
        }
    }

    /// Full window, prefix included
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Sequence number of the chunk within the scan
    pub fn index(&self) -> usize {
        self.index
    }

    /// File offset of the first byte of the window
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the prefix replayed from the previous chunk
    pub fn carry_len(&self) -> usize {
        self.carry_len
    }

    /// Number of bytes read from the file for this chunk
    pub fn new_len(&self) -> usize {
        self.data.len() - self.carry_len
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Whether a match spanning `start..end` of the window belongs to this chunk.
    ///
    /// A match ending inside the prefix was reported by the previous chunk.
    /// A match touching the end of a non-final window may continue in the
    /// next read, so it is left for the next chunk, which sees it again in
    /// its prefix.
    pub fn owns(&self, start: usize, end: usize) -> bool {
        end > start && end >= self.carry_len && (self.is_last || end < self.data.len())
    }
}

/// Streaming reader producing [`RawChunk`]s in file order
#[derive(Debug)]
pub struct ChunkScanner {
    path: PathBuf,
    file: File,
    file_len: u64,
    chunk_size: usize,
    max_chunks: usize,
    carry_len: usize,
    carry: Vec<u8>,
    next_index: usize,
    offset: u64,
    finished: bool,
    budget_exhausted: bool,
}

impl ChunkScanner {
    /// Open a file for chunked scanning
    ///
    /// # Arguments
    ///
    /// * `path` - Backup file to scan
    /// * `chunk_size` - Bytes of new data per chunk
    /// * `max_chunks` - Maximum number of chunks to read
    /// * `carry_len` - Bytes replayed from the end of each window into the next
    ///
    /// # Returns
    ///
    /// A scanner positioned at the start of the file
    pub fn open(
        path: &Path,
        chunk_size: usize,
        max_chunks: usize,
        carry_len: usize,
    ) -> Result<Self, ScanError> {
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize.into());
        }

        let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
        let file_len = file.metadata().map_err(|e| ScanError::io(path, e))?.len();

        debug!(
            "Opened {} ({} bytes), chunk size {}, carry {}",
            path.display(),
            file_len,
            chunk_size,
            carry_len
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_len,
            chunk_size,
            max_chunks,
            carry_len,
            carry: Vec::with_capacity(carry_len),
            next_index: 0,
            offset: 0,
            finished: false,
            budget_exhausted: false,
        })
    }

    /// Size of the underlying file in bytes
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// True when the scan stopped on the chunk budget before reaching end of file
    pub fn budget_exhausted(&self) -> bool {
        self.budget_exhausted
    }

    /// Read the next window
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<RawChunk>, ScanError> {
        if self.finished || self.max_chunks == 0 {
            self.finished = true;
            return Ok(None);
        }

        let mut buffer = Vec::with_capacity(self.chunk_size);
        let bytes_read = (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(&mut buffer);
        let bytes_read = match bytes_read {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Err(ScanError::io(&self.path, e));
            }
        };

        if bytes_read == 0 {
            self.finished = true;
            // End of file fell exactly on a chunk boundary: replay the tail once
            // more as a final window so matches deferred to it are not lost.
            if self.next_index > 0 && !self.carry.is_empty() {
                let data = std::mem::take(&mut self.carry);
                let carry_len = data.len();
                let offset = self.offset - carry_len as u64;
                return Ok(Some(RawChunk::new(self.next_index, offset, data, carry_len, true)));
            }
            return Ok(None);
        }

        let at_eof = bytes_read < self.chunk_size || self.offset + bytes_read as u64 >= self.file_len;
        let at_budget = self.next_index + 1 >= self.max_chunks;
        if at_budget && !at_eof {
            self.budget_exhausted = true;
        }
        let is_last = bytes_read < self.chunk_size || at_budget;

        let carry_len = self.carry.len();
        let window_offset = self.offset - carry_len as u64;
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(&buffer);

        let keep = self.carry_len.min(data.len());
        self.carry = data[data.len() - keep..].to_vec();

        let chunk = RawChunk::new(self.next_index, window_offset, data, carry_len, is_last);

        self.offset += bytes_read as u64;
        self.next_index += 1;
        if is_last {
            self.finished = true;
        }

        Ok(Some(chunk))
    }
}

impl Iterator for ChunkScanner {
    type Item = Result<RawChunk, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
