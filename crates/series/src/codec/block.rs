//! Block framing for delta-encoded record streams.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────┬────────────────────────┬──────────────┬──────────────┐
//! │ count (varint)   │ records (field codec)  │ hash (8 B)   │ zero padding │
//! └──────────────────┴────────────────────────┴──────────────┴──────────────┘
//! ```
//!
//! Records are written before their count is known, starting after a
//! reserved prefix of [`MAX_VARINT_LEN`] bytes. [`CodecWriter::finish_block`]
//! places the count immediately in front of the records, appends the first
//! eight bytes of a SHA-256 digest over `count + records`, and moves the
//! finished block to the start of the buffer.

use crate::codec::varint::{self, MAX_VARINT_LEN};
use crate::error::{Result, SeriesError};
use sha2::{Digest, Sha256};

/// Size of the trailing content hash in bytes.
pub const BLOCK_HASH_SIZE: usize = 8;

/// Bytes reserved at the start of the buffer for the record count.
const HEADER_RESERVE: usize = MAX_VARINT_LEN;

/// Smallest block that can hold the framing plus one maximal varint.
pub const MIN_BLOCK_SIZE: usize = HEADER_RESERVE + MAX_VARINT_LEN + BLOCK_HASH_SIZE;

/// Computes the truncated content hash stored at the end of each block.
pub fn content_hash(content: &[u8]) -> u64 {
    let digest = Sha256::digest(content);
    let mut head = [0u8; BLOCK_HASH_SIZE];
    head.copy_from_slice(&digest[..BLOCK_HASH_SIZE]);
    u64::from_le_bytes(head)
}

/// Write cursor over a fixed-size block buffer.
///
/// Every `write_*` method reports whether the bytes written so far still
/// fit in front of the reserved hash. Once a write returns `false` the
/// caller must stop, roll back to the start of the current record with
/// [`CodecWriter::set_position`] and finish the block.
#[derive(Debug, Clone)]
pub struct CodecWriter {
    /// Block buffer with [`MAX_VARINT_LEN`] bytes of trailing slack.
    buffer: Vec<u8>,
    /// Nominal block size in bytes.
    block_size: usize,
    /// Current write position.
    position: usize,
    /// Last position records may reach before the hash.
    limit: usize,
    /// Number of records in the last finished block.
    record_count: u64,
    /// Byte length of the last finished block.
    finished_len: usize,
}

impl CodecWriter {
    /// Creates a writer for blocks of `block_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when `block_size` is smaller
    /// than [`MIN_BLOCK_SIZE`].
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(SeriesError::Configuration(format!(
                "block size {block_size} is below the minimum of {MIN_BLOCK_SIZE} bytes"
            )));
        }
        Ok(Self {
            buffer: vec![0u8; block_size + MAX_VARINT_LEN],
            block_size,
            position: HEADER_RESERVE,
            limit: block_size - BLOCK_HASH_SIZE,
            record_count: 0,
            finished_len: 0,
        })
    }

    /// Returns the nominal block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the current write position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Rewinds (or advances) the write position, typically to drop a record
    /// that did not fit.
    pub fn set_position(&mut self, position: usize) {
        debug_assert!(position >= HEADER_RESERVE && position <= self.buffer.len());
        self.position = position;
    }

    /// Discards any buffered content and prepares for a new block.
    pub fn reset(&mut self) {
        self.position = HEADER_RESERVE;
        self.record_count = 0;
        self.finished_len = 0;
    }

    /// Writes one raw byte.
    pub fn write_byte(&mut self, value: u8) -> bool {
        if self.position >= self.buffer.len() {
            return false;
        }
        self.buffer[self.position] = value;
        self.position += 1;
        self.position <= self.limit
    }

    /// Writes an unsigned varint.
    pub fn write_unsigned(&mut self, value: u64) -> bool {
        if self.position > self.limit {
            return false;
        }
        self.position = varint::encode_unsigned(&mut self.buffer, self.position, value);
        self.position <= self.limit
    }

    /// Writes a signed varint.
    pub fn write_signed(&mut self, value: i64) -> bool {
        if self.position > self.limit {
            return false;
        }
        self.position = varint::encode_signed(&mut self.buffer, self.position, value);
        self.position <= self.limit
    }

    /// Completes the block holding `count` records.
    ///
    /// When `is_full` is set the block is zero-padded to the full block size
    /// so that it occupies a fixed stride; otherwise it ends right after the
    /// hash.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Serializer` when the record bytes overran the
    /// reserved hash area, which means a write failure was ignored.
    pub fn finish_block(&mut self, count: u64, is_full: bool) -> Result<&[u8]> {
        if self.position > self.limit {
            return Err(SeriesError::Serializer(format!(
                "block content overran its limit ({} > {})",
                self.position, self.limit
            )));
        }

        let count_len = varint::unsigned_len(count);
        let start = HEADER_RESERVE - count_len;
        varint::encode_unsigned(&mut self.buffer, start, count);

        let hash = content_hash(&self.buffer[start..self.position]);
        let hash_end = self.position + BLOCK_HASH_SIZE;
        self.buffer[self.position..hash_end].copy_from_slice(&hash.to_le_bytes());

        self.buffer.copy_within(start..hash_end, 0);
        let mut len = hash_end - start;
        if is_full && len < self.block_size {
            self.buffer[len..self.block_size].fill(0);
            len = self.block_size;
        }

        self.record_count = count;
        self.finished_len = len;
        self.position = HEADER_RESERVE;
        Ok(&self.buffer[..len])
    }

    /// Returns the last finished block.
    pub fn block(&self) -> &[u8] {
        &self.buffer[..self.finished_len]
    }

    /// Returns the record count of the last finished block.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }
}

/// Read cursor over one encoded block.
#[derive(Debug, Clone)]
pub struct CodecReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> CodecReader<'a> {
    /// Creates a reader positioned at the start of `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Returns the current read position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Reads the record count at the start of the block.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Serializer` when called anywhere but at the
    /// block start, or when the count is malformed.
    pub fn read_header(&mut self) -> Result<u64> {
        if self.position != 0 {
            return Err(SeriesError::Serializer(format!(
                "block header read at position {}",
                self.position
            )));
        }
        self.read_unsigned()
    }

    /// Reads one raw byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self.buffer.get(self.position).ok_or_else(|| {
            SeriesError::Serializer(format!("unexpected end of block at byte {}", self.position))
        })?;
        self.position += 1;
        Ok(byte)
    }

    /// Reads an unsigned varint.
    pub fn read_unsigned(&mut self) -> Result<u64> {
        varint::decode_unsigned(self.buffer, &mut self.position)
    }

    /// Reads a signed varint.
    pub fn read_signed(&mut self) -> Result<i64> {
        varint::decode_signed(self.buffer, &mut self.position)
    }

    /// Verifies the content hash that follows the last decoded record.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::ChecksumMismatch` when the stored and computed
    /// hashes differ.
    pub fn verify_hash(&mut self) -> Result<()> {
        let end = self.position + BLOCK_HASH_SIZE;
        let stored = self.buffer.get(self.position..end).ok_or_else(|| {
            SeriesError::Serializer(format!(
                "block ends before its hash at byte {}",
                self.position
            ))
        })?;
        let mut raw = [0u8; BLOCK_HASH_SIZE];
        raw.copy_from_slice(stored);
        let expected = u64::from_le_bytes(raw);
        let actual = content_hash(&self.buffer[..self.position]);
        if expected != actual {
            return Err(SeriesError::ChecksumMismatch { expected, actual });
        }
        self.position = end;
        Ok(())
    }
}
