//! Error and Result types for series storage operations.

use crate::storage::Version;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for series storage operations.
pub type Result<T> = std::result::Result<T, SeriesError>;

/// The error type for series storage operations.
#[derive(Debug, Error)]
pub enum SeriesError {
    /// Invalid field or file configuration, detected when a field is frozen
    /// or a file is created.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Mutation attempted on a field that has already been made read-only.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A record value could not be encoded or decoded.
    #[error("Serializer error: {0}")]
    Serializer(String),

    /// A value does not fit the representable range of its encoding.
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Block content hash does not match the stored hash.
    #[error("Checksum mismatch: expected {expected:#018x}, got {actual:#018x}")]
    ChecksumMismatch {
        /// Hash stored in the block.
        expected: u64,
        /// Hash computed over the block content.
        actual: u64,
    },

    /// Operation attempted on a closed file.
    #[error("File has been closed")]
    Disposed,

    /// Item index or count is outside the valid bounds.
    #[error("Out of range: {what} {value} not in [0, {limit}]")]
    OutOfRange {
        /// Name of the offending argument.
        what: &'static str,
        /// The offending value.
        value: u64,
        /// The inclusive upper bound.
        limit: u64,
    },

    /// Stream position or file length does not match the expected layout.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Serialized header does not fit into one page.
    #[error("Header of {size} bytes exceeds page size {page_size}")]
    HeaderTooLarge {
        /// Serialized header size in bytes (after rounding).
        size: usize,
        /// Configured page size in bytes.
        page_size: usize,
    },

    /// Appended key is out of order relative to the previous key.
    #[error("Ordering violation: key {key} follows {previous}")]
    Ordering {
        /// Debug rendering of the previous key.
        previous: String,
        /// Debug rendering of the offending key.
        key: String,
    },

    /// A header component was written by an unsupported format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(Version),

    /// The record type stored in the file differs from the requested one.
    #[error("Type mismatch: file holds {found}, expected {expected}")]
    TypeMismatch {
        /// Type name requested by the caller.
        expected: String,
        /// Type name recorded in the file header.
        found: String,
    },

    /// The header references a field kind this build does not know.
    #[error("Unknown field kind: {0}")]
    UnknownFieldKind(String),

    /// The header references an item serializer this build does not know.
    #[error("Unknown serializer: {0}")]
    UnknownSerializer(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl SeriesError {
    pub(crate) fn ordering<K: std::fmt::Debug>(previous: &K, key: &K) -> Self {
        Self::Ordering {
            previous: format!("{previous:?}"),
            key: format!("{key:?}"),
        }
    }
}
