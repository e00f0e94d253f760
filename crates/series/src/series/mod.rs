//! Ordered series index over paged files.
//!
//! A series file stores records ordered by a key extracted from each record.
//! On top of the paged engine it adds:
//!
//! - a cached binary search by key ([`OrderedSeries::binary_search`])
//! - monotonic append with optional truncation to the first appended key
//! - truncation by count or key
//! - lazy forward and reverse streams from any key ([`OrderedSeries::stream`])
//!
//! Two file kinds share this interface: [`SeriesFile`] stores one record per
//! item, [`CompressedSeriesFile`] stores delta-encoded blocks of records.
//!
//! ## Index Section
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ index version: 4 x i32               │
//! │ key name: string                     │
//! │ unique keys: u8                      │
//! │ field tree (compressed files only)   │
//! └──────────────────────────────────────┘
//! ```

pub mod compressed;
pub mod file;
mod search;
pub mod stream;
mod validate;

pub use compressed::CompressedSeriesFile;
pub use file::SeriesFile;
pub use stream::SeriesStream;

use crate::error::{Result, SeriesError};
use crate::storage::{HeaderReader, HeaderWriter, StorageConfig, Version};
use std::fmt::{self, Debug};

/// Default capacity of the search cache (2^20 visited keys).
pub const DEFAULT_SEARCH_CACHE_SIZE: usize = 1 << 20;

/// Default number of records per stream segment.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 1024;

/// Default number of items written per append segment.
pub const DEFAULT_APPEND_BUFFER_SIZE: usize = 1024;

/// Default block size of compressed files (4 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Version of the index section.
const INDEX_VERSION: Version = Version::new(1, 0);

/// Configuration of a series file.
#[derive(Debug, Clone)]
pub struct SeriesConfig {
    /// Paged storage settings.
    pub storage: StorageConfig,
    /// Requires strictly increasing keys. Fixed at creation; opening an
    /// existing file uses the stored flag.
    pub unique_keys: bool,
    /// Maximum number of cached search keys; 0 disables the cache.
    pub search_cache_size: usize,
    /// Records per segment yielded by streams.
    pub stream_buffer_size: usize,
    /// Items written per segment when appending.
    pub append_buffer_size: usize,
    /// Block size of new compressed files.
    pub block_size: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            unique_keys: false,
            search_cache_size: DEFAULT_SEARCH_CACHE_SIZE,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            append_buffer_size: DEFAULT_APPEND_BUFFER_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl SeriesConfig {
    fn check(&self) -> Result<()> {
        if self.stream_buffer_size == 0 || self.append_buffer_size == 0 {
            return Err(SeriesError::Configuration(format!(
                "stream buffer ({}) and append buffer ({}) must not be empty",
                self.stream_buffer_size, self.append_buffer_size
            )));
        }
        Ok(())
    }
}

/// The ordering key of a record type.
pub struct KeyField<T, K> {
    name: String,
    extract: fn(&T) -> K,
}

impl<T, K> KeyField<T, K> {
    /// Creates a key named `name` (recorded in the file header).
    pub fn new(name: impl Into<String>, extract: fn(&T) -> K) -> Self {
        Self {
            name: name.into(),
            extract,
        }
    }

    /// Returns the key name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extracts the key of `record`.
    pub fn key(&self, record: &T) -> K {
        (self.extract)(record)
    }

    /// Returns the extractor function.
    pub fn extractor(&self) -> fn(&T) -> K {
        self.extract
    }
}

impl<T, K> Clone for KeyField<T, K> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            extract: self.extract,
        }
    }
}

impl<T, K> Debug for KeyField<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyField").field("name", &self.name).finish()
    }
}

/// Result of a binary search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Index of a record holding the key.
    Found(u64),
    /// Index at which the key would be inserted.
    NotFound(u64),
}

impl SearchOutcome {
    /// Returns the index, or the bitwise complement of the insertion point
    /// for a miss.
    pub fn to_signed(self) -> i64 {
        match self {
            Self::Found(index) => index as i64,
            Self::NotFound(insertion) => !(insertion as i64),
        }
    }

    /// Returns the found index or the insertion point.
    pub fn position(self) -> u64 {
        match self {
            Self::Found(index) | Self::NotFound(index) => index,
        }
    }

    /// Returns the found index.
    pub fn found(self) -> Option<u64> {
        match self {
            Self::Found(index) => Some(index),
            Self::NotFound(_) => None,
        }
    }

    /// Returns the index of the first record after the key's run.
    fn after(self) -> u64 {
        match self {
            Self::Found(index) => index + 1,
            Self::NotFound(insertion) => insertion,
        }
    }
}

/// Read access shared by the series file kinds.
pub trait OrderedSeries {
    /// Record type.
    type Record;
    /// Key type.
    type Key: Ord + Clone + Debug;

    /// Returns the number of records.
    fn count(&self) -> Result<u64>;

    /// Reads `count` records starting at record `first`.
    fn read(&self, first: u64, count: usize) -> Result<Vec<Self::Record>>;

    /// Finds `key`. With duplicate keys, `find_first` selects the first
    /// record of the run, otherwise the last.
    fn binary_search(&self, key: &Self::Key, find_first: bool) -> Result<SearchOutcome>;

    /// Returns the key of the first record.
    fn first_key(&self) -> Result<Option<Self::Key>>;

    /// Returns the key of the last record.
    fn last_key(&self) -> Result<Option<Self::Key>>;

    /// Returns the stream segment size.
    fn stream_buffer_size(&self) -> usize;

    /// Streams records lazily in segments.
    ///
    /// Forward streams cover keys in `[from, until)`, reverse streams keys
    /// in `(until, from]`, newest first. Missing bounds mean the file's
    /// start or end. The range is resolved when the stream is created;
    /// calling `stream` again restarts from scratch.
    ///
    /// # Errors
    ///
    /// Returns storage errors from resolving the bounds.
    fn stream(
        &self,
        from: Option<&Self::Key>,
        in_reverse: bool,
        until: Option<&Self::Key>,
    ) -> Result<SeriesStream<'_, Self>>
    where
        Self: Sized,
    {
        let count = self.count()?;
        let (start, end) = if in_reverse {
            let end = match from {
                Some(key) => self.binary_search(key, false)?.after(),
                None => count,
            };
            let start = match until {
                Some(key) => self.binary_search(key, false)?.after(),
                None => 0,
            };
            (start, end)
        } else {
            let start = match from {
                Some(key) => self.binary_search(key, true)?.position(),
                None => 0,
            };
            let end = match until {
                Some(key) => self.binary_search(key, true)?.position(),
                None => count,
            };
            (start, end)
        };
        Ok(SeriesStream::new(
            self,
            start,
            end.max(start),
            in_reverse,
            self.stream_buffer_size(),
        ))
    }
}

/// Index section of the header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexHeader {
    key_name: String,
    unique_keys: bool,
}

impl IndexHeader {
    fn write_to(&self, writer: &mut HeaderWriter) {
        writer.write_version(INDEX_VERSION);
        writer.write_string(&self.key_name);
        writer.write_bool(self.unique_keys);
    }

    fn read_from(reader: &mut HeaderReader<'_>) -> Result<Self> {
        let version = reader.read_version()?;
        if (version.major, version.minor) != (1, 0) {
            return Err(SeriesError::UnsupportedVersion(version));
        }
        Ok(Self {
            key_name: reader.read_string()?,
            unique_keys: reader.read_bool()?,
        })
    }

    /// Checks the stored key against the caller's key field.
    fn check_key(&self, key_name: &str) -> Result<()> {
        if self.key_name != key_name {
            return Err(SeriesError::Configuration(format!(
                "file is indexed by '{}', not '{key_name}'",
                self.key_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_outcome_signed() {
        assert_eq!(SearchOutcome::Found(3).to_signed(), 3);
        assert_eq!(SearchOutcome::NotFound(0).to_signed(), -1);
        assert_eq!(SearchOutcome::NotFound(5).to_signed(), -6);
        assert_eq!(SearchOutcome::NotFound(5).position(), 5);
        assert_eq!(SearchOutcome::Found(5).found(), Some(5));
        assert_eq!(SearchOutcome::Found(5).after(), 6);
    }

    #[test]
    fn test_index_header_roundtrip() {
        let header = IndexHeader {
            key_name: "timestamp".to_string(),
            unique_keys: true,
        };
        let mut writer = HeaderWriter::new();
        header.write_to(&mut writer);
        let bytes = writer.into_bytes();
        let parsed = IndexHeader::read_from(&mut HeaderReader::new(&bytes)).unwrap();
        assert_eq!(parsed, header);
        parsed.check_key("timestamp").unwrap();
        assert!(matches!(
            parsed.check_key("id"),
            Err(SeriesError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = SeriesConfig::default();
        assert_eq!(config.search_cache_size, 1 << 20);
        assert_eq!(config.stream_buffer_size, 1024);
        assert_eq!(config.block_size, 4096);
        assert!(!config.unique_keys);
        config.check().unwrap();
    }
}
