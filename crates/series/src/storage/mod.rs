//! Paged storage engine.
//!
//! A paged file stores fixed-size items behind a header region. The body is
//! divided into pages of `page_size` bytes; every page holds
//! `page_size / item_size` items followed by `page_size % item_size` bytes
//! of padding, so no item ever straddles a page boundary.
//!
//! ```text
//! ┌────────────────┬──────────────────────────┬──────────────────────────┐
//! │ header region  │ page 0                   │ page 1                   │
//! │ (k * item)     │ item item item ... │ pad │ item item item ... │ pad │
//! └────────────────┴──────────────────────────┴──────────────────────────┘
//! ```
//!
//! Transfers go through positioned stream I/O or, when large enough, through
//! memory-mapped views (see [`StorageConfig`]).

pub mod header;
mod mmap;
pub mod paged;
pub mod serializer;

pub use header::{FileHeader, FormatVersion, HeaderReader, HeaderWriter, Version, FORMAT_VERSION};
pub use paged::{FileState, PagedFile};
pub use serializer::{BlockSerializer, FixedSerializer, ItemSerializer};

use crate::error::{Result, SeriesError};

/// Default page size (4 KiB).
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default smallest transfer that uses memory mapping (4 KiB).
pub const DEFAULT_MIN_MAPPED_TRANSFER: usize = 4096;

/// Default largest single mapped view (64 MiB).
pub const DEFAULT_MAX_VIEW_SIZE: usize = 64 * 1024 * 1024;

/// Sync mode applied when a file is flushed or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync data and metadata (default).
    #[default]
    Fsync,
    /// Sync data only.
    Fdatasync,
    /// No sync, for tests and scratch files.
    None,
}

/// Configuration of the paged storage engine.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Page size for new files. Existing files keep the page size stored in
    /// their header.
    pub page_size: usize,
    /// Allows memory-mapped transfers.
    pub use_memory_mapping: bool,
    /// Transfers must exceed this many bytes to be memory mapped.
    pub min_mapped_transfer: usize,
    /// Largest mapped view; larger transfers are split page-aligned.
    pub max_view_size: usize,
    /// Durability applied on flush and close.
    pub sync_mode: SyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            use_memory_mapping: true,
            min_mapped_transfer: DEFAULT_MIN_MAPPED_TRANSFER,
            max_view_size: DEFAULT_MAX_VIEW_SIZE,
            sync_mode: SyncMode::default(),
        }
    }
}

impl StorageConfig {
    /// Creates a configuration with the given page size and default
    /// transfer settings.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }
}

/// Offset arithmetic of a paged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    header_size: u64,
    page_size: u64,
    item_size: u64,
    items_per_page: u64,
}

impl PageLayout {
    /// Creates the layout of a file.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when the item size is zero or
    /// larger than a page, or the header region is not a multiple of the
    /// item size.
    pub fn new(header_size: usize, page_size: usize, item_size: usize) -> Result<Self> {
        if item_size == 0 || item_size > page_size {
            return Err(SeriesError::Configuration(format!(
                "item size {item_size} must be in [1, {page_size}] (the page size)"
            )));
        }
        if header_size % item_size != 0 {
            return Err(SeriesError::Configuration(format!(
                "header size {header_size} is not a multiple of item size {item_size}"
            )));
        }
        Ok(Self {
            header_size: header_size as u64,
            page_size: page_size as u64,
            item_size: item_size as u64,
            items_per_page: (page_size / item_size) as u64,
        })
    }

    /// Returns the header region size.
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Returns the page size.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Returns the item size.
    pub fn item_size(&self) -> u64 {
        self.item_size
    }

    /// Returns the number of items per page.
    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    /// Returns the unused bytes at the end of each page.
    pub fn padding(&self) -> u64 {
        self.page_size - self.items_per_page * self.item_size
    }

    /// Returns the byte offset of item `index`.
    pub fn item_offset(&self, index: u64) -> u64 {
        self.header_size
            + (index / self.items_per_page) * self.page_size
            + (index % self.items_per_page) * self.item_size
    }

    /// Returns the file length holding exactly `count` items.
    pub fn end_offset(&self, count: u64) -> u64 {
        if count == 0 {
            self.header_size
        } else {
            self.item_offset(count - 1) + self.item_size
        }
    }

    /// Rounds `offset` down to the start of its page.
    pub fn page_start(&self, offset: u64) -> u64 {
        if offset <= self.header_size {
            return 0;
        }
        let body = offset - self.header_size;
        self.header_size + body - body % self.page_size
    }

    /// Returns the number of whole items in a file of `length` bytes.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Corruption` when the file is shorter than its
    /// header or ends inside an item.
    pub fn item_count_from_length(&self, length: u64) -> Result<u64> {
        if length < self.header_size {
            return Err(SeriesError::Corruption(format!(
                "file length {length} is shorter than the header ({} bytes)",
                self.header_size
            )));
        }
        let body = length - self.header_size;
        let full_pages = body / self.page_size;
        let trailing = body % self.page_size;
        let items_area = self.items_per_page * self.item_size;
        if trailing < items_area && trailing % self.item_size != 0 {
            return Err(SeriesError::Corruption(format!(
                "file length {length} ends inside an item of {} bytes",
                self.item_size
            )));
        }
        Ok(full_pages * self.items_per_page + (trailing / self.item_size).min(self.items_per_page))
    }
}
