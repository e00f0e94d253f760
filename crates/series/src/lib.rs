//! Alopex Series - ordered record files with delta-encoded blocks
//!
//! This crate stores records ordered by a key in paged binary files and
//! answers key lookups with a cached binary search.
//!
//! # Components
//!
//! - [`codec`]: varints and hashed, size-bounded blocks
//! - [`field`]: field descriptor trees compiled into a [`DynamicSerializer`]
//! - [`storage`]: page-aligned item files with memory-mapped transfers
//! - [`series`]: [`SeriesFile`] and [`CompressedSeriesFile`], the ordered
//!   indexes with append, truncation, search and streams
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_series::{CompressedSeriesFile, KeyField, OrderedSeries, SeriesConfig};
//!
//! let key = KeyField::new("timestamp", |r: &Reading| r.timestamp);
//! let mut series = CompressedSeriesFile::create(&path, key, SeriesConfig::default())?;
//! series.append(readings, false)?;
//!
//! // Newest first, down to (but excluding) `since`
//! for segment in series.stream(None, true, Some(&since))? {
//!     for reading in segment? {
//!         println!("{reading:?}");
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod field;
pub mod series;
pub mod storage;

pub use error::{Result, SeriesError};
pub use field::{DynamicSerializer, Field, Record, Shape, Value, ValueKind};
pub use series::{
    CompressedSeriesFile, KeyField, OrderedSeries, SearchOutcome, SeriesConfig, SeriesFile,
    SeriesStream,
};
pub use storage::{PagedFile, StorageConfig, SyncMode};
