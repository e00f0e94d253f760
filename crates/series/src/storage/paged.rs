//! Paged file: header, item count and item transfers.
//!
//! ## Lifecycle
//!
//! ```text
//!   create ──► New ──header written──► Active ──close──► Closed
//!   open ─────────────header parsed──► Active
//! ```
//!
//! Every operation on a closed file fails with `SeriesError::Disposed`.
//! The item count is derived from the file length when a file is opened and
//! afterwards tracked in memory; writes only grow it, truncation shrinks it.

use crate::error::{Result, SeriesError};
use crate::storage::header::{FormatVersion, HEADER_SIZE_FIELD};
use crate::storage::mmap::MappedView;
use crate::storage::{
    FileHeader, HeaderReader, HeaderWriter, ItemSerializer, PageLayout, StorageConfig, SyncMode,
    FORMAT_VERSION,
};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lifecycle state of a [`PagedFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Created, header not yet written.
    New,
    /// Header written or parsed; reads and writes are permitted.
    Active,
    /// Closed; every operation fails.
    Closed,
}

/// A single file of fixed-size items.
///
/// Mutations take `&mut self`; reads take `&self` and use positioned I/O,
/// so one handle serves concurrent readers.
#[derive(Debug)]
pub struct PagedFile<S: ItemSerializer> {
    path: PathBuf,
    file: Option<File>,
    serializer: S,
    header: FileHeader,
    layout: PageLayout,
    config: StorageConfig,
    count: u64,
    state: FileState,
}

impl<S: ItemSerializer> PagedFile<S> {
    /// Creates a new, empty file, replacing any existing file at `path`.
    ///
    /// `extra` appends the owner's section (key name, field tree ...) to the
    /// header after the serializer section.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when items do not fit a page,
    /// `SeriesError::HeaderTooLarge` when the header does not fit a page, or
    /// an I/O error.
    pub fn create<F>(
        path: impl AsRef<Path>,
        serializer: S,
        type_name: &str,
        config: StorageConfig,
        extra: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut HeaderWriter) -> Result<()>,
    {
        let path = path.as_ref().to_path_buf();
        let item_size = serializer.item_size();
        let page_size = config.page_size;
        if item_size == 0 || item_size > page_size || page_size > i32::MAX as usize {
            return Err(SeriesError::Configuration(format!(
                "item size {item_size} must be in [1, {page_size}] (the page size)"
            )));
        }

        let mut writer = HeaderWriter::new();
        writer.write_i32(0);
        writer.write_version(FORMAT_VERSION);
        writer.write_string(type_name);
        writer.write_i32(page_size as i32);
        writer.write_string(S::TYPE_NAME);
        writer.write_version(S::VERSION);
        serializer.write_header(&mut writer);
        let extra_start = writer.len();
        extra(&mut writer)?;

        let header_size = writer.len().div_ceil(item_size) * item_size;
        if header_size > page_size {
            return Err(SeriesError::HeaderTooLarge {
                size: header_size,
                page_size,
            });
        }
        writer.patch_i32(0, header_size as i32);
        writer.pad_to(header_size);
        let bytes = writer.into_bytes();

        let layout = PageLayout::new(header_size, page_size, item_size)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut paged = Self {
            path,
            file: Some(file),
            serializer,
            header: FileHeader {
                header_size,
                version: FORMAT_VERSION,
                type_name: type_name.to_string(),
                page_size,
                serializer_name: S::TYPE_NAME.to_string(),
                serializer_version: S::VERSION,
                extra: bytes[extra_start..].to_vec(),
            },
            layout,
            config,
            count: 0,
            state: FileState::New,
        };
        paged.write_header(&bytes)?;

        debug!(
            "Created paged file {} ({}, item {} B, page {} B, header {} B)",
            paged.path.display(),
            type_name,
            item_size,
            page_size,
            header_size
        );
        Ok(paged)
    }

    fn write_header(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.file_mut()?;
        file.write_all(bytes)?;
        file.flush()?;
        self.state = FileState::Active;
        Ok(())
    }

    /// Opens an existing file holding `expected_type` records.
    ///
    /// The page size stored in the file overrides `config.page_size`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::TypeMismatch` or `SeriesError::UnknownSerializer`
    /// when the header describes different content,
    /// `SeriesError::UnsupportedVersion` for unknown format versions and
    /// `SeriesError::Corruption` for malformed headers or lengths.
    pub fn open(
        path: impl AsRef<Path>,
        mut config: StorageConfig,
        expected_type: &str,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let length = file.metadata()?.len();

        let mut size_field = [0u8; HEADER_SIZE_FIELD];
        file.read_exact(&mut size_field)
            .map_err(|e| SeriesError::Corruption(format!("cannot read header size: {e}")))?;
        let header_size = i32::from_le_bytes(size_field);
        let header_size = usize::try_from(header_size)
            .ok()
            .filter(|&s| s >= HEADER_SIZE_FIELD && s as u64 <= length)
            .ok_or_else(|| {
                SeriesError::Corruption(format!(
                    "header size {header_size} invalid for a file of {length} bytes"
                ))
            })?;

        let mut bytes = vec![0u8; header_size];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut bytes)?;

        let mut reader = HeaderReader::new(&bytes);
        reader.read_i32()?;
        let version = reader.read_version()?;
        FormatVersion::parse(version)?;
        let type_name = reader.read_string()?;
        let page_size = reader.read_i32()?;
        let page_size = usize::try_from(page_size)
            .ok()
            .filter(|&p| p >= header_size)
            .ok_or_else(|| {
                SeriesError::Corruption(format!(
                    "page size {page_size} invalid for a header of {header_size} bytes"
                ))
            })?;
        let serializer_name = reader.read_string()?;
        if serializer_name != S::TYPE_NAME {
            return Err(SeriesError::UnknownSerializer(serializer_name));
        }
        let serializer_version = reader.read_version()?;
        let serializer = S::read_header(&mut reader, serializer_version)?;
        if type_name != expected_type {
            return Err(SeriesError::TypeMismatch {
                expected: expected_type.to_string(),
                found: type_name,
            });
        }
        let extra = reader.remaining().to_vec();

        let layout = PageLayout::new(header_size, page_size, serializer.item_size())
            .map_err(|e| SeriesError::Corruption(e.to_string()))?;
        let count = layout.item_count_from_length(length).map_err(|e| {
            warn!("Paged file {} has an invalid length: {}", path.display(), e);
            e
        })?;
        config.page_size = page_size;

        debug!(
            "Opened paged file {} ({}, {} items)",
            path.display(),
            type_name,
            count
        );
        Ok(Self {
            path,
            file: Some(file),
            serializer,
            header: FileHeader {
                header_size,
                version,
                type_name,
                page_size,
                serializer_name,
                serializer_version,
                extra,
            },
            layout,
            config,
            count,
            state: FileState::Active,
        })
    }

    fn file(&self) -> Result<&File> {
        match (&self.file, self.state) {
            (Some(file), FileState::New | FileState::Active) => Ok(file),
            _ => Err(SeriesError::Disposed),
        }
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        match (&mut self.file, self.state) {
            (Some(file), FileState::New | FileState::Active) => Ok(file),
            _ => Err(SeriesError::Disposed),
        }
    }

    fn ensure_active(&self) -> Result<&File> {
        if self.state != FileState::Active {
            return Err(SeriesError::Disposed);
        }
        self.file()
    }

    /// Fails with `SeriesError::Disposed` unless the file is active.
    pub fn ensure_open(&self) -> Result<()> {
        self.ensure_active().map(|_| ())
    }

    /// Returns the number of items.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> FileState {
        self.state
    }

    /// Returns true once the file was closed.
    pub fn is_closed(&self) -> bool {
        self.state == FileState::Closed
    }

    /// Returns the parsed header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Returns the offset arithmetic.
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Returns the item serializer.
    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn use_mapping(&self, bytes: u64) -> bool {
        self.config.use_memory_mapping
            && self.serializer.supports_mapping()
            && bytes > self.config.min_mapped_transfer as u64
    }

    /// Largest number of pages mapped at once.
    fn pages_per_view(&self) -> u64 {
        (self.config.max_view_size as u64 / self.layout.page_size()).max(1)
    }

    /// Returns the end (exclusive) of the mapped chunk starting at `index`.
    fn chunk_end(&self, index: u64, end: u64) -> u64 {
        let ipp = self.layout.items_per_page();
        let page = index / ipp;
        end.min((page + self.pages_per_view()) * ipp)
    }

    /// Reads `count` items starting at `first`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Disposed` after close, `SeriesError::OutOfRange`
    /// when the range exceeds the item count, `SeriesError::Corruption` when
    /// the file ends inside the range.
    pub fn read(&self, first: u64, count: usize) -> Result<Vec<S::Item>> {
        let file = self.ensure_active()?;
        if first > self.count {
            return Err(SeriesError::OutOfRange {
                what: "first item",
                value: first,
                limit: self.count,
            });
        }
        let end = first + count as u64;
        if end > self.count {
            return Err(SeriesError::OutOfRange {
                what: "item range end",
                value: end,
                limit: self.count,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let start_offset = self.layout.item_offset(first);
        let end_offset = self.layout.end_offset(end);
        let item_size = self.layout.item_size() as usize;
        let mut items = Vec::with_capacity(count);

        if self.use_mapping(end_offset - start_offset) {
            let mut index = first;
            while index < end {
                let chunk_end = self.chunk_end(index, end);
                let view_start = self.layout.page_start(self.layout.item_offset(index));
                let view_len = (self.layout.end_offset(chunk_end) - view_start) as usize;
                let view = MappedView::map_read(file, view_start, view_len)?;
                for i in index..chunk_end {
                    let slot = view.slice(self.layout.item_offset(i), item_size)?;
                    items.push(self.serializer.decode(slot)?);
                }
                index = chunk_end;
            }
            return Ok(items);
        }

        let mut buf = vec![0u8; (end_offset - start_offset) as usize];
        read_exact_at(file, &mut buf, start_offset)
            .map_err(|e| self.short_transfer(e, start_offset))?;
        for i in first..end {
            let at = (self.layout.item_offset(i) - start_offset) as usize;
            items.push(self.serializer.decode(&buf[at..at + item_size])?);
        }
        Ok(items)
    }

    /// Writes `items` starting at `first`, overwriting or appending.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Disposed` after close, `SeriesError::OutOfRange`
    /// when `first` is beyond the item count, or serializer errors. A
    /// failed write leaves the file length unchanged.
    pub fn write(&mut self, first: u64, items: &[S::Item]) -> Result<()> {
        self.ensure_active()?;
        if first > self.count {
            return Err(SeriesError::OutOfRange {
                what: "first item",
                value: first,
                limit: self.count,
            });
        }
        if items.is_empty() {
            return Ok(());
        }

        let original_length = self.file()?.metadata()?.len();
        if let Err(e) = self.write_items(first, items) {
            self.restore_length(original_length);
            return Err(e);
        }

        let length = self.file()?.metadata()?.len();
        let physical = self.layout.item_count_from_length(length)?;
        self.count = self.count.max(physical);
        Ok(())
    }

    fn write_items(&self, first: u64, items: &[S::Item]) -> Result<()> {
        let end = first + items.len() as u64;
        let start_offset = self.layout.item_offset(first);
        let end_offset = self.layout.end_offset(end);
        let item_size = self.layout.item_size() as usize;
        let file = self.file()?;

        if self.use_mapping(end_offset - start_offset) {
            if file.metadata()?.len() < end_offset {
                file.set_len(end_offset)?;
            }
            let mut index = first;
            while index < end {
                let chunk_end = self.chunk_end(index, end);
                let view_start = self.layout.page_start(self.layout.item_offset(index));
                let view_len = (self.layout.end_offset(chunk_end) - view_start) as usize;
                let mut view = MappedView::map_write(file, view_start, view_len)?;
                for i in index..chunk_end {
                    let slot = view.slice_mut(self.layout.item_offset(i), item_size)?;
                    self.serializer.encode(&items[(i - first) as usize], slot)?;
                }
                view.flush()?;
                index = chunk_end;
            }
            return Ok(());
        }

        let mut buf = vec![0u8; (end_offset - start_offset) as usize];
        for (i, item) in (first..end).zip(items) {
            let at = (self.layout.item_offset(i) - start_offset) as usize;
            self.serializer.encode(item, &mut buf[at..at + item_size])?;
        }
        write_all_at(file, &buf, start_offset).map_err(|e| self.short_transfer(e, start_offset))
    }

    /// Shrinks the file back to `length` bytes after a failed write, so no
    /// partially written slot becomes visible to the next count.
    fn restore_length(&self, length: u64) {
        let Ok(file) = self.file() else {
            return;
        };
        let restored = file
            .metadata()
            .and_then(|m| if m.len() > length { file.set_len(length) } else { Ok(()) });
        if let Err(e) = restored {
            warn!(
                "Failed to restore {} to {} bytes after a failed write: {}",
                self.path.display(),
                length,
                e
            );
        }
    }

    fn short_transfer(&self, err: std::io::Error, offset: u64) -> SeriesError {
        if err.kind() != ErrorKind::UnexpectedEof {
            return err.into();
        }
        warn!(
            "Transfer at byte {} ran past the end of {}",
            offset,
            self.path.display()
        );
        SeriesError::Corruption(format!("file ends inside the transfer at byte {offset}"))
    }

    /// Shrinks the file to `count` items. Truncating to the current count
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Disposed` after close and
    /// `SeriesError::OutOfRange` when `count` exceeds the item count.
    pub fn truncate(&mut self, count: u64) -> Result<()> {
        let file = self.ensure_active()?;
        if count > self.count {
            return Err(SeriesError::OutOfRange {
                what: "truncation count",
                value: count,
                limit: self.count,
            });
        }
        if count == self.count {
            return Ok(());
        }
        file.set_len(self.layout.end_offset(count))?;
        debug!(
            "Truncated {} from {} to {} items",
            self.path.display(),
            self.count,
            count
        );
        self.count = count;
        Ok(())
    }

    /// Flushes buffered data according to the configured sync mode.
    pub fn flush(&mut self) -> Result<()> {
        let sync_mode = self.config.sync_mode;
        let file = self.file_mut()?;
        file.flush()?;
        match sync_mode {
            SyncMode::Fsync => file.sync_all()?,
            SyncMode::Fdatasync => file.sync_data()?,
            SyncMode::None => {}
        }
        Ok(())
    }

    /// Flushes and releases the file handle.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Disposed` when the file was already closed.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.flush()?;
        self.file = None;
        self.state = FileState::Closed;
        debug!("Closed {} with {} items", self.path.display(), self.count);
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BlockSerializer, FixedSerializer};
    use tempfile::TempDir;

    fn scratch_config(page_size: usize, use_memory_mapping: bool) -> StorageConfig {
        StorageConfig {
            page_size,
            use_memory_mapping,
            min_mapped_transfer: 64,
            sync_mode: SyncMode::None,
            ..StorageConfig::default()
        }
    }

    fn create_i64(dir: &TempDir, config: StorageConfig) -> PagedFile<FixedSerializer<i64>> {
        PagedFile::create(
            dir.path().join("values.series"),
            FixedSerializer::new(),
            "i64",
            config,
            |_| Ok(()),
        )
        .unwrap()
    }

    #[test]
    fn test_create_write_read() {
        let dir = TempDir::new().unwrap();
        let mut file = create_i64(&dir, scratch_config(4096, false));
        assert_eq!(file.state(), FileState::Active);
        assert_eq!(file.header().header_size % 8, 0);

        file.write(0, &[1, 2, 3]).unwrap();
        assert_eq!(file.count(), 3);
        file.write(3, &[4]).unwrap();
        file.write(1, &[20]).unwrap();
        assert_eq!(file.count(), 4);
        assert_eq!(file.read(0, 4).unwrap(), vec![1, 20, 3, 4]);
        assert_eq!(file.read(4, 0).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_bounds() {
        let dir = TempDir::new().unwrap();
        let mut file = create_i64(&dir, scratch_config(4096, false));
        file.write(0, &[1, 2]).unwrap();
        assert!(matches!(
            file.read(1, 2),
            Err(SeriesError::OutOfRange { .. })
        ));
        assert!(matches!(
            file.read(3, 0),
            Err(SeriesError::OutOfRange { .. })
        ));
        assert!(matches!(
            file.write(3, &[9]),
            Err(SeriesError::OutOfRange { .. })
        ));
        assert!(matches!(
            file.truncate(5),
            Err(SeriesError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_mapped_and_stream_agree() {
        let dir = TempDir::new().unwrap();
        let values: Vec<i64> = (0..2000).map(|i| i * 7 - 300).collect();

        let mut config = scratch_config(256, true);
        config.max_view_size = 512;
        let mut mapped = create_i64(&dir, config);
        mapped.write(0, &values).unwrap();
        assert_eq!(mapped.count(), 2000);
        assert_eq!(mapped.read(0, 2000).unwrap(), values);
        assert_eq!(mapped.read(1234, 10).unwrap(), values[1234..1244].to_vec());
        mapped.close().unwrap();

        let mut streamed: PagedFile<FixedSerializer<i64>> = PagedFile::open(
            dir.path().join("values.series"),
            scratch_config(4096, false),
            "i64",
        )
        .unwrap();
        assert_eq!(streamed.config().page_size, 256);
        assert_eq!(streamed.read(0, 2000).unwrap(), values);
        streamed.write(2000, &[5]).unwrap();
        assert_eq!(streamed.read(1999, 2).unwrap(), vec![values[1999], 5]);
    }

    #[test]
    fn test_failed_mapped_write_keeps_length() {
        let dir = TempDir::new().unwrap();
        let mut file = PagedFile::create(
            dir.path().join("blocks.series"),
            BlockSerializer::new(30),
            "blocks",
            scratch_config(256, true),
            |_| Ok(()),
        )
        .unwrap();
        file.write(0, &[vec![1u8; 30]]).unwrap();
        let length = std::fs::metadata(file.path()).unwrap().len();

        let mut blocks: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; 30]).collect();
        blocks[15] = vec![0xee; 31];
        assert!(matches!(file.write(1, &blocks), Err(SeriesError::Serializer(_))));
        assert_eq!(file.count(), 1);
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), length);

        file.write(1, &[vec![2u8; 30]]).unwrap();
        assert_eq!(file.count(), 2);
        assert_eq!(file.read(0, 2).unwrap(), vec![vec![1u8; 30], vec![2u8; 30]]);
    }

    #[test]
    fn test_concurrent_stream_reads() {
        let dir = TempDir::new().unwrap();
        let mut file = create_i64(&dir, scratch_config(4096, false));
        let values: Vec<i64> = (0..5000).collect();
        file.write(0, &values).unwrap();

        let file = &file;
        std::thread::scope(|scope| {
            for t in 0..4u64 {
                scope.spawn(move || {
                    for round in 0..500u64 {
                        let first = (t * 997 + round * 31) % 4900;
                        let items = file.read(first, 100).unwrap();
                        assert_eq!(items[0], first as i64);
                        assert_eq!(items[99], first as i64 + 99);
                    }
                });
            }
        });
    }

    #[test]
    fn test_padding_skipped() {
        let dir = TempDir::new().unwrap();
        let mut file = PagedFile::create(
            dir.path().join("blocks.series"),
            BlockSerializer::new(30),
            "blocks",
            scratch_config(100, false),
            |_| Ok(()),
        )
        .unwrap();
        let blocks: Vec<Vec<u8>> = (0..7u8).map(|i| vec![i; 30]).collect();
        file.write(0, &blocks).unwrap();
        assert_eq!(file.layout().item_offset(3), file.header().header_size as u64 + 100);
        assert_eq!(file.read(0, 7).unwrap(), blocks);
    }

    #[test]
    fn test_truncate_and_reopen() {
        let dir = TempDir::new().unwrap();
        let mut file = create_i64(&dir, scratch_config(4096, false));
        file.write(0, &[1, 2, 3, 4, 5]).unwrap();
        file.truncate(2).unwrap();
        file.truncate(2).unwrap();
        assert_eq!(file.count(), 2);
        file.close().unwrap();

        let file: PagedFile<FixedSerializer<i64>> =
            PagedFile::open(dir.path().join("values.series"), scratch_config(4096, false), "i64")
                .unwrap();
        assert_eq!(file.count(), 2);
        assert_eq!(file.read(0, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_closed_file_is_disposed() {
        let dir = TempDir::new().unwrap();
        let mut file = create_i64(&dir, scratch_config(4096, false));
        file.close().unwrap();
        assert!(file.is_closed());
        assert!(matches!(file.read(0, 0), Err(SeriesError::Disposed)));
        assert!(matches!(file.write(0, &[1]), Err(SeriesError::Disposed)));
        assert!(matches!(file.truncate(0), Err(SeriesError::Disposed)));
        assert!(matches!(file.close(), Err(SeriesError::Disposed)));
    }

    #[test]
    fn test_header_too_large() {
        let dir = TempDir::new().unwrap();
        let result = PagedFile::create(
            dir.path().join("big.series"),
            FixedSerializer::<i64>::new(),
            "i64",
            scratch_config(128, false),
            |w| {
                w.write_bytes(&[0u8; 200]);
                Ok(())
            },
        );
        assert!(matches!(result, Err(SeriesError::HeaderTooLarge { .. })));
    }

    #[test]
    fn test_open_mismatches() {
        let dir = TempDir::new().unwrap();
        let mut file = create_i64(&dir, scratch_config(4096, false));
        file.close().unwrap();
        let path = dir.path().join("values.series");

        assert!(matches!(
            PagedFile::<FixedSerializer<i64>>::open(&path, StorageConfig::default(), "u64"),
            Err(SeriesError::TypeMismatch { .. })
        ));
        assert!(matches!(
            PagedFile::<FixedSerializer<u64>>::open(&path, StorageConfig::default(), "i64"),
            Err(SeriesError::TypeMismatch { .. })
        ));
        assert!(matches!(
            PagedFile::<BlockSerializer>::open(&path, StorageConfig::default(), "i64"),
            Err(SeriesError::UnknownSerializer(_))
        ));
    }

    #[test]
    fn test_partial_item_is_corruption() {
        let dir = TempDir::new().unwrap();
        let mut file = create_i64(&dir, scratch_config(4096, false));
        file.write(0, &[1, 2]).unwrap();
        let path = file.path().to_path_buf();
        file.close().unwrap();

        let raw = OpenOptions::new().write(true).open(&path).unwrap();
        let len = raw.metadata().unwrap().len();
        raw.set_len(len - 3).unwrap();
        assert!(matches!(
            PagedFile::<FixedSerializer<i64>>::open(&path, StorageConfig::default(), "i64"),
            Err(SeriesError::Corruption(_))
        ));
    }
}
