//! Compressed series file: delta-encoded blocks of records.
//!
//! Every item of the paged file is one codec block. Record positions are
//! resolved through a block directory (the record index at which each block
//! starts), built lazily from the block headers and dropped on mutation.
//!
//! ```text
//!   block 0          block 1          block 2 (tail)
//! ┌───────────────┬───────────────┬───────────────┐
//! │ n0 │ records  │ n1 │ records  │ n2 │ records  │
//! └───────────────┴───────────────┴───────────────┘
//!   directory: [0, n0, n0+n1, n0+n1+n2]
//! ```
//!
//! Appending re-encodes the tail block together with the new records, so
//! blocks stay as full as the codec allows.

use crate::codec::{CodecReader, CodecWriter};
use crate::error::{Result, SeriesError};
use crate::field::{DynamicSerializer, Field, Record};
use crate::series::search::{self, lock, SeriesCache};
use crate::series::validate::{in_order, OrderValidator};
use crate::series::{IndexHeader, KeyField, OrderedSeries, SearchOutcome, SeriesConfig};
use crate::storage::{BlockSerializer, PagedFile};
use std::cell::Cell;
use std::fmt::Debug;
use std::iter::Peekable;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A file of delta-encoded record blocks ordered by key.
///
/// The search cache holds the first key of visited blocks; the first and
/// last record keys and the block directory are cached alongside.
///
/// # Example
///
/// ```rust,ignore
/// let key = KeyField::new("timestamp", |r: &Reading| r.timestamp);
/// let mut series = CompressedSeriesFile::create(&path, key, SeriesConfig::default())?;
/// series.append(readings, false)?;
/// for segment in series.stream(Some(&start), false, None)? {
///     process(segment?);
/// }
/// ```
#[derive(Debug)]
pub struct CompressedSeriesFile<T: Record, K> {
    file: PagedFile<BlockSerializer>,
    codec: DynamicSerializer<T>,
    key: KeyField<T, K>,
    config: SeriesConfig,
    cache: Mutex<SeriesCache<K>>,
}

impl<T, K> CompressedSeriesFile<T, K>
where
    T: Record,
    K: Ord + Clone + Debug,
{
    /// Creates an empty file encoding records with the default field tree
    /// of `T`.
    ///
    /// # Errors
    ///
    /// Returns configuration or storage errors from creating the file.
    pub fn create(
        path: impl AsRef<Path>,
        key: KeyField<T, K>,
        config: SeriesConfig,
    ) -> Result<Self> {
        Self::create_with_field(path, key, Field::from_shape(&T::shape()), config)
    }

    /// Creates an empty file encoding records with `field`.
    ///
    /// The tree is frozen and stored in the header.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when the tree does not match
    /// `T` or the block size is below the codec minimum, plus storage
    /// errors.
    pub fn create_with_field(
        path: impl AsRef<Path>,
        key: KeyField<T, K>,
        field: Field,
        config: SeriesConfig,
    ) -> Result<Self> {
        config.check()?;
        CodecWriter::new(config.block_size)?;
        let codec = DynamicSerializer::<T>::with_field(field)?;
        let index = IndexHeader {
            key_name: key.name().to_string(),
            unique_keys: config.unique_keys,
        };
        let file = PagedFile::create(
            path,
            BlockSerializer::new(config.block_size),
            T::type_name(),
            config.storage.clone(),
            |writer| {
                index.write_to(writer);
                codec.field().write_to(writer)
            },
        )?;
        Ok(Self::assemble(file, codec, key, config))
    }

    /// Opens an existing compressed file.
    ///
    /// The block size, uniqueness flag and field tree stored in the file
    /// override `config`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when the file is indexed by a
    /// different key or its field tree does not match `T`, plus the errors
    /// of [`PagedFile::open`].
    pub fn open(
        path: impl AsRef<Path>,
        key: KeyField<T, K>,
        mut config: SeriesConfig,
    ) -> Result<Self> {
        config.check()?;
        let file =
            PagedFile::<BlockSerializer>::open(path, config.storage.clone(), T::type_name())?;
        let mut reader = file.header().extra_reader();
        let index = IndexHeader::read_from(&mut reader)?;
        index.check_key(key.name())?;
        let codec = DynamicSerializer::<T>::with_field(Field::read_from(&mut reader)?)?;
        config.unique_keys = index.unique_keys;
        config.block_size = file.serializer().block_size();
        config.storage = file.config().clone();
        Ok(Self::assemble(file, codec, key, config))
    }

    fn assemble(
        file: PagedFile<BlockSerializer>,
        codec: DynamicSerializer<T>,
        key: KeyField<T, K>,
        config: SeriesConfig,
    ) -> Self {
        let mut cache = SeriesCache::new(config.search_cache_size);
        cache.invalidate(file.count());
        Self {
            file,
            codec,
            key,
            config,
            cache: Mutex::new(cache),
        }
    }

    /// Returns the number of blocks.
    pub fn block_count(&self) -> u64 {
        self.file.count()
    }

    /// Returns the block size in bytes.
    pub fn block_size(&self) -> usize {
        self.file.serializer().block_size()
    }

    /// Returns the frozen field tree.
    pub fn field(&self) -> &Field {
        self.codec.field()
    }

    /// Returns true when strictly increasing keys are enforced.
    pub fn unique_keys(&self) -> bool {
        self.config.unique_keys
    }

    /// Returns the key field.
    pub fn key_field(&self) -> &KeyField<T, K> {
        &self.key
    }

    /// Returns the configuration in effect.
    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Decodes every record of block `index`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::OutOfRange` for a missing block and codec
    /// errors for a corrupted one.
    pub fn read_block(&self, index: u64) -> Result<Vec<T>> {
        let block = self.raw_block(index)?;
        self.decode(&block, usize::MAX)
    }

    fn raw_block(&self, index: u64) -> Result<Vec<u8>> {
        self.file
            .read(index, 1)?
            .pop()
            .ok_or_else(|| SeriesError::Corruption(format!("no block at index {index}")))
    }

    fn decode(&self, block: &[u8], max_count: usize) -> Result<Vec<T>> {
        let mut codec = self.codec.clone();
        let mut records = Vec::new();
        codec.deserialize(&mut CodecReader::new(block), &mut records, max_count)?;
        Ok(records)
    }

    fn block_first_key(&self, index: u64) -> Result<K> {
        let block = self.raw_block(index)?;
        self.decode(&block, 1)?
            .first()
            .map(|r| self.key.key(r))
            .ok_or_else(|| SeriesError::Corruption(format!("block {index} is empty")))
    }

    /// Returns the block directory, building it from the block headers
    /// when it is not cached.
    fn directory(&self) -> Result<Arc<Vec<u64>>> {
        self.file.ensure_open()?;
        let blocks = self.file.count();
        {
            let mut cache = lock(&self.cache);
            cache.sync(blocks);
            if let Some(directory) = cache.directory() {
                return Ok(directory);
            }
        }

        let chunk = self.config.append_buffer_size as u64;
        let mut starts = Vec::with_capacity(blocks as usize + 1);
        let mut total = 0u64;
        starts.push(total);
        let mut index = 0u64;
        while index < blocks {
            let n = chunk.min(blocks - index);
            for block in self.file.read(index, n as usize)? {
                total += DynamicSerializer::<T>::block_count(&block)?;
                starts.push(total);
            }
            index += n;
        }

        let directory = Arc::new(starts);
        let mut cache = lock(&self.cache);
        cache.sync(blocks);
        cache.set_directory(Arc::clone(&directory));
        Ok(directory)
    }

    fn invalidate(&self) {
        lock(&self.cache).invalidate(self.file.count());
    }

    /// Installs `directory` for the current block count. The first key
    /// survives while blocks remain.
    fn replace_directory(&self, directory: Vec<u64>) {
        let blocks = self.file.count();
        let mut cache = lock(&self.cache);
        let first_key = cache.first_key().filter(|_| blocks > 0);
        cache.invalidate(blocks);
        cache.set_directory(Arc::new(directory));
        if let Some(key) = first_key {
            cache.set_first_key(key);
        }
    }

    /// Encodes `input` into blocks starting at block `index`.
    ///
    /// Ordering failures reported through `error` abort the write.
    /// Returns the record count of each written block.
    fn write_blocks<I>(
        &mut self,
        mut index: u64,
        input: &mut Peekable<I>,
        error: &Cell<Option<SeriesError>>,
    ) -> Result<Vec<u64>>
    where
        I: Iterator<Item = T>,
    {
        let mut writer = CodecWriter::new(self.block_size())?;
        let mut pending = Vec::with_capacity(self.config.append_buffer_size);
        let mut counts = Vec::new();
        loop {
            let more = self.codec.serialize(&mut writer, input)?;
            if let Some(e) = error.take() {
                return Err(e);
            }
            pending.push(writer.block().to_vec());
            counts.push(writer.record_count());
            if !more || pending.len() >= self.config.append_buffer_size {
                self.file.write(index, &pending)?;
                index += pending.len() as u64;
                pending.clear();
            }
            if !more {
                return Ok(counts);
            }
        }
    }

    /// Appends `records`.
    ///
    /// Ordering rules match [`SeriesFile::append`](crate::series::SeriesFile::append).
    /// The tail block is re-encoded together with the new records. On
    /// failure the previous blocks, including the original tail, are
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Ordering` for out-of-order keys, codec errors
    /// for records that cannot be encoded, plus storage errors.
    pub fn append<I>(&mut self, records: I, allow_truncation: bool) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        self.file.ensure_open()?;
        let mut records = records.into_iter().peekable();
        let Some(first) = records.peek() else {
            return Ok(());
        };
        let first_key = self.key.key(first);
        let unique = self.config.unique_keys;

        let mut last = self.last_key()?;
        if let Some(previous) = &last {
            if !in_order(previous, &first_key, unique) {
                if !allow_truncation {
                    return Err(SeriesError::ordering(previous, &first_key));
                }
                self.truncate_to_key(&first_key)?;
                last = self.last_key()?;
            }
        }

        let blocks_before = self.file.count();
        let tail_index = blocks_before.saturating_sub(1);
        let mut starts = self.directory()?[..=tail_index as usize].to_vec();
        let (tail, tail_block) = if blocks_before > 0 {
            let block = self.raw_block(blocks_before - 1)?;
            (self.decode(&block, usize::MAX)?, Some(block))
        } else {
            (Vec::new(), None)
        };

        let error = Cell::new(None);
        let validated = OrderValidator::new(records, self.key.extractor(), last, unique, &error);
        let mut input = tail.into_iter().chain(validated).peekable();
        let counts = match self.write_blocks(tail_index, &mut input, &error) {
            Ok(counts) => counts,
            Err(e) => {
                self.rollback(blocks_before, tail_block);
                debug!(
                    "Append to {} rolled back to {} blocks: {}",
                    self.path().display(),
                    blocks_before,
                    e
                );
                return Err(e);
            }
        };

        // `starts` ends at the tail block, which was rewritten first
        let mut total = starts.last().copied().unwrap_or(0);
        for count in counts {
            total += count;
            starts.push(total);
        }
        self.replace_directory(starts);
        Ok(())
    }

    /// Restores the blocks present before a failed append. A failed
    /// restore is logged so the append error reaches the caller.
    fn rollback(&mut self, blocks_before: u64, tail_block: Option<Vec<u8>>) {
        if let Err(e) = self.restore_blocks(blocks_before, tail_block) {
            warn!(
                "Failed to roll back {} to {} blocks: {}",
                self.path().display(),
                blocks_before,
                e
            );
        }
        self.invalidate();
    }

    /// Drops blocks written after `blocks` and puts the original tail
    /// block back.
    fn restore_blocks(&mut self, blocks: u64, tail_block: Option<Vec<u8>>) -> Result<()> {
        if self.file.count() > blocks {
            self.file.truncate(blocks)?;
        }
        if let Some(block) = tail_block {
            self.file.write(blocks - 1, &[block])?;
        }
        Ok(())
    }

    /// Truncates to the first `count` records.
    ///
    /// A block split by the cut is re-encoded with its remaining records.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::OutOfRange` when `count` exceeds the record
    /// count.
    pub fn truncate(&mut self, count: u64) -> Result<()> {
        let directory = self.directory()?;
        let total = directory.last().copied().unwrap_or(0);
        if count > total {
            return Err(SeriesError::OutOfRange {
                what: "record count",
                value: count,
                limit: total,
            });
        }
        if count == total {
            return Ok(());
        }

        let block = block_of(&directory, count);
        let keep = count - directory[block as usize];
        let mut starts = directory[..=block as usize].to_vec();
        if let Err(e) = self.cut_block(block, keep) {
            self.invalidate();
            return Err(e);
        }
        if keep > 0 {
            starts.push(count);
        }
        self.replace_directory(starts);
        Ok(())
    }

    /// Keeps the first `keep` records of `block` and drops every later
    /// block.
    fn cut_block(&mut self, block: u64, keep: u64) -> Result<()> {
        if keep == 0 {
            return self.file.truncate(block);
        }
        let records = self.decode(&self.raw_block(block)?, keep as usize)?;
        let mut writer = CodecWriter::new(self.block_size())?;
        let mut input = records.into_iter().peekable();
        if self.codec.serialize(&mut writer, &mut input)? {
            return Err(SeriesError::Corruption(format!(
                "prefix of block {block} no longer fits one block"
            )));
        }
        self.file.write(block, &[writer.block().to_vec()])?;
        self.file.truncate(block + 1)
    }

    /// Truncates at the last record whose key equals `key`, or at the
    /// insertion point of `key` when no record has it.
    ///
    /// Earlier records of a duplicate run are kept.
    pub fn truncate_to_key(&mut self, key: &K) -> Result<()> {
        let position = self.binary_search(key, false)?.position();
        self.truncate(position)
    }

    /// Closes the file. Every later operation fails with
    /// `SeriesError::Disposed`.
    pub fn close(&mut self) -> Result<()> {
        self.file.close()
    }
}

/// Returns the block holding record `index`; `index` must be below the
/// total.
fn block_of(directory: &[u64], index: u64) -> u64 {
    (directory.partition_point(|&start| start <= index) - 1) as u64
}

impl<T, K> OrderedSeries for CompressedSeriesFile<T, K>
where
    T: Record,
    K: Ord + Clone + Debug,
{
    type Record = T;
    type Key = K;

    fn count(&self) -> Result<u64> {
        Ok(self.directory()?.last().copied().unwrap_or(0))
    }

    fn read(&self, first: u64, count: usize) -> Result<Vec<T>> {
        let directory = self.directory()?;
        let total = directory.last().copied().unwrap_or(0);
        if first > total {
            return Err(SeriesError::OutOfRange {
                what: "first record",
                value: first,
                limit: total,
            });
        }
        let end = first.saturating_add(count as u64);
        if end > total {
            return Err(SeriesError::OutOfRange {
                what: "record range end",
                value: end,
                limit: total,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let first_block = block_of(&directory, first);
        let last_block = block_of(&directory, end - 1);
        let blocks = self
            .file
            .read(first_block, (last_block - first_block + 1) as usize)?;
        let mut skip = (first - directory[first_block as usize]) as usize;
        let mut records = Vec::with_capacity(count);
        for block in blocks {
            let wanted = skip + (count - records.len());
            let decoded = self.decode(&block, wanted)?;
            records.extend(decoded.into_iter().skip(skip));
            skip = 0;
        }
        records.truncate(count);
        Ok(records)
    }

    fn binary_search(&self, key: &K, find_first: bool) -> Result<SearchOutcome> {
        let directory = self.directory()?;
        let blocks = self.file.count();
        let by_block = search::binary_search(blocks, key, find_first, &self.cache, |i| {
            self.block_first_key(i)
        })?;

        if find_first {
            // First block whose first key is >= key; the run may start at the
            // end of the block before it.
            let next = by_block.position();
            if next > 0 {
                let candidate = next - 1;
                let records = self.read_block(candidate)?;
                let j = records.partition_point(|r| self.key.key(r) < *key);
                if j < records.len() {
                    let at = directory[candidate as usize] + j as u64;
                    return Ok(if self.key.key(&records[j]) == *key {
                        SearchOutcome::Found(at)
                    } else {
                        SearchOutcome::NotFound(at)
                    });
                }
            }
            let at = directory[next as usize];
            return Ok(match by_block {
                SearchOutcome::Found(_) => SearchOutcome::Found(at),
                SearchOutcome::NotFound(_) => SearchOutcome::NotFound(at),
            });
        }

        // Last block whose first key is <= key.
        let candidate = match by_block {
            SearchOutcome::Found(i) => i,
            SearchOutcome::NotFound(0) => return Ok(SearchOutcome::NotFound(0)),
            SearchOutcome::NotFound(i) => i - 1,
        };
        let records = self.read_block(candidate)?;
        let j = records.partition_point(|r| self.key.key(r) <= *key);
        let start = directory[candidate as usize];
        if j > 0 && self.key.key(&records[j - 1]) == *key {
            Ok(SearchOutcome::Found(start + j as u64 - 1))
        } else {
            Ok(SearchOutcome::NotFound(start + j as u64))
        }
    }

    fn first_key(&self) -> Result<Option<K>> {
        let directory = self.directory()?;
        let blocks = self.file.count();
        {
            let mut cache = lock(&self.cache);
            cache.sync(blocks);
            if let Some(key) = cache.first_key() {
                return Ok(Some(key));
            }
        }
        if directory.last().copied().unwrap_or(0) == 0 {
            return Ok(None);
        }
        let key = self.block_first_key(block_of(&directory, 0))?;
        let mut cache = lock(&self.cache);
        cache.sync(blocks);
        cache.set_first_key(key.clone());
        Ok(Some(key))
    }

    fn last_key(&self) -> Result<Option<K>> {
        let directory = self.directory()?;
        let blocks = self.file.count();
        {
            let mut cache = lock(&self.cache);
            cache.sync(blocks);
            if let Some(key) = cache.last_key() {
                return Ok(Some(key));
            }
        }
        let total = directory.last().copied().unwrap_or(0);
        if total == 0 {
            return Ok(None);
        }
        let block = block_of(&directory, total - 1);
        let records = self.read_block(block)?;
        let key = records
            .last()
            .map(|r| self.key.key(r))
            .ok_or_else(|| SeriesError::Corruption(format!("block {block} is empty")))?;
        let mut cache = lock(&self.cache);
        cache.sync(blocks);
        cache.set_last_key(key.clone());
        Ok(Some(key))
    }

    fn stream_buffer_size(&self) -> usize {
        self.config.stream_buffer_size
    }
}
