//! Uncompressed series file: one fixed-size record per item.

use crate::error::{Result, SeriesError};
use crate::field::Record;
use crate::series::search::{self, lock, SeriesCache};
use crate::series::validate::{in_order, OrderValidator};
use crate::series::{IndexHeader, KeyField, OrderedSeries, SearchOutcome, SeriesConfig};
use crate::storage::{FixedSerializer, PagedFile};
use std::cell::Cell;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// A file of records ordered by key.
///
/// # Example
///
/// ```rust,ignore
/// let key = KeyField::new("timestamp", |r: &Reading| r.timestamp);
/// let mut series = SeriesFile::create(&path, key, SeriesConfig::default())?;
/// series.append(readings, false)?;
/// let at = series.binary_search(&1_700_000_000, true)?;
/// ```
#[derive(Debug)]
pub struct SeriesFile<T: Record, K> {
    file: PagedFile<FixedSerializer<T>>,
    key: KeyField<T, K>,
    config: SeriesConfig,
    cache: Mutex<SeriesCache<K>>,
}

impl<T, K> SeriesFile<T, K>
where
    T: Record,
    K: Ord + Clone + Debug,
{
    /// Creates an empty series file at `path`.
    ///
    /// # Errors
    ///
    /// Returns configuration or storage errors from creating the file.
    pub fn create(
        path: impl AsRef<Path>,
        key: KeyField<T, K>,
        config: SeriesConfig,
    ) -> Result<Self> {
        config.check()?;
        let index = IndexHeader {
            key_name: key.name().to_string(),
            unique_keys: config.unique_keys,
        };
        let file = PagedFile::create(
            path,
            FixedSerializer::new(),
            T::type_name(),
            config.storage.clone(),
            |writer| {
                index.write_to(writer);
                Ok(())
            },
        )?;
        Ok(Self::assemble(file, key, config))
    }

    /// Opens an existing series file.
    ///
    /// The uniqueness flag stored in the file overrides `config`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when the file is indexed by a
    /// different key, plus the errors of [`PagedFile::open`].
    pub fn open(
        path: impl AsRef<Path>,
        key: KeyField<T, K>,
        mut config: SeriesConfig,
    ) -> Result<Self> {
        config.check()?;
        let file = PagedFile::open(path, config.storage.clone(), T::type_name())?;
        let index = IndexHeader::read_from(&mut file.header().extra_reader())?;
        index.check_key(key.name())?;
        config.unique_keys = index.unique_keys;
        config.storage = file.config().clone();
        Ok(Self::assemble(file, key, config))
    }

    fn assemble(
        file: PagedFile<FixedSerializer<T>>,
        key: KeyField<T, K>,
        config: SeriesConfig,
    ) -> Self {
        let mut cache = SeriesCache::new(config.search_cache_size);
        cache.invalidate(file.count());
        Self {
            file,
            key,
            config,
            cache: Mutex::new(cache),
        }
    }

    /// Returns the number of records.
    pub fn count(&self) -> u64 {
        self.file.count()
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

    fn key_at(&self, index: u64) -> Result<K> {
        let record = self.file.read(index, 1)?;
        record
            .first()
            .map(|r| self.key.key(r))
            .ok_or_else(|| SeriesError::Corruption(format!("no record at index {index}")))
    }

    fn invalidate(&self) {
        lock(&self.cache).invalidate(self.file.count());
    }

    /// Appends `records`.
    ///
    /// Keys must not decrease (nor repeat when keys are unique), within the
    /// input and against the last stored key. When the first record's key
    /// is out of order and `allow_truncation` is set, the file is first cut
    /// with [`truncate_to_key`](Self::truncate_to_key). A violation anywhere
    /// else rejects the whole append and restores the previous records.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Ordering` for out-of-order keys, plus storage
    /// errors.
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

        let rollback = self.file.count();
        let error = Cell::new(None);
        let mut validated =
            OrderValidator::new(records, self.key.extractor(), last, unique, &error);
        let segment = self.config.append_buffer_size;
        let mut buffer = Vec::with_capacity(segment);
        let result = loop {
            buffer.clear();
            buffer.extend(validated.by_ref().take(segment));
            if let Some(e) = error.take() {
                break Err(e);
            }
            if buffer.is_empty() {
                break Ok(());
            }
            if let Err(e) = self.file.write(self.file.count(), &buffer) {
                break Err(e);
            }
        };

        if let Err(e) = result {
            if self.file.count() > rollback {
                if let Err(rollback_err) = self.file.truncate(rollback) {
                    warn!(
                        "Failed to roll back {} to {} records: {}",
                        self.path().display(),
                        rollback,
                        rollback_err
                    );
                }
            }
            self.invalidate();
            debug!(
                "Append to {} rolled back to {} records: {}",
                self.path().display(),
                rollback,
                e
            );
            return Err(e);
        }
        self.invalidate();
        Ok(())
    }

    /// Truncates to the first `count` records.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::OutOfRange` when `count` exceeds the record
    /// count.
    pub fn truncate(&mut self, count: u64) -> Result<()> {
        self.file.truncate(count)?;
        self.invalidate();
        Ok(())
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

impl<T, K> OrderedSeries for SeriesFile<T, K>
where
    T: Record,
    K: Ord + Clone + Debug,
{
    type Record = T;
    type Key = K;

    fn count(&self) -> Result<u64> {
        self.file.ensure_open()?;
        Ok(self.file.count())
    }

    fn read(&self, first: u64, count: usize) -> Result<Vec<T>> {
        self.file.read(first, count)
    }

    fn binary_search(&self, key: &K, find_first: bool) -> Result<SearchOutcome> {
        self.file.ensure_open()?;
        search::binary_search(self.file.count(), key, find_first, &self.cache, |i| {
            self.key_at(i)
        })
    }

    fn first_key(&self) -> Result<Option<K>> {
        self.file.ensure_open()?;
        let count = self.file.count();
        {
            let mut cache = lock(&self.cache);
            cache.sync(count);
            if let Some(key) = cache.first_key() {
                return Ok(Some(key));
            }
        }
        if count == 0 {
            return Ok(None);
        }
        let key = self.key_at(0)?;
        let mut cache = lock(&self.cache);
        cache.sync(count);
        cache.set_first_key(key.clone());
        Ok(Some(key))
    }

    fn last_key(&self) -> Result<Option<K>> {
        self.file.ensure_open()?;
        let count = self.file.count();
        {
            let mut cache = lock(&self.cache);
            cache.sync(count);
            if let Some(key) = cache.last_key() {
                return Ok(Some(key));
            }
        }
        if count == 0 {
            return Ok(None);
        }
        let key = self.key_at(count - 1)?;
        let mut cache = lock(&self.cache);
        cache.sync(count);
        cache.set_last_key(key.clone());
        Ok(Some(key))
    }

    fn stream_buffer_size(&self) -> usize {
        self.config.stream_buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageConfig, SyncMode};
    use tempfile::TempDir;

    fn config(unique_keys: bool) -> SeriesConfig {
        SeriesConfig {
            storage: StorageConfig {
                sync_mode: SyncMode::None,
                ..StorageConfig::default()
            },
            unique_keys,
            stream_buffer_size: 3,
            append_buffer_size: 4,
            ..SeriesConfig::default()
        }
    }

    fn identity(value: &i64) -> i64 {
        *value
    }

    fn create(dir: &TempDir, unique_keys: bool) -> SeriesFile<i64, i64> {
        SeriesFile::create(
            dir.path().join("keys.series"),
            KeyField::new("value", identity),
            config(unique_keys),
        )
        .unwrap()
    }

    fn all(series: &SeriesFile<i64, i64>) -> Vec<i64> {
        series.read(0, series.count() as usize).unwrap()
    }

    #[test]
    fn test_append_and_search() {
        let dir = TempDir::new().unwrap();
        let mut series = create(&dir, false);
        series.append(vec![1, 2, 2, 2, 5, 9, 9, 12, 13, 20], false).unwrap();
        assert_eq!(series.count(), 10);
        assert_eq!(series.binary_search(&2, true).unwrap(), SearchOutcome::Found(1));
        assert_eq!(series.binary_search(&2, false).unwrap(), SearchOutcome::Found(3));
        assert_eq!(series.binary_search(&10, true).unwrap(), SearchOutcome::NotFound(7));
        assert_eq!(series.first_key().unwrap(), Some(1));
        assert_eq!(series.last_key().unwrap(), Some(20));
    }

    #[test]
    fn test_ordering_rejected_without_truncation() {
        let dir = TempDir::new().unwrap();
        let mut series = create(&dir, true);
        series.append(vec![1, 2, 3], false).unwrap();
        assert!(matches!(
            series.append(vec![3], false),
            Err(SeriesError::Ordering { .. })
        ));
        assert!(matches!(
            series.append(vec![4, 5, 6, 7, 8, 9, 10, 5], false),
            Err(SeriesError::Ordering { .. })
        ));
        assert_eq!(all(&series), vec![1, 2, 3]);
        assert_eq!(series.last_key().unwrap(), Some(3));
    }

    #[test]
    fn test_append_with_truncation() {
        let dir = TempDir::new().unwrap();
        let mut series = create(&dir, false);
        series.append(vec![1, 3, 5, 5, 7], false).unwrap();
        series.append(vec![5, 6], true).unwrap();
        assert_eq!(all(&series), vec![1, 3, 5, 5, 6]);
        series.append(vec![0], true).unwrap();
        assert_eq!(all(&series), vec![0]);
    }

    #[test]
    fn test_truncate_to_key() {
        let dir = TempDir::new().unwrap();
        let mut series = create(&dir, false);
        series.append(vec![1, 2, 2, 4], false).unwrap();
        series.truncate_to_key(&3).unwrap();
        assert_eq!(all(&series), vec![1, 2, 2]);
        series.truncate_to_key(&2).unwrap();
        assert_eq!(all(&series), vec![1, 2]);
        series.truncate_to_key(&2).unwrap();
        assert_eq!(all(&series), vec![1]);
        series.truncate(1).unwrap();
        assert_eq!(series.count(), 1);
    }

    #[test]
    fn test_streams() {
        let dir = TempDir::new().unwrap();
        let mut series = create(&dir, true);
        series.append((0..10).map(|i| i * 10), false).unwrap();

        let forward: Vec<Vec<i64>> = series
            .stream(Some(&15), false, Some(&70))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(forward, vec![vec![20, 30, 40], vec![50, 60]]);

        let reverse: Vec<i64> = series
            .stream(Some(&50), true, Some(&10))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
            .concat();
        assert_eq!(reverse, vec![50, 40, 30, 20]);

        let everything: Vec<i64> = series
            .stream(None, true, None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
            .concat();
        assert_eq!(everything, (0..10).rev().map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(series.stream(Some(&70), false, Some(&20)).unwrap().count(), 0);
    }

    #[test]
    fn test_reopen_keeps_unique_flag() {
        let dir = TempDir::new().unwrap();
        let mut series = create(&dir, true);
        series.append(vec![1, 2], false).unwrap();
        series.close().unwrap();
        assert!(matches!(series.first_key(), Err(SeriesError::Disposed)));

        let path = dir.path().join("keys.series");
        let mut reopened: SeriesFile<i64, i64> =
            SeriesFile::open(&path, KeyField::new("value", identity), config(false)).unwrap();
        assert!(reopened.unique_keys());
        assert!(reopened.append(vec![2], false).is_err());

        assert!(matches!(
            SeriesFile::<i64, i64>::open(&path, KeyField::new("time", identity), config(false)),
            Err(SeriesError::Configuration(_))
        ));
    }
}
