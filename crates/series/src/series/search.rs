//! Cached binary search over ordered keys.

use crate::error::Result;
use crate::series::SearchOutcome;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-file search state guarded by one lock.
///
/// Visited keys, first key, last key and (for compressed files) the block
/// directory are valid for one item count. Any
/// change of the count drops them; mutations also drop them explicitly,
/// since a truncate followed by an append can restore the old count with
/// different content.
#[derive(Debug)]
pub(crate) struct SeriesCache<K> {
    item_count: u64,
    capacity: usize,
    visited: HashMap<u64, K>,
    first_key: Option<K>,
    last_key: Option<K>,
    /// Record index of the first record of every block, plus the total.
    directory: Option<Arc<Vec<u64>>>,
}

impl<K: Clone> SeriesCache<K> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            item_count: 0,
            capacity,
            visited: HashMap::new(),
            first_key: None,
            last_key: None,
            directory: None,
        }
    }

    /// Drops everything cached for a different item count.
    pub(crate) fn sync(&mut self, item_count: u64) {
        if self.item_count != item_count {
            self.invalidate(item_count);
        }
    }

    pub(crate) fn invalidate(&mut self, item_count: u64) {
        self.item_count = item_count;
        self.visited.clear();
        self.first_key = None;
        self.last_key = None;
        self.directory = None;
    }

    pub(crate) fn cached_key(&self, index: u64) -> Option<K> {
        self.visited.get(&index).cloned()
    }

    /// Caches the key at `index`. A full cache is cleared first.
    pub(crate) fn remember(&mut self, index: u64, key: K) {
        if self.capacity == 0 {
            return;
        }
        if self.visited.len() >= self.capacity {
            self.visited.clear();
        }
        self.visited.insert(index, key);
    }

    pub(crate) fn first_key(&self) -> Option<K> {
        self.first_key.clone()
    }

    pub(crate) fn set_first_key(&mut self, key: K) {
        self.first_key = Some(key);
    }

    pub(crate) fn last_key(&self) -> Option<K> {
        self.last_key.clone()
    }

    pub(crate) fn set_last_key(&mut self, key: K) {
        self.last_key = Some(key);
    }

    pub(crate) fn directory(&self) -> Option<Arc<Vec<u64>>> {
        self.directory.clone()
    }

    pub(crate) fn set_directory(&mut self, directory: Arc<Vec<u64>>) {
        self.directory = Some(directory);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

/// Searches `count` ordered positions for `key`.
///
/// `key_at` loads the key at a position; loaded keys are cached in `cache`.
/// The lock is only held for cache lookups and inserts, never during
/// `key_at`.
///
/// With duplicates, `find_first` selects the first position of the run,
/// otherwise the last. On a miss the insertion point is returned.
pub(crate) fn binary_search<K, F>(
    count: u64,
    key: &K,
    find_first: bool,
    cache: &Mutex<SeriesCache<K>>,
    mut key_at: F,
) -> Result<SearchOutcome>
where
    K: Ord + Clone,
    F: FnMut(u64) -> Result<K>,
{
    lock(cache).sync(count);

    let mut lo = 0u64;
    let mut hi = count;
    let mut found = None;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let cached = lock(cache).cached_key(mid);
        let mid_key = match cached {
            Some(k) => k,
            None => {
                let k = key_at(mid)?;
                let mut guard = lock(cache);
                guard.sync(count);
                guard.remember(mid, k.clone());
                k
            }
        };
        match mid_key.cmp(key) {
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
            std::cmp::Ordering::Equal => {
                found = Some(mid);
                if find_first {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
        }
    }

    Ok(match found {
        Some(index) => SearchOutcome::Found(index),
        None => SearchOutcome::NotFound(lo),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(keys: &[u32], key: u32, find_first: bool) -> SearchOutcome {
        let cache = Mutex::new(SeriesCache::new(16));
        binary_search(keys.len() as u64, &key, find_first, &cache, |i| {
            Ok(keys[i as usize])
        })
        .unwrap()
    }

    #[test]
    fn test_unique_keys() {
        let keys = [1, 3, 5, 7];
        assert_eq!(search(&keys, 5, true), SearchOutcome::Found(2));
        assert_eq!(search(&keys, 5, false), SearchOutcome::Found(2));
        assert_eq!(search(&keys, 0, true), SearchOutcome::NotFound(0));
        assert_eq!(search(&keys, 4, true), SearchOutcome::NotFound(2));
        assert_eq!(search(&keys, 9, false), SearchOutcome::NotFound(4));
        assert_eq!(search(&[], 9, false), SearchOutcome::NotFound(0));
    }

    #[test]
    fn test_duplicate_runs() {
        let keys = [1, 2, 2, 2, 2, 3];
        assert_eq!(search(&keys, 2, true), SearchOutcome::Found(1));
        assert_eq!(search(&keys, 2, false), SearchOutcome::Found(4));
        let pair = [4, 4];
        assert_eq!(search(&pair, 4, true), SearchOutcome::Found(0));
        assert_eq!(search(&pair, 4, false), SearchOutcome::Found(1));
    }

    #[test]
    fn test_visited_keys_are_cached() {
        let keys: Vec<u32> = (0..100).collect();
        let cache = Mutex::new(SeriesCache::new(1 << 20));
        let mut loads = 0;
        for _ in 0..3 {
            binary_search(100, &42, true, &cache, |i| {
                loads += 1;
                Ok(keys[i as usize])
            })
            .unwrap();
        }
        let cached = (0..100).filter(|&i| lock(&cache).cached_key(i).is_some()).count();
        assert_eq!(loads, cached);
    }

    #[test]
    fn test_cache_overflow_clears() {
        let mut cache = SeriesCache::new(2);
        cache.remember(0, 'a');
        cache.remember(1, 'b');
        cache.remember(2, 'c');
        assert_eq!(cache.cached_key(2), Some('c'));
        assert_eq!(cache.cached_key(0), None);
        assert_eq!(cache.cached_key(1), None);
    }

    #[test]
    fn test_count_change_invalidates() {
        let mut cache = SeriesCache::new(8);
        cache.sync(3);
        cache.remember(1, 10u32);
        cache.set_last_key(30);
        cache.sync(3);
        assert_eq!(cache.cached_key(1), Some(10));
        cache.sync(4);
        assert_eq!(cache.cached_key(1), None);
        assert_eq!(cache.last_key(), None);
    }
}
