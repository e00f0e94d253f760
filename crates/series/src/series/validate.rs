//! Key-order validation for appended records.

use crate::error::SeriesError;
use std::cell::Cell;
use std::fmt::Debug;

/// Iterator adapter that stops at the first out-of-order record.
///
/// Keys must be non-decreasing, and strictly increasing when `unique` is
/// set. The first violation is stored in `error` and ends the iteration, so
/// consumers that pull segments can tell a clean end from a rejected record.
pub(crate) struct OrderValidator<'a, I, T, K> {
    inner: I,
    extract: fn(&T) -> K,
    last: Option<K>,
    unique: bool,
    stopped: bool,
    error: &'a Cell<Option<SeriesError>>,
}

impl<'a, I, T, K> OrderValidator<'a, I, T, K>
where
    I: Iterator<Item = T>,
    K: Ord + Debug,
{
    /// Validates `inner` against `last`, the key already stored last.
    pub(crate) fn new(
        inner: I,
        extract: fn(&T) -> K,
        last: Option<K>,
        unique: bool,
        error: &'a Cell<Option<SeriesError>>,
    ) -> Self {
        Self {
            inner,
            extract,
            last,
            unique,
            stopped: false,
            error,
        }
    }
}

/// Returns true when `key` may follow `previous`.
pub(crate) fn in_order<K: Ord>(previous: &K, key: &K, unique: bool) -> bool {
    if unique {
        key > previous
    } else {
        key >= previous
    }
}

impl<I, T, K> Iterator for OrderValidator<'_, I, T, K>
where
    I: Iterator<Item = T>,
    K: Ord + Debug,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.stopped {
            return None;
        }
        let record = self.inner.next()?;
        let key = (self.extract)(&record);
        if let Some(previous) = &self.last {
            if !in_order(previous, &key, self.unique) {
                self.error.set(Some(SeriesError::ordering(previous, &key)));
                self.stopped = true;
                return None;
            }
        }
        self.last = Some(key);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(pair: &(u32, char)) -> u32 {
        pair.0
    }

    #[test]
    fn test_stops_at_first_violation() {
        let error = Cell::new(None);
        let input = vec![(1, 'a'), (2, 'b'), (2, 'c'), (1, 'd'), (5, 'e')];
        let passed: Vec<_> =
            OrderValidator::new(input.into_iter(), first, None, false, &error).collect();
        assert_eq!(passed, vec![(1, 'a'), (2, 'b'), (2, 'c')]);
        assert!(matches!(error.take(), Some(SeriesError::Ordering { .. })));
    }

    #[test]
    fn test_unique_rejects_duplicates() {
        let error = Cell::new(None);
        let input = vec![(3, 'a'), (4, 'b')];
        let passed: Vec<_> =
            OrderValidator::new(input.into_iter(), first, Some(3), true, &error).collect();
        assert!(passed.is_empty());
        assert!(error.take().is_some());
    }

    #[test]
    fn test_checks_against_stored_key() {
        let error = Cell::new(None);
        let input = vec![(3, 'a'), (4, 'b')];
        let passed: Vec<_> =
            OrderValidator::new(input.into_iter(), first, Some(3), false, &error).collect();
        assert_eq!(passed.len(), 2);
        assert!(error.take().is_none());
    }
}
