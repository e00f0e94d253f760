//! Lazy segment streams over series files.

use crate::error::Result;
use crate::series::OrderedSeries;

/// Iterator over record segments of a resolved index range.
///
/// Each item is one segment of at most the stream buffer size. Reverse
/// streams yield segments from the end of the range, each in descending
/// order. After an error the stream ends.
pub struct SeriesStream<'a, S: OrderedSeries> {
    series: &'a S,
    /// Next index to read (forward) or lower bound (reverse).
    start: u64,
    /// Upper bound, exclusive.
    end: u64,
    in_reverse: bool,
    segment: usize,
    failed: bool,
}

impl<'a, S: OrderedSeries> SeriesStream<'a, S> {
    pub(crate) fn new(
        series: &'a S,
        start: u64,
        end: u64,
        in_reverse: bool,
        segment: usize,
    ) -> Self {
        Self {
            series,
            start,
            end,
            in_reverse,
            segment: segment.max(1),
            failed: false,
        }
    }

    /// Returns the number of records not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.end - self.start
    }
}

impl<S: OrderedSeries> Iterator for SeriesStream<'_, S> {
    type Item = Result<Vec<S::Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.start >= self.end {
            return None;
        }
        let n = self.remaining().min(self.segment as u64);
        let first = if self.in_reverse {
            self.end - n
        } else {
            self.start
        };
        match self.series.read(first, n as usize) {
            Ok(mut records) => {
                if self.in_reverse {
                    records.reverse();
                    self.end -= n;
                } else {
                    self.start += n;
                }
                Some(Ok(records))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
