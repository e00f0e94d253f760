//! Scoped memory-mapped views.
//!
//! A [`MappedView`] maps one byte range of a file and is released when it is
//! dropped, on every exit path. Access goes through bounds-checked slices
//! relative to the view start; no raw pointers leave this module.

use crate::error::{Result, SeriesError};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::File;

#[derive(Debug)]
enum Mapping {
    Read(Mmap),
    Write(MmapMut),
}

/// A mapped byte range `[offset, offset + len)` of a file.
#[derive(Debug)]
pub(crate) struct MappedView {
    mapping: Mapping,
    offset: u64,
}

impl MappedView {
    /// Maps `len` bytes at `offset` for reading.
    pub(crate) fn map_read(file: &File, offset: u64, len: usize) -> Result<Self> {
        // SAFETY: the file is owned by a single `PagedFile`, which only
        // changes its length through `&mut self` while no view is alive.
        // Other processes modifying the file concurrently is unsupported.
        let mmap = unsafe { MmapOptions::new().offset(offset).len(len).map(file)? };
        Ok(Self {
            mapping: Mapping::Read(mmap),
            offset,
        })
    }

    /// Maps `len` bytes at `offset` for writing. The file must already be
    /// at least `offset + len` bytes long.
    pub(crate) fn map_write(file: &File, offset: u64, len: usize) -> Result<Self> {
        // SAFETY: as for `map_read`; the caller grows the file before
        // mapping so the whole range is backed.
        let mmap = unsafe { MmapOptions::new().offset(offset).len(len).map_mut(file)? };
        Ok(Self {
            mapping: Mapping::Write(mmap),
            offset,
        })
    }

    fn range(&self, file_offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let mapped = match &self.mapping {
            Mapping::Read(m) => m.len(),
            Mapping::Write(m) => m.len(),
        };
        let start = file_offset
            .checked_sub(self.offset)
            .and_then(|s| usize::try_from(s).ok())
            .filter(|&s| s.checked_add(len).is_some_and(|end| end <= mapped))
            .ok_or_else(|| {
                SeriesError::Corruption(format!(
                    "range {file_offset}+{len} outside mapped view {}+{mapped}",
                    self.offset
                ))
            })?;
        Ok(start..start + len)
    }

    /// Returns `len` bytes at absolute file offset `file_offset`.
    pub(crate) fn slice(&self, file_offset: u64, len: usize) -> Result<&[u8]> {
        let range = self.range(file_offset, len)?;
        Ok(match &self.mapping {
            Mapping::Read(m) => &m[range],
            Mapping::Write(m) => &m[range],
        })
    }

    /// Returns `len` writable bytes at absolute file offset `file_offset`.
    pub(crate) fn slice_mut(&mut self, file_offset: u64, len: usize) -> Result<&mut [u8]> {
        let range = self.range(file_offset, len)?;
        match &mut self.mapping {
            Mapping::Write(m) => Ok(&mut m[range]),
            Mapping::Read(_) => Err(SeriesError::InvalidState(
                "view was mapped read-only".to_string(),
            )),
        }
    }

    /// Flushes written pages to the file.
    pub(crate) fn flush(&self) -> Result<()> {
        if let Mapping::Write(m) = &self.mapping {
            m.flush()?;
        }
        Ok(())
    }
}
