//! Backing stores for the block store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  BlockStore (coordination layer)    │
//! │  - slot allocators                  │
//! │  - readers waiting on the monitor   │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ positional read/write under RwLock
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  BackingStore (byte container)      │
//! │  - write_at() / read_at()           │
//! │  - "not yet written" signal         │
//! └─────────────────────────────────────┘
//!      ▲            ▲            ▲
//!      │            │            │
//!  FileBacking  MemBacking  SqliteBacking
//! ```
//!
//! Backing stores do no locking of their own for writes: the block store
//! hands out `&mut self` only under its exclusive lock.

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileBacking;
pub use memory::MemBacking;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBacking;

use std::collections::BTreeMap;
use std::io;

use crate::error::BackingError;

/// Randomly addressable byte container
pub trait BackingStore: Send + Sync {
    /// Store all of `data` starting at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Fill `buf` from `offset`.
    ///
    /// Returns `BackingError::NotYetWritten` when any part of the range has
    /// never been written, even if the underlying medium would read zeros
    /// there.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BackingError>;

    /// Release the underlying resource. No other call follows `close`.
    fn close(&mut self) -> io::Result<()>;
}

impl<B: BackingStore + ?Sized> BackingStore for Box<B> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        (**self).write_at(offset, data)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BackingError> {
        (**self).read_at(offset, buf)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Byte ranges that completed a write
///
/// Adjacent and overlapping ranges are merged, so a lookup is one map probe.
#[derive(Debug, Default)]
pub(crate) struct Extents {
    // start -> end (exclusive)
    ranges: BTreeMap<u64, u64>,
}

impl Extents {
    pub(crate) fn insert(&mut self, offset: u64, len: usize) {
        if len == 0 {
            return;
        }
        let mut start = offset;
        let mut end = offset + len as u64;

        if let Some((&prev_start, &prev_end)) = self.ranges.range(..=start).next_back() {
            if prev_end >= start {
                start = prev_start;
                end = end.max(prev_end);
            }
        }
        while let Some((&next_start, &next_end)) = self.ranges.range(start..).next() {
            if next_start > end {
                break;
            }
            end = end.max(next_end);
            self.ranges.remove(&next_start);
        }
        self.ranges.insert(start, end);
    }

    pub(crate) fn covers(&self, offset: u64, len: usize) -> bool {
        let end = offset + len as u64;
        self.ranges
            .range(..=offset)
            .next_back()
            .is_some_and(|(_, &range_end)| range_end >= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extents_track_holes() {
        let mut extents = Extents::default();
        extents.insert(8, 4);

        assert!(extents.covers(8, 4));
        assert!(!extents.covers(0, 4));
        assert!(!extents.covers(4, 4));
        assert!(!extents.covers(8, 8));
    }

    #[test]
    fn test_extents_merge_adjacent_ranges() {
        let mut extents = Extents::default();
        extents.insert(8, 4);
        extents.insert(0, 4);
        assert!(!extents.covers(0, 12));

        extents.insert(4, 4);
        assert!(extents.covers(0, 12));
        assert_eq!(extents.ranges.len(), 1);
    }

    #[test]
    fn test_empty_write_covers_nothing() {
        let mut extents = Extents::default();
        extents.insert(0, 0);
        assert!(!extents.covers(0, 1));
    }
}
