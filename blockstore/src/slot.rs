//! Offset allocation
//!
//! Each direction (writes, reads) owns one `SlotAllocator`. An allocator hands
//! out block-aligned offsets in strictly increasing order; the cursor lives
//! behind the allocator's own lock and is never visible from outside.

use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber {
    id: i64,
}

impl SequenceNumber {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

impl From<SequenceNumber> for i64 {
    fn from(seq: SequenceNumber) -> Self {
        seq.id
    }
}

/// One allocated block position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Absolute byte offset in the backing store
    pub offset: u64,
    /// `offset / block_length`
    pub sequence: SequenceNumber,
}

struct Cursor {
    next_offset: u64,
    last: Option<SequenceNumber>,
}

/// Thread-safe, block-aligned offset generator
pub struct SlotAllocator {
    block_length: u64,
    cursor: Mutex<Cursor>,
}

impl SlotAllocator {
    /// Create an allocator whose cursor starts at offset 0.
    ///
    /// `block_length` is expected to be non-zero; the store validates it
    /// before building its allocators.
    #[must_use]
    pub fn new(block_length: u32) -> Self {
        Self {
            block_length: u64::from(block_length),
            cursor: Mutex::new(Cursor {
                next_offset: 0,
                last: None,
            }),
        }
    }

    /// Take the next slot and advance the cursor by one block
    pub fn allocate(&self) -> Slot {
        let mut cursor = self.cursor.lock();
        let offset = cursor.next_offset;
        cursor.next_offset += self.block_length;

        #[allow(clippy::cast_possible_wrap)]
        let sequence = SequenceNumber::new((offset / self.block_length) as i64);
        cursor.last = Some(sequence);
        Slot { offset, sequence }
    }

    /// Sequence number of the most recent allocation, `None` before the first
    #[must_use]
    pub fn last_allocated(&self) -> Option<SequenceNumber> {
        self.cursor.lock().last
    }
}

impl fmt::Debug for SlotAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cursor = self.cursor.lock();
        write!(
            f,
            "SlotAllocator(block_length={}, next_offset={}, last={:?})",
            self.block_length, cursor.next_offset, cursor.last
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocate_advances_by_block_length() {
        let slots = SlotAllocator::new(8);
        assert_eq!(slots.last_allocated(), None);

        let first = slots.allocate();
        let second = slots.allocate();

        assert_eq!(first.offset, 0);
        assert_eq!(first.sequence, SequenceNumber::new(0));
        assert_eq!(second.offset, 8);
        assert_eq!(second.sequence, SequenceNumber::new(1));
        assert_eq!(slots.last_allocated(), Some(SequenceNumber::new(1)));
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let slots = Arc::new(SlotAllocator::new(3));
        let mut workers = Vec::new();
        for _ in 0..8 {
            let slots = Arc::clone(&slots);
            workers.push(thread::spawn(move || {
                (0..100).map(|_| slots.allocate().offset).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for worker in workers {
            for offset in worker.join().unwrap() {
                assert_eq!(offset % 3, 0);
                assert!(seen.insert(offset), "offset {offset} handed out twice");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(slots.last_allocated(), Some(SequenceNumber::new(799)));
    }
}
