//! Synchronized fixed-block store
//!
//! Many writer threads append blocks, many reader threads consume them, all
//! through one shared `BlockStore`:
//! - Writers and readers each draw offsets from their own `SlotAllocator`
//! - Physical I/O goes through one `RwLock` over the backing store
//!   (writes exclusive, reads shared)
//! - A reader whose block is not written yet parks on the `Monitor` until
//!   some write completes, then re-checks its own offset
//!
//! The two sides count independently: a reader gets "the block at read slot
//! k", whichever write put it there.

use parking_lot::RwLock;
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::backing::{BackingStore, FileBacking, MemBacking};
use crate::config::{Backend, StoreConfig};
use crate::error::{BackingError, StoreError};
use crate::monitor::{Monitor, Wake};
use crate::slot::{SequenceNumber, SlotAllocator};

/// One block delivered to a reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub sequence: SequenceNumber,
    pub data: Vec<u8>,
}

/// Fixed-block store shared between writer and reader threads
///
/// # Thread Safety
///
/// All methods take `&self`; share the store with `Arc<BlockStore<_>>`.
///
/// - **Writes** hold the exclusive I/O lock only for the physical write, and
///   wake readers after releasing it.
/// - **Reads** hold the shared I/O lock only while probing their offset.
///   While parked they hold no lock at all.
/// - **Allocation** never touches the I/O lock, so handing out offsets does
///   not wait behind storage.
pub struct BlockStore<B: BackingStore> {
    block_length: u32,
    writes: SlotAllocator,
    reads: SlotAllocator,
    // `None` once closed
    backing: RwLock<Option<B>>,
    monitor: Monitor,
    read_timeout: Option<Duration>,
}

impl BlockStore<FileBacking> {
    /// Create a store over a new file at `path`
    ///
    /// # Errors
    ///
    /// - `StoreError::ZeroBlockLength` if `block_length` is zero (no file is created)
    /// - `StoreError::ResourceCreation` if the file cannot be created
    pub fn create<P: AsRef<Path>>(path: P, block_length: u32) -> Result<Self, StoreError> {
        check_block_length(block_length)?;
        let path = path.as_ref();
        let backing = FileBacking::create(path).map_err(|source| StoreError::ResourceCreation {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_backing(backing, block_length)
    }
}

impl BlockStore<Box<dyn BackingStore>> {
    /// Build the backend named in `config`
    ///
    /// # Errors
    ///
    /// Configuration and resource creation errors, as for `create`. Asking for
    /// the sqlite backend without the `sqlite` feature is a `StoreError::Config`.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let creation_error = |source| StoreError::ResourceCreation {
            path: config.path.clone(),
            source,
        };

        let backing: Box<dyn BackingStore> = match config.backend {
            Backend::File => Box::new(FileBacking::create(&config.path).map_err(creation_error)?),
            Backend::Memory => Box::new(MemBacking::new()),
            #[cfg(feature = "sqlite")]
            Backend::Sqlite => Box::new(
                crate::backing::SqliteBacking::create(&config.path).map_err(creation_error)?,
            ),
            #[cfg(not(feature = "sqlite"))]
            Backend::Sqlite => {
                return Err(StoreError::Config(
                    "sqlite backend requires the `sqlite` feature".to_string(),
                ))
            }
        };

        let store = Self::with_backing(backing, config.block_length)?;
        Ok(store.with_read_timeout(config.read_timeout()))
    }
}

fn check_block_length(block_length: u32) -> Result<(), StoreError> {
    if block_length == 0 {
        return Err(StoreError::ZeroBlockLength);
    }
    Ok(())
}

impl<B: BackingStore> BlockStore<B> {
    /// Wrap a fresh backing store. Both cursors start at offset 0.
    ///
    /// # Errors
    ///
    /// `StoreError::ZeroBlockLength` if `block_length` is zero.
    pub fn with_backing(backing: B, block_length: u32) -> Result<Self, StoreError> {
        check_block_length(block_length)?;
        Ok(Self {
            block_length,
            writes: SlotAllocator::new(block_length),
            reads: SlotAllocator::new(block_length),
            backing: RwLock::new(Some(backing)),
            monitor: Monitor::new(),
            read_timeout: None,
        })
    }

    /// Default bound for `read()`; `None` waits forever
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn block_length(&self) -> u32 {
        self.block_length
    }

    /// Last sequence number handed to a reader, `None` before the first read
    #[must_use]
    pub fn read_sequence_number(&self) -> Option<SequenceNumber> {
        self.reads.last_allocated()
    }

    /// Last sequence number handed to a writer, `None` before the first write
    #[must_use]
    pub fn write_sequence_number(&self) -> Option<SequenceNumber> {
        self.writes.last_allocated()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.backing.read().is_none()
    }

    /// Trim or zero-pad `data` to exactly one block
    fn to_block<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]> {
        let len = self.block_length as usize;
        match data.len() {
            n if n >= len => Cow::Borrowed(data.get(..len).unwrap_or(data)),
            _ => {
                let mut padded = data.to_vec();
                padded.resize(len, 0);
                Cow::Owned(padded)
            }
        }
    }

    /// Store one block and wake all waiting readers
    ///
    /// Input longer than the block length is truncated, shorter input is
    /// zero-padded.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the physical write fails. The allocated sequence
    ///   number is not reused, leaving a hole that no write will ever fill.
    /// - `StoreError::Closed` if the store is closed.
    pub fn write(&self, data: &[u8]) -> Result<SequenceNumber, StoreError> {
        let block = self.to_block(data);
        let slot = self.writes.allocate();
        trace!(sequence = slot.sequence.id(), offset = slot.offset, "write slot allocated");

        {
            let mut guard = self.backing.write();
            let backing = guard.as_mut().ok_or(StoreError::Closed)?;
            if let Err(e) = backing.write_at(slot.offset, &block) {
                warn!(sequence = slot.sequence.id(), error = %e, "write failed, slot skipped");
                return Err(StoreError::Io(e));
            }
        }

        self.monitor.wake_all();
        debug!(sequence = slot.sequence.id(), "block written");
        Ok(slot.sequence)
    }

    /// Take the next read slot and return its block, waiting for a writer
    /// if necessary.
    ///
    /// Waits at most the configured read timeout, forever if none is set.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` on a genuine read failure (not retried)
    /// - `StoreError::Closed` if the store is or gets closed
    /// - `StoreError::TimedOut` if the configured timeout expires
    pub fn read(&self) -> Result<Block, StoreError> {
        self.read_until(self.read_timeout.map(|timeout| Instant::now() + timeout))
    }

    /// Like `read`, with an explicit bound on the wait
    ///
    /// # Errors
    ///
    /// See `read`. On `StoreError::TimedOut` the read slot is consumed.
    pub fn read_timeout(&self, timeout: Duration) -> Result<Block, StoreError> {
        self.read_until(Some(Instant::now() + timeout))
    }

    fn read_until(&self, deadline: Option<Instant>) -> Result<Block, StoreError> {
        let slot = self.reads.allocate();
        trace!(sequence = slot.sequence.id(), offset = slot.offset, "read slot allocated");
        let mut data = vec![0u8; self.block_length as usize];

        loop {
            // Snapshot before probing, see `crate::monitor`
            let seen = self.monitor.epoch();
            {
                let guard = self.backing.read();
                let backing = guard.as_ref().ok_or(StoreError::Closed)?;
                match backing.read_at(slot.offset, &mut data) {
                    Ok(()) => {
                        debug!(sequence = slot.sequence.id(), "block read");
                        return Ok(Block {
                            sequence: slot.sequence,
                            data,
                        });
                    }
                    Err(BackingError::NotYetWritten { .. }) => {}
                    Err(BackingError::Io(e)) => {
                        warn!(sequence = slot.sequence.id(), error = %e, "read failed");
                        return Err(StoreError::Io(e));
                    }
                }
            }

            trace!(sequence = slot.sequence.id(), "block not written yet, waiting");
            match self.monitor.wait_past(seen, deadline) {
                Wake::Advanced => {}
                Wake::Closed => return Err(StoreError::Closed),
                Wake::TimedOut => {
                    return Err(StoreError::TimedOut {
                        sequence: slot.sequence,
                    })
                }
            }
        }
    }

    /// Release the backing store and fail all waiting readers with
    /// `StoreError::Closed`
    ///
    /// Waits for in-flight I/O to finish. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// `StoreError::Io` if the backing store fails to close. The store is
    /// closed regardless.
    pub fn close(&self) -> Result<(), StoreError> {
        let backing = self.backing.write().take();
        let Some(mut backing) = backing else {
            log::warn!("BlockStore::close() called on already closed store: {self:?}");
            return Ok(());
        };

        let result = backing.close();
        drop(backing);
        self.monitor.close();
        debug!(
            writes = ?self.writes.last_allocated(),
            reads = ?self.reads.last_allocated(),
            "store closed"
        );
        result.map_err(StoreError::Io)
    }
}

impl<B: BackingStore> fmt::Debug for BlockStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockStore(block_length={}, writes={:?}, reads={:?}, {:?})",
            self.block_length, self.writes, self.reads, self.monitor
        )
    }
}

impl<B: BackingStore> Drop for BlockStore<B> {
    fn drop(&mut self) {
        if let Some(mut backing) = self.backing.get_mut().take() {
            if let Err(e) = backing.close() {
                warn!(error = %e, "closing backing store on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_block_length_rejected() {
        let result = BlockStore::with_backing(MemBacking::new(), 0);
        assert!(matches!(result, Err(StoreError::ZeroBlockLength)));
    }

    #[test]
    fn test_write_then_read() {
        let store = BlockStore::with_backing(MemBacking::new(), 4).unwrap();

        assert_eq!(store.write(b"AAAA").unwrap(), SequenceNumber::new(0));
        assert_eq!(store.write(b"BBBB").unwrap(), SequenceNumber::new(1));

        let block = store.read().unwrap();
        assert_eq!(block.sequence, SequenceNumber::new(0));
        assert_eq!(block.data, b"AAAA");

        let block = store.read().unwrap();
        assert_eq!(block.sequence, SequenceNumber::new(1));
        assert_eq!(block.data, b"BBBB");
    }

    #[test]
    fn test_long_input_truncated_short_input_padded() {
        let store = BlockStore::with_backing(MemBacking::new(), 4).unwrap();
        store.write(b"ABCDEFG").unwrap();
        store.write(b"xy").unwrap();

        assert_eq!(store.read().unwrap().data, b"ABCD");
        assert_eq!(store.read().unwrap().data, b"xy\0\0");
    }

    #[test]
    fn test_sequence_numbers_before_and_after_use() {
        let store = BlockStore::with_backing(MemBacking::new(), 2).unwrap();
        assert_eq!(store.block_length(), 2);
        assert_eq!(store.write_sequence_number(), None);
        assert_eq!(store.read_sequence_number(), None);

        store.write(b"ab").unwrap();
        store.write(b"cd").unwrap();
        store.read().unwrap();

        assert_eq!(store.write_sequence_number(), Some(SequenceNumber::new(1)));
        assert_eq!(store.read_sequence_number(), Some(SequenceNumber::new(0)));
    }

    #[test]
    fn test_operations_after_close() {
        let store = BlockStore::with_backing(MemBacking::new(), 4).unwrap();
        store.write(b"AAAA").unwrap();
        store.close().unwrap();

        assert!(store.is_closed());
        assert!(matches!(store.write(b"BBBB"), Err(StoreError::Closed)));
        assert!(matches!(store.read(), Err(StoreError::Closed)));
        // second close is a no-op
        store.close().unwrap();
    }

    #[test]
    fn test_read_timeout_without_writer() {
        let store = BlockStore::with_backing(MemBacking::new(), 4).unwrap();
        let result = store.read_timeout(Duration::from_millis(20));
        assert!(matches!(
            result,
            Err(StoreError::TimedOut { sequence }) if sequence == SequenceNumber::new(0)
        ));

        // the timed out slot is dead; the next read waits on slot 1
        store.write(b"AAAA").unwrap();
        store.write(b"BBBB").unwrap();
        assert_eq!(store.read().unwrap().data, b"BBBB");
    }
}
