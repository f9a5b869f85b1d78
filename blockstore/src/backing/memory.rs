//! In-memory backing store

use std::io;

use super::{BackingStore, Extents};
use crate::error::BackingError;

/// Growable byte vector addressed by absolute offset
///
/// Useful for tests and single-process use. Contents are lost on close.
#[derive(Debug, Default)]
pub struct MemBacking {
    bytes: Vec<u8>,
    written: Extents,
}

impl MemBacking {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes up to the end of the furthest write
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl BackingStore for MemBacking {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }

        #[allow(clippy::indexing_slicing)]
        {
            self.bytes[start..end].copy_from_slice(data);
        }
        self.written.insert(offset, data.len());
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BackingError> {
        if !self.written.covers(offset, buf.len()) {
            return Err(BackingError::NotYetWritten { offset });
        }
        // SAFETY: `covers` guarantees offset + buf.len() <= self.bytes.len()
        #[allow(clippy::cast_possible_truncation, clippy::indexing_slicing)]
        {
            let start = offset as usize;
            let end = start + buf.len();
            buf.copy_from_slice(&self.bytes[start..end]);
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.bytes = Vec::new();
        self.written = Extents::default();
        Ok(())
    }
}
