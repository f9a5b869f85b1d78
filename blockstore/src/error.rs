//! Errors surfaced by the block store

use std::io;
use std::path::PathBuf;

use crate::slot::SequenceNumber;

/// Error type for block store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("block length must be greater than zero")]
    ZeroBlockLength,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot create backing store at {path:?}: {source}")]
    ResourceCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("store is closed")]
    Closed,

    #[error("timed out waiting for block {sequence}")]
    TimedOut { sequence: SequenceNumber },
}

/// Result of a positional read that did not produce data
///
/// `NotYetWritten` never leaves the store: readers turn it into a wait.
#[derive(Debug, thiserror::Error)]
pub enum BackingError {
    #[error("no data at offset {offset} yet")]
    NotYetWritten { offset: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
