pub mod backing;
pub mod config;
pub mod error;
pub mod monitor;
pub mod slot;
pub mod store;

#[cfg(not(unix))]
compile_error!("file backing assumes unix positional I/O");

// Re-export store types for convenience
pub use store::{Block, BlockStore};

// Re-export slot types for convenience
pub use slot::{SequenceNumber, Slot, SlotAllocator};

// Re-export backing types for convenience
pub use backing::{BackingStore, FileBacking, MemBacking};
#[cfg(feature = "sqlite")]
pub use backing::SqliteBacking;

pub use config::{Backend, StoreConfig};
pub use error::{BackingError, StoreError};
pub use monitor::{Monitor, Wake};
