//! Wait/wake coordination between writers and readers
//!
//! Readers that find no data at their offset park here until a writer
//! reports progress. The monitor keeps a single counter, the *epoch*, which
//! every completed write advances.
//!
//! # Waiting without missing a wake-up
//!
//! The naive workflow loses notifications:
//!
//! 10. Reader: try to read, get "not yet written"
//! 20. Writer: write the block, wake all waiters (nobody is waiting yet)
//! 30. Reader: start waiting, forever
//!
//! To avoid this, the reader takes an epoch snapshot *before* it looks at the
//! data, and then waits only while the epoch is still equal to the snapshot:
//!
//! ```ignore
//! loop {
//!     let seen = monitor.epoch();
//!     if try_read().is_ok() {
//!         break;
//!     }
//!     monitor.wait_past(seen, None);
//! }
//! ```
//!
//! If the write in step 20 lands between the snapshot and the wait, the epoch
//! has already moved and `wait_past` returns immediately. The monitor lock is
//! held only for the snapshot and the wait itself, never during I/O.
//!
//! Any wake-up only means "something changed". Callers re-check their own
//! condition after every return from `wait_past`.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::Instant;

/// Snapshot of the monitor's progress counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

/// Why `wait_past` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The epoch moved past the snapshot
    Advanced,
    /// The monitor was closed
    Closed,
    /// The deadline passed with no progress
    TimedOut,
}

struct State {
    epoch: u64,
    closed: bool,
    waiting: usize,
}

pub struct Monitor {
    state: Mutex<State>,
    cond: Condvar,
}

impl Monitor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                epoch: 0,
                closed: false,
                waiting: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Current epoch, to be passed to `wait_past` later
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        Epoch(self.state.lock().epoch)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of threads currently parked in `wait_past`
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    /// Block until the epoch differs from `seen`, the monitor is closed, or
    /// `deadline` passes.
    ///
    /// The monitor lock is released while the thread is parked.
    pub fn wait_past(&self, seen: Epoch, deadline: Option<Instant>) -> Wake {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Wake::Closed;
            }
            if state.epoch != seen.0 {
                return Wake::Advanced;
            }

            state.waiting += 1;
            let timed_out = match deadline {
                Some(deadline) => self.cond.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.cond.wait(&mut state);
                    false
                }
            };
            state.waiting -= 1;

            // A timeout that raced with a wake still counts as progress
            if timed_out && !state.closed && state.epoch == seen.0 {
                return Wake::TimedOut;
            }
        }
    }

    /// Advance the epoch and wake every parked thread
    pub fn wake_all(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        let waiting = state.waiting;
        let epoch = state.epoch;
        drop(state);

        log::debug!("monitor.wake_all: epoch={epoch}, waiters: {waiting}");
        self.cond.notify_all();
    }

    /// Mark the monitor closed and release all waiters
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            log::warn!("monitor.close: already closed");
            return false;
        }
        state.closed = true;
        state.epoch += 1;
        let waiting = state.waiting;
        drop(state);

        log::debug!("monitor.close: releasing {waiting} waiters");
        self.cond.notify_all();
        true
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Monitor(epoch={}, closed={}, waiting={})",
            state.epoch, state.closed, state.waiting
        )
    }
}
