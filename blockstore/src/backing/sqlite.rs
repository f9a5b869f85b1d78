//! SQLite-backed store
//!
//! Every write becomes one row keyed by its offset (column `pos`). A missing
//! row is the "not yet written" signal.

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use super::BackingStore;
use crate::error::BackingError;

fn to_io(e: rusqlite::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

pub struct SqliteBacking {
    db_path: PathBuf,
    // `Connection` is not `Sync`; reads share it through the mutex
    conn: Mutex<Option<Connection>>,
}

impl SqliteBacking {
    /// Open the database at `db_path` and start with an empty `blocks` table
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or the table cannot be
    /// created.
    pub fn create<P: AsRef<Path>>(db_path: P) -> io::Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path).map_err(to_io)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocks (
                pos INTEGER PRIMARY KEY,
                data BLOB NOT NULL
            );
            DELETE FROM blocks;",
        )
        .map_err(to_io)?;

        log::debug!("sqlite backing created at {db_path:?}");
        Ok(Self {
            db_path,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// In-memory database, mostly for tests
    ///
    /// # Errors
    ///
    /// Returns error if SQLite cannot allocate the database.
    pub fn in_memory() -> io::Result<Self> {
        Self::create(":memory:")
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "sqlite backing is closed")
}

#[allow(clippy::cast_possible_wrap)]
fn row_key(offset: u64) -> i64 {
    offset as i64
}

impl BackingStore for SqliteBacking {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let conn = self.conn.get_mut().as_ref().ok_or_else(closed)?;
        conn.execute(
            "INSERT INTO blocks (pos, data) VALUES (?, ?)",
            params![row_key(offset), data],
        )
        .map_err(to_io)?;
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BackingError> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed)?;
        let result = conn.query_row(
            "SELECT data FROM blocks WHERE pos = ?",
            params![row_key(offset)],
            |row| row.get::<_, Vec<u8>>(0),
        );

        match result {
            Ok(data) if data.len() >= buf.len() => {
                let len = buf.len();
                #[allow(clippy::indexing_slicing)]
                {
                    buf.copy_from_slice(&data[..len]);
                }
                Ok(())
            }
            Ok(data) => Err(BackingError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "row at offset {offset} holds {} bytes, expected {}",
                    data.len(),
                    buf.len()
                ),
            ))),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(BackingError::NotYetWritten { offset })
            }
            Err(e) => Err(BackingError::Io(to_io(e))),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.conn.get_mut().take() {
            Some(conn) => conn.close().map_err(|(_conn, e)| to_io(e)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SqliteBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SqliteBacking(db_path={:?})", self.db_path)
    }
}
