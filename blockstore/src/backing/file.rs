//! File-backed store using positional I/O

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use super::{BackingStore, Extents};
use crate::error::BackingError;

/// A freshly created file addressed by absolute offset
///
/// Positional writes past the current end leave sparse regions that the OS
/// reads back as zeros. The written extents are tracked in memory so those
/// regions report `NotYetWritten` instead.
pub struct FileBacking {
    path: PathBuf,
    file: File,
    written: Extents,
}

impl FileBacking {
    /// Create (or truncate) the file at `path`
    ///
    /// # Errors
    ///
    /// Returns the OS error if the file cannot be opened for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        log::debug!("file backing created at {path:?}");
        Ok(Self {
            path,
            file,
            written: Extents::default(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for FileBacking {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)?;
        self.written.insert(offset, data.len());
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BackingError> {
        if !self.written.covers(offset, buf.len()) {
            return Err(BackingError::NotYetWritten { offset });
        }
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        log::debug!("file backing closing {:?}", self.path);
        self.file.sync_data()
    }
}

impl fmt::Debug for FileBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileBacking(path={:?})", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_back_written_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut backing = FileBacking::create(dir.path().join("blocks")).unwrap();

        backing.write_at(0, b"abcd").unwrap();

        let mut buf = [0u8; 4];
        backing.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_sparse_hole_is_not_yet_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut backing = FileBacking::create(dir.path().join("blocks")).unwrap();

        backing.write_at(4, b"efgh").unwrap();

        let mut buf = [0u8; 4];
        let result = backing.read_at(0, &mut buf);
        assert!(matches!(result, Err(BackingError::NotYetWritten { offset: 0 })));
        let result = backing.read_at(8, &mut buf);
        assert!(matches!(result, Err(BackingError::NotYetWritten { offset: 8 })));
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks");
        std::fs::write(&path, b"stale data").unwrap();

        let mut backing = FileBacking::create(&path).unwrap();
        backing.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileBacking::create(dir.path().join("missing").join("blocks"));
        assert!(result.is_err());
    }
}
