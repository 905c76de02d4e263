//! Segment File
//!
//! One append-only file with positional reads.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::error::{CaskError, Result};

/// Handle to a single segment on disk
///
/// Reads take `&self` and use positional I/O, so any number of readers can
/// share one handle. Appends also take `&self` but must be serialized by the
/// owner (the manager's active-segment lock, or the merge writer).
#[derive(Debug)]
pub struct SegmentFile {
    id: u32,
    path: PathBuf,
    file: File,
    /// Bytes written so far; everything below this offset is immutable
    len: AtomicU64,
}

impl SegmentFile {
    /// Create a new, empty segment (fails if the file already exists)
    pub fn create(path: &Path, id: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            len: AtomicU64::new(0),
        })
    }

    /// Open an existing segment for reading and appending
    pub fn open(path: &Path, id: u32) -> Result<Self> {
        let file = OpenOptions::new().read(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            len: AtomicU64::new(len),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes
    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `data`, returning the offset it was written at
    ///
    /// On error the file is cut back to its previous length, so a partly
    /// written record never sits in front of the next append.
    pub fn append(&self, data: &[u8]) -> Result<u64> {
        let offset = self.len();
        if let Err(e) = (&self.file).write_all(data) {
            self.rollback(offset);
            return Err(e.into());
        }
        self.len.store(offset + data.len() as u64, Ordering::Release);
        Ok(offset)
    }

    /// Cut the file back to `len` bytes
    ///
    /// Only for dropping bytes nothing indexes yet; the caller must hold
    /// the same lock it appends under.
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.len.store(len, Ordering::Release);
        Ok(())
    }

    fn rollback(&self, offset: u64) {
        if let Err(e) = self.truncate(offset) {
            warn!(segment = self.id, offset, error = %e, "failed to roll back partial append");
            // Next offset must match the real end of file
            let actual = self.file.metadata().map(|m| m.len()).unwrap_or(offset);
            self.len.store(actual, Ordering::Release);
        }
    }

    /// Move the file to `path`; an existing file there is never replaced
    pub fn rename_to(&mut self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )
            .into());
        }
        fs::rename(&self.path, path)?;
        self.path = path.to_path_buf();
        Ok(())
    }

    /// Read exactly `len` bytes at `offset`
    ///
    /// Fails with `ShortRead` when the segment holds fewer bytes.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let size = self.len();
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(self.short_read(offset, len, size));
        }

        let mut buf = vec![0u8; len];
        match read_exact_at(&self.file, &mut buf, offset) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // File shrank underneath us
                let actual = self.file.metadata().map(|m| m.len()).unwrap_or(0);
                Err(self.short_read(offset, len, actual))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn short_read(&self, offset: u64, len: usize, size: u64) -> CaskError {
        CaskError::ShortRead {
            segment_id: self.id,
            offset,
            expected: len as u64,
            available: size.saturating_sub(offset),
        }
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
