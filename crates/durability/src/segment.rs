//! Append-only memory-mapped log segments.
//!
//! A segment is created at full capacity, preallocated, and mapped shared
//! and writable. Events are appended by reserving bytes at the write cursor,
//! serializing into them, then committing: the touched page range is flushed
//! and the cursor advances. On close the mapping is dropped first, then the
//! file is truncated to the bytes actually written, then the handle closes.
//!
//! Only the durability worker touches a segment, so there is no locking.

use crate::format::PAGE_SIZE;
use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which half of a term a segment holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Event headers and fields
    Meta,
    /// Write payloads
    Data,
}

impl SegmentKind {
    /// Name used in file names
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentKind::Meta => "meta",
            SegmentKind::Data => "data",
        }
    }

    /// Parse a file-name component
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "meta" => Some(SegmentKind::Meta),
            "data" => Some(SegmentKind::Data),
            _ => None,
        }
    }
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from segment operations
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Creating, sizing or mapping the file failed
    #[error("failed to {action} segment {path}: {source}")]
    Io {
        /// Step that failed
        action: &'static str,
        /// Segment file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Requested bytes do not fit in the remaining capacity
    #[error("{kind} segment full: requested {requested} bytes, {remaining} remaining")]
    Full {
        /// Segment kind
        kind: SegmentKind,
        /// Bytes requested
        requested: usize,
        /// Bytes left
        remaining: usize,
    },

    /// Segment was already closed
    #[error("{kind} segment is closed")]
    Closed {
        /// Segment kind
        kind: SegmentKind,
    },

    /// Capacity of zero cannot be mapped
    #[error("segment capacity must be non-zero")]
    ZeroCapacity,
}

fn io_err<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> SegmentError + 'a {
    move |source| SegmentError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Make the file `len` bytes long with its blocks allocated.
///
/// Falls back to writing the last byte when the filesystem cannot
/// preallocate.
fn preallocate(file: &mut File, len: u64, path: &Path) -> io::Result<()> {
    if let Err(e) = file.allocate(len) {
        debug!(
            target: "fsjournal::journal",
            path = %path.display(),
            error = %e,
            "Preallocation unsupported, extending by write"
        );
        file.seek(SeekFrom::Start(len - 1))?;
        file.write_all(&[0])?;
    }
    Ok(())
}

/// One open log object
pub struct LogSegment {
    kind: SegmentKind,
    term: u64,
    path: PathBuf,
    capacity: usize,
    file: Option<File>,
    map: Option<MmapMut>,
    max_offset: usize,
}

impl LogSegment {
    /// Create (or truncate) `path`, size it to `capacity` and map it.
    ///
    /// On failure nothing is left open.
    pub fn open(
        path: impl Into<PathBuf>,
        kind: SegmentKind,
        term: u64,
        capacity: usize,
    ) -> Result<Self, SegmentError> {
        let path = path.into();
        if capacity == 0 {
            return Err(SegmentError::ZeroCapacity);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(io_err("create", &path))?;

        preallocate(&mut file, capacity as u64, &path).map_err(io_err("preallocate", &path))?;

        // SAFETY: The file was just created by us and is sized to `capacity`.
        // Only the owning worker writes through the mapping, and the file is
        // never resized while mapped.
        let map = unsafe { MmapOptions::new().len(capacity).map_mut(&file) }
            .map_err(io_err("map", &path))?;

        debug!(
            target: "fsjournal::journal",
            path = %path.display(),
            kind = %kind,
            term,
            capacity,
            "Opened segment"
        );

        Ok(LogSegment {
            kind,
            term,
            path,
            capacity,
            file: Some(file),
            map: Some(map),
            max_offset: 0,
        })
    }

    /// Segment kind
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Term this segment belongs to
    pub fn term(&self) -> u64 {
        self.term
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapped size in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes committed so far; also the offset of the next append
    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    /// Bytes left before the segment is full
    pub fn remaining(&self) -> usize {
        self.capacity - self.max_offset
    }

    /// Whether `len` more bytes fit
    pub fn fits(&self, len: usize) -> bool {
        len <= self.remaining()
    }

    /// Whether the segment is still mapped
    pub fn is_open(&self) -> bool {
        self.map.is_some()
    }

    /// Mutable view of the next `len` bytes after the write cursor.
    ///
    /// The cursor does not move until [`LogSegment::commit`].
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8], SegmentError> {
        let remaining = self.remaining();
        let kind = self.kind;
        let start = self.max_offset;
        let map = self.map.as_mut().ok_or(SegmentError::Closed { kind })?;
        if len > remaining {
            return Err(SegmentError::Full {
                kind,
                requested: len,
                remaining,
            });
        }
        Ok(&mut map[start..start + len])
    }

    /// Zero the `len` bytes at the write cursor without advancing.
    ///
    /// Used when a reserved region was partly written and then abandoned,
    /// so the tail past `max_offset` still reads as end of segment.
    pub fn discard(&mut self, len: usize) -> Result<(), SegmentError> {
        self.reserve(len)?.fill(0);
        Ok(())
    }

    /// Flush the `len` bytes at the write cursor and advance past them.
    ///
    /// A flush failure is logged and does not stop the append.
    pub fn commit(&mut self, len: usize) -> Result<(), SegmentError> {
        let kind = self.kind;
        if len > self.remaining() {
            return Err(SegmentError::Full {
                kind,
                requested: len,
                remaining: self.remaining(),
            });
        }
        let offset = self.max_offset;
        let map = self.map.as_ref().ok_or(SegmentError::Closed { kind })?;

        if len > 0 {
            let start = offset & !(PAGE_SIZE - 1);
            if let Err(e) = map.flush_range(start, offset + len - start) {
                warn!(
                    target: "fsjournal::journal",
                    path = %self.path.display(),
                    offset,
                    len,
                    error = %e,
                    "Segment flush failed"
                );
            }
        }

        self.max_offset += len;
        Ok(())
    }

    /// Unmap, truncate to the committed length, close.
    ///
    /// Returns the final length. Safe to call more than once; later calls do
    /// nothing. A failed truncation is logged and leaves the file at full
    /// capacity.
    pub fn close(&mut self) -> u64 {
        let len = self.max_offset as u64;
        let Some(file) = self.file.take() else {
            return len;
        };
        drop(self.map.take());

        if let Err(e) = file.set_len(len) {
            warn!(
                target: "fsjournal::journal",
                path = %self.path.display(),
                len,
                error = %e,
                "Failed to truncate segment on close"
            );
        }
        drop(file);

        debug!(
            target: "fsjournal::journal",
            path = %self.path.display(),
            kind = %self.kind,
            term = self.term,
            len,
            "Closed segment"
        );
        len
    }
}

impl Drop for LogSegment {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LogSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSegment")
            .field("kind", &self.kind)
            .field("term", &self.term)
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("max_offset", &self.max_offset)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn append(seg: &mut LogSegment, bytes: &[u8]) {
        seg.reserve(bytes.len()).unwrap().copy_from_slice(bytes);
        seg.commit(bytes.len()).unwrap();
    }

    #[test]
    fn test_open_preallocates_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-meta-1.jnl");
        let seg = LogSegment::open(&path, SegmentKind::Meta, 1, 8192).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
        assert_eq!(seg.max_offset(), 0);
        assert_eq!(seg.remaining(), 8192);
        assert!(seg.is_open());
    }

    #[test]
    fn test_append_and_close_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-data-1.jnl");
        let mut seg = LogSegment::open(&path, SegmentKind::Data, 1, 8192).unwrap();
        append(&mut seg, b"hello");
        append(&mut seg, b" world");
        assert_eq!(seg.max_offset(), 11);

        assert_eq!(seg.close(), 11);
        assert!(!seg.is_open());
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-meta-1.jnl");
        let mut seg = LogSegment::open(&path, SegmentKind::Meta, 1, 4096).unwrap();
        append(&mut seg, b"abc");
        assert_eq!(seg.close(), 3);
        assert_eq!(seg.close(), 3);
        assert!(matches!(seg.reserve(1), Err(SegmentError::Closed { .. })));
        drop(seg);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_drop_closes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-meta-1.jnl");
        {
            let mut seg = LogSegment::open(&path, SegmentKind::Meta, 1, 4096).unwrap();
            append(&mut seg, b"12345678");
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }

    #[test]
    fn test_reserve_beyond_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-meta-1.jnl");
        let mut seg = LogSegment::open(&path, SegmentKind::Meta, 1, 4096).unwrap();
        append(&mut seg, &[1u8; 4000]);
        assert!(seg.fits(96));
        assert!(!seg.fits(97));
        assert!(matches!(
            seg.reserve(97),
            Err(SegmentError::Full { requested: 97, remaining: 96, .. })
        ));
        // Exactly filling the segment is allowed
        append(&mut seg, &[2u8; 96]);
        assert_eq!(seg.remaining(), 0);
    }

    #[test]
    fn test_reopen_truncates_old_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-meta-1.jnl");
        {
            let mut seg = LogSegment::open(&path, SegmentKind::Meta, 1, 4096).unwrap();
            append(&mut seg, b"old data");
        }
        let mut seg = LogSegment::open(&path, SegmentKind::Meta, 1, 4096).unwrap();
        assert!(seg.reserve(8).unwrap().iter().all(|&b| b == 0));
        append(&mut seg, b"new");
        seg.close();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_discard_zeroes_reserved_region() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-meta-1.jnl");
        let mut seg = LogSegment::open(&path, SegmentKind::Meta, 1, 4096).unwrap();
        append(&mut seg, b"keep");
        seg.reserve(6).unwrap().copy_from_slice(b"abandn");
        seg.discard(6).unwrap();
        assert_eq!(seg.max_offset(), 4);
        assert!(seg.reserve(6).unwrap().iter().all(|&b| b == 0));
        seg.close();
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn test_commit_across_page_boundary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-data-1.jnl");
        let mut seg = LogSegment::open(&path, SegmentKind::Data, 1, 3 * PAGE_SIZE).unwrap();
        append(&mut seg, &[7u8; PAGE_SIZE - 10]);
        append(&mut seg, &[8u8; 20]);
        append(&mut seg, &[]);
        assert_eq!(seg.max_offset(), PAGE_SIZE + 10);
    }

    #[test]
    fn test_open_failure_leaves_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("t-meta-1.jnl");
        let err = LogSegment::open(&path, SegmentKind::Meta, 1, 4096).unwrap_err();
        assert!(matches!(err, SegmentError::Io { action: "create", .. }));
        assert!(matches!(
            LogSegment::open(dir.path().join("z"), SegmentKind::Meta, 1, 0),
            Err(SegmentError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(SegmentKind::from_name("meta"), Some(SegmentKind::Meta));
        assert_eq!(SegmentKind::from_name("data"), Some(SegmentKind::Data));
        assert_eq!(SegmentKind::from_name("other"), None);
        assert_eq!(SegmentKind::Data.to_string(), "data");
    }
}
