//! Terms: numbered pairs of metadata and data segments.
//!
//! Exactly one term is active at a time. Rolling over closes both segments
//! of the current term before either segment of the next term is opened.
//!
//! # Term sidecar (20 bytes)
//!
//! The last term handed out is persisted in `<ident>.term` before its
//! segments are created, so a restarted journal never reuses a term even if
//! old segments were removed in between.
//!
//! ```text
//! magic("FDLT", 4) + version(4) + term(8) + crc32(4) = 20 bytes
//! ```
//!
//! The sidecar uses little-endian integers.

use crate::codec::EncodedLen;
use crate::paths::JournalPaths;
use crate::segment::{LogSegment, SegmentError, SegmentKind};
use fsjournal_core::TermRange;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Magic bytes for the term sidecar.
pub const TERM_FILE_MAGIC: &[u8; 4] = b"FDLT";

/// Current format version of the term sidecar.
pub const TERM_FILE_VERSION: u32 = 1;

/// Total size of the term sidecar in bytes.
pub const TERM_FILE_SIZE: usize = 20;

/// Errors from term management
#[derive(Debug, thiserror::Error)]
pub enum TermError {
    /// Opening, appending to or closing a segment failed
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Reading or writing the term sidecar failed
    #[error("term file {path}: {source}")]
    Io {
        /// Sidecar path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Term sidecar exists but does not decode
    #[error("term file {path} is corrupt: {reason}")]
    Corrupt {
        /// Sidecar path
        path: PathBuf,
        /// What failed to validate
        reason: String,
    },

    /// Scanning the log directory failed
    #[error("failed to scan log directory: {0}")]
    Scan(#[source] std::io::Error),

    /// No term is open (a previous rollover failed or the manager closed)
    #[error("no term is open")]
    Closed,

    /// Term counter would overflow
    #[error("term counter exhausted")]
    Exhausted,
}

/// The persisted last-used term.
pub struct TermFile;

impl TermFile {
    fn encode(term: u64) -> [u8; TERM_FILE_SIZE] {
        let mut buf = [0u8; TERM_FILE_SIZE];
        buf[0..4].copy_from_slice(TERM_FILE_MAGIC);
        buf[4..8].copy_from_slice(&TERM_FILE_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&term.to_le_bytes());
        let crc = crc32fast::hash(&buf[..16]);
        buf[16..20].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode sidecar bytes, validating magic, version, and CRC.
    pub fn decode(data: &[u8]) -> Result<u64, String> {
        if data.len() != TERM_FILE_SIZE {
            return Err(format!("expected {} bytes, found {}", TERM_FILE_SIZE, data.len()));
        }
        if &data[0..4] != TERM_FILE_MAGIC {
            return Err("invalid magic".to_string());
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&data[4..8]);
        let version = u32::from_le_bytes(word);
        if version != TERM_FILE_VERSION {
            return Err(format!("unsupported version {}", version));
        }
        word.copy_from_slice(&data[16..20]);
        let stored = u32::from_le_bytes(word);
        let computed = crc32fast::hash(&data[..16]);
        if stored != computed {
            return Err(format!(
                "checksum mismatch (stored {:#010x}, computed {:#010x})",
                stored, computed
            ));
        }
        let mut term = [0u8; 8];
        term.copy_from_slice(&data[8..16]);
        Ok(u64::from_le_bytes(term))
    }

    /// Read the last persisted term. `Ok(None)` if there is no sidecar.
    pub fn read(paths: &JournalPaths) -> Result<Option<u64>, TermError> {
        let path = paths.term_file();
        match std::fs::read(&path) {
            Ok(data) => Self::decode(&data)
                .map(Some)
                .map_err(|reason| TermError::Corrupt { path, reason }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TermError::Io { path, source }),
        }
    }

    /// Persist `term` using write-fsync-rename.
    pub fn write(paths: &JournalPaths, term: u64) -> Result<(), TermError> {
        let final_path = paths.term_file();
        let temp_path = final_path.with_extension("term.tmp");
        let io = |source| TermError::Io {
            path: final_path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(io)?;
        file.write_all(&Self::encode(term)).map_err(io)?;
        file.sync_all().map_err(io)?;
        drop(file);

        std::fs::rename(&temp_path, &final_path).map_err(io)?;

        // Sync parent directory
        let dir_fd = File::open(paths.dir()).map_err(io)?;
        dir_fd.sync_all().map_err(io)?;
        Ok(())
    }
}

/// Owns the active segment pair and the term counter.
#[derive(Debug)]
pub struct TermManager {
    paths: JournalPaths,
    meta_capacity: usize,
    data_capacity: usize,
    first: u64,
    current: u64,
    meta: Option<LogSegment>,
    data: Option<LogSegment>,
}

impl TermManager {
    /// Open the first term of this process.
    ///
    /// The term is one past the highest of the sidecar and any segment found
    /// on disk, or 1 for a fresh directory. A corrupt sidecar is logged and
    /// ignored in favor of the directory scan.
    pub fn open(
        paths: JournalPaths,
        meta_capacity: usize,
        data_capacity: usize,
    ) -> Result<Self, TermError> {
        let persisted = match TermFile::read(&paths) {
            Ok(term) => term,
            Err(TermError::Corrupt { path, reason }) => {
                warn!(
                    target: "fsjournal::journal",
                    path = %path.display(),
                    reason = %reason,
                    "Ignoring corrupt term file"
                );
                None
            }
            Err(e) => return Err(e),
        };
        let on_disk = paths.list_terms().map_err(TermError::Scan)?.last().copied();
        let last = persisted.unwrap_or(0).max(on_disk.unwrap_or(0));
        let first = last.checked_add(1).ok_or(TermError::Exhausted)?;

        let mut manager = TermManager {
            paths,
            meta_capacity,
            data_capacity,
            first,
            current: first,
            meta: None,
            data: None,
        };
        manager.open_term(first)?;
        info!(
            target: "fsjournal::journal",
            dir = %manager.paths.dir().display(),
            ident = manager.paths.ident(),
            term = first,
            "Journal opened"
        );
        Ok(manager)
    }

    fn open_term(&mut self, term: u64) -> Result<(), TermError> {
        TermFile::write(&self.paths, term)?;
        let meta = LogSegment::open(
            self.paths.segment_path(SegmentKind::Meta, term),
            SegmentKind::Meta,
            term,
            self.meta_capacity,
        )?;
        // A failure here drops (and so closes) `meta`
        let data = LogSegment::open(
            self.paths.segment_path(SegmentKind::Data, term),
            SegmentKind::Data,
            term,
            self.data_capacity,
        )?;
        self.meta = Some(meta);
        self.data = Some(data);
        self.current = term;
        Ok(())
    }

    fn close_segments(&mut self) -> (u64, u64) {
        let meta_len = self.meta.take().map_or(0, |mut s| s.close());
        let data_len = self.data.take().map_or(0, |mut s| s.close());
        (meta_len, data_len)
    }

    /// Close the current term and open the next one.
    ///
    /// Returns the new term. On failure no term is open.
    pub fn rollover(&mut self) -> Result<u64, TermError> {
        let old = self.current;
        let next = old.checked_add(1).ok_or(TermError::Exhausted)?;
        let (meta_len, data_len) = self.close_segments();
        self.open_term(next)?;
        info!(
            target: "fsjournal::journal",
            old_term = old,
            new_term = next,
            meta_len,
            data_len,
            "Rolled over to new term"
        );
        Ok(next)
    }

    /// Whether a record of `len` bytes would overflow the current term.
    pub fn needs_rollover(&self, len: EncodedLen) -> bool {
        match (&self.meta, &self.data) {
            (Some(meta), Some(data)) => !meta.fits(len.meta) || !data.fits(len.data),
            _ => true,
        }
    }

    /// Whether a record of `len` bytes fits an empty term at all.
    pub fn fits_empty(&self, len: EncodedLen) -> bool {
        len.meta <= self.meta_capacity && len.data <= self.data_capacity
    }

    /// Both active segments, for one append.
    pub fn segments_mut(&mut self) -> Result<(&mut LogSegment, &mut LogSegment), TermError> {
        match (self.meta.as_mut(), self.data.as_mut()) {
            (Some(meta), Some(data)) => Ok((meta, data)),
            _ => Err(TermError::Closed),
        }
    }

    /// Whether a term is currently open
    pub fn is_open(&self) -> bool {
        self.meta.is_some() && self.data.is_some()
    }

    /// Active term
    pub fn current(&self) -> u64 {
        self.current
    }

    /// First term of this process and the active term
    pub fn range(&self) -> TermRange {
        TermRange {
            first: self.first,
            last: self.current,
        }
    }

    /// Layout this manager writes to
    pub fn paths(&self) -> &JournalPaths {
        &self.paths
    }

    /// Close the active term. Idempotent.
    pub fn close(&mut self) {
        if self.is_open() {
            let (meta_len, data_len) = self.close_segments();
            info!(
                target: "fsjournal::journal",
                term = self.current,
                meta_len,
                data_len,
                "Journal closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CAP: usize = 4096;

    #[test]
    fn test_term_file_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        assert_eq!(TermFile::read(&paths).unwrap(), None);
        TermFile::write(&paths, 41).unwrap();
        assert_eq!(TermFile::read(&paths).unwrap(), Some(41));
        assert_eq!(std::fs::read(paths.term_file()).unwrap().len(), TERM_FILE_SIZE);
    }

    #[test]
    fn test_term_file_detects_corruption() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        TermFile::write(&paths, 7).unwrap();
        let mut bytes = std::fs::read(paths.term_file()).unwrap();
        bytes[9] ^= 0xff;
        std::fs::write(paths.term_file(), &bytes).unwrap();
        assert!(matches!(TermFile::read(&paths), Err(TermError::Corrupt { .. })));
        assert!(TermFile::decode(b"short").is_err());
    }

    #[test]
    fn test_first_term_is_one() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        let mgr = TermManager::open(paths.clone(), CAP, CAP).unwrap();
        assert_eq!(mgr.range(), TermRange { first: 1, last: 1 });
        assert!(paths.segment_path(SegmentKind::Meta, 1).exists());
        assert!(paths.segment_path(SegmentKind::Data, 1).exists());
        assert_eq!(TermFile::read(&paths).unwrap(), Some(1));
    }

    #[test]
    fn test_rollover_closes_and_truncates_old_term() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        let mut mgr = TermManager::open(paths.clone(), CAP, CAP).unwrap();
        {
            let (meta, _) = mgr.segments_mut().unwrap();
            meta.reserve(5).unwrap().copy_from_slice(b"abcde");
            meta.commit(5).unwrap();
        }
        assert_eq!(mgr.rollover().unwrap(), 2);
        assert_eq!(mgr.range(), TermRange { first: 1, last: 2 });

        let old_meta = paths.segment_path(SegmentKind::Meta, 1);
        let old_data = paths.segment_path(SegmentKind::Data, 1);
        assert_eq!(std::fs::read(old_meta).unwrap(), b"abcde");
        assert_eq!(std::fs::metadata(old_data).unwrap().len(), 0);
        assert_eq!(
            std::fs::metadata(paths.segment_path(SegmentKind::Meta, 2)).unwrap().len(),
            CAP as u64
        );
    }

    #[test]
    fn test_restart_never_reuses_terms() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        {
            let mut mgr = TermManager::open(paths.clone(), CAP, CAP).unwrap();
            mgr.rollover().unwrap();
            mgr.rollover().unwrap();
            mgr.close();
        }
        // Remove all segments; the sidecar alone keeps the counter
        for term in 1..=3 {
            std::fs::remove_file(paths.segment_path(SegmentKind::Meta, term)).unwrap();
            std::fs::remove_file(paths.segment_path(SegmentKind::Data, term)).unwrap();
        }
        let mgr = TermManager::open(paths, CAP, CAP).unwrap();
        assert_eq!(mgr.range(), TermRange { first: 4, last: 4 });
    }

    #[test]
    fn test_segments_on_disk_win_over_stale_sidecar() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        TermFile::write(&paths, 2).unwrap();
        std::fs::write(paths.segment_path(SegmentKind::Meta, 9), b"").unwrap();
        let mgr = TermManager::open(paths, CAP, CAP).unwrap();
        assert_eq!(mgr.current(), 10);
    }

    #[test]
    fn test_corrupt_sidecar_falls_back_to_scan() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        std::fs::write(paths.term_file(), b"garbage").unwrap();
        std::fs::write(paths.segment_path(SegmentKind::Data, 5), b"").unwrap();
        let mgr = TermManager::open(paths, CAP, CAP).unwrap();
        assert_eq!(mgr.current(), 6);
    }

    #[test]
    fn test_needs_rollover() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        let mut mgr = TermManager::open(paths, CAP, 2 * CAP).unwrap();
        assert!(!mgr.needs_rollover(EncodedLen { meta: CAP, data: 0 }));
        assert!(mgr.needs_rollover(EncodedLen { meta: CAP + 1, data: 0 }));
        assert!(mgr.needs_rollover(EncodedLen { meta: 16, data: 2 * CAP + 1 }));
        assert!(mgr.fits_empty(EncodedLen { meta: CAP, data: 2 * CAP }));
        assert!(!mgr.fits_empty(EncodedLen { meta: CAP + 1, data: 0 }));

        mgr.close();
        assert!(!mgr.is_open());
        assert!(mgr.needs_rollover(EncodedLen::default()));
        assert!(matches!(mgr.segments_mut(), Err(TermError::Closed)));
    }

    #[test]
    fn test_unreadable_sidecar_is_fatal() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "t");
        std::fs::create_dir(paths.term_file()).unwrap();
        assert!(matches!(
            TermManager::open(paths, CAP, CAP),
            Err(TermError::Io { .. })
        ));
    }
}
