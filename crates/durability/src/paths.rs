//! Journal directory layout
//!
//! All files of one journal live directly in its log directory:
//!
//! ```text
//! fdl/
//! ├── fubar.term           # Last term handed out (sidecar)
//! ├── fubar-meta-1.jnl     # Metadata segment, term 1
//! ├── fubar-data-1.jnl     # Data segment, term 1
//! ├── fubar-meta-2.jnl
//! └── ...
//! ```
//!
//! Several journals (different idents) may share one directory.

use crate::segment::SegmentKind;
use std::path::{Path, PathBuf};

/// File extension of segment files
pub const SEGMENT_EXTENSION: &str = "jnl";

/// Paths of one journal
#[derive(Debug, Clone)]
pub struct JournalPaths {
    dir: PathBuf,
    ident: String,
}

impl JournalPaths {
    /// Paths for journal `ident` under `dir`
    pub fn new(dir: impl AsRef<Path>, ident: impl Into<String>) -> Self {
        JournalPaths {
            dir: dir.as_ref().to_path_buf(),
            ident: ident.into(),
        }
    }

    /// Log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Journal identity used as the file name prefix
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// `<dir>/<ident>-<kind>-<term>.jnl`
    pub fn segment_path(&self, kind: SegmentKind, term: u64) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}.{}",
            self.ident,
            kind.as_str(),
            term,
            SEGMENT_EXTENSION
        ))
    }

    /// `<dir>/<ident>.term`
    pub fn term_file(&self) -> PathBuf {
        self.dir.join(format!("{}.term", self.ident))
    }

    /// Parse a segment file name belonging to this journal.
    ///
    /// Returns `None` for other journals' segments and unrelated files.
    pub fn parse_segment_name(&self, file_name: &str) -> Option<(SegmentKind, u64)> {
        let stem = file_name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
        let mut parts = stem.rsplitn(3, '-');
        let term = parts.next()?.parse::<u64>().ok()?;
        let kind = SegmentKind::from_name(parts.next()?)?;
        let ident = parts.next()?;
        (ident == self.ident).then_some((kind, term))
    }

    /// Terms with at least one segment on disk, ascending.
    ///
    /// A missing directory has no terms.
    pub fn list_terms(&self) -> std::io::Result<Vec<u64>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut terms = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some((_, term)) = self.parse_segment_name(name) {
                    terms.push(term);
                }
            }
        }
        terms.sort_unstable();
        terms.dedup();
        Ok(terms)
    }

    /// Create the log directory (and parents) if missing
    pub fn create_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_segment_path_format() {
        let paths = JournalPaths::new("/var/log/fdl", "fubar");
        assert_eq!(
            paths.segment_path(SegmentKind::Meta, 1),
            PathBuf::from("/var/log/fdl/fubar-meta-1.jnl")
        );
        assert_eq!(
            paths.segment_path(SegmentKind::Data, 42),
            PathBuf::from("/var/log/fdl/fubar-data-42.jnl")
        );
        assert_eq!(paths.term_file(), PathBuf::from("/var/log/fdl/fubar.term"));
    }

    #[test]
    fn test_parse_segment_name() {
        let paths = JournalPaths::new("fdl", "brick-0");
        assert_eq!(
            paths.parse_segment_name("brick-0-meta-7.jnl"),
            Some((SegmentKind::Meta, 7))
        );
        assert_eq!(
            paths.parse_segment_name("brick-0-data-12.jnl"),
            Some((SegmentKind::Data, 12))
        );
        assert_eq!(paths.parse_segment_name("brick-1-meta-7.jnl"), None);
        assert_eq!(paths.parse_segment_name("brick-0-meta-x.jnl"), None);
        assert_eq!(paths.parse_segment_name("brick-0-index-7.jnl"), None);
        assert_eq!(paths.parse_segment_name("brick-0-meta-7.jnlx"), None);
        assert_eq!(paths.parse_segment_name("brick-0.term"), None);
    }

    #[test]
    fn test_list_terms() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path(), "fubar");
        assert!(paths.list_terms().unwrap().is_empty());

        for name in [
            "fubar-meta-3.jnl",
            "fubar-data-3.jnl",
            "fubar-meta-1.jnl",
            "other-meta-9.jnl",
            "fubar.term",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(paths.list_terms().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_missing_dir_has_no_terms() {
        let dir = tempdir().unwrap();
        let paths = JournalPaths::new(dir.path().join("absent"), "fubar");
        assert!(paths.list_terms().unwrap().is_empty());
        paths.create_dir().unwrap();
        assert!(paths.dir().is_dir());
    }
}
