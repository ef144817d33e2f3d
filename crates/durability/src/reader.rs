//! Sequential reader for on-disk journals.
//!
//! Events are decoded from the start of a metadata segment, consuming the
//! data segment in step, until the segment ends or an all-zero header (the
//! unwritten tail of a segment that is still open) is reached.

use crate::codec::{decode, CodecError, DecodedRecord};
use crate::format::{EventHeader, SliceReader, EVENT_HEADER_SIZE};
use crate::paths::JournalPaths;
use crate::segment::SegmentKind;
use std::path::{Path, PathBuf};

/// Errors from reading journal segments
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// A file or directory could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File or directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// An event did not decode
    #[error("bad event at metadata offset {offset}: {source}")]
    Decode {
        /// Offset of the event header
        offset: usize,
        /// Decoding failure
        #[source]
        source: CodecError,
    },
}

/// Decode every event in a metadata/data segment pair.
pub fn read_segments(meta: &[u8], data: &[u8]) -> Result<Vec<DecodedRecord>, ReadError> {
    let mut records = Vec::new();
    let mut meta_offset = 0;
    let mut data_offset = 0;

    while meta.len() - meta_offset >= EVENT_HEADER_SIZE {
        let header = EventHeader::read_from(&mut SliceReader::new(&meta[meta_offset..]))
            .map_err(|source| ReadError::Decode {
                offset: meta_offset,
                source,
            })?;
        if header.is_end_marker() {
            return Ok(records);
        }
        let record = decode(&meta[meta_offset..], &data[data_offset..]).map_err(|source| {
            ReadError::Decode {
                offset: meta_offset,
                source,
            }
        })?;
        meta_offset += record.meta_len;
        data_offset += record.data_len;
        records.push(record);
    }

    let tail = &meta[meta_offset..];
    if tail.iter().any(|&b| b != 0) {
        return Err(ReadError::Decode {
            offset: meta_offset,
            source: CodecError::Truncated {
                offset: meta_offset,
                needed: EVENT_HEADER_SIZE,
                remaining: tail.len(),
            },
        });
    }
    Ok(records)
}

fn read_file(path: &Path) -> Result<Vec<u8>, ReadError> {
    std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the terms of one journal from its log directory
#[derive(Debug, Clone)]
pub struct JournalReader {
    paths: JournalPaths,
}

impl JournalReader {
    /// Reader for journal `ident` in `dir`
    pub fn new(dir: impl AsRef<Path>, ident: impl Into<String>) -> Self {
        Self::from_paths(JournalPaths::new(dir, ident))
    }

    /// Reader over an existing layout
    pub fn from_paths(paths: JournalPaths) -> Self {
        JournalReader { paths }
    }

    /// Terms present on disk, ascending
    pub fn terms(&self) -> Result<Vec<u64>, ReadError> {
        self.paths.list_terms().map_err(|source| ReadError::Io {
            path: self.paths.dir().to_path_buf(),
            source,
        })
    }

    /// Decode every event of `term`
    pub fn read_term(&self, term: u64) -> Result<Vec<DecodedRecord>, ReadError> {
        let meta = read_file(&self.paths.segment_path(SegmentKind::Meta, term))?;
        let data = read_file(&self.paths.segment_path(SegmentKind::Data, term))?;
        read_segments(&meta, &data)
    }

    /// Decode an explicit pair of segment files
    pub fn read_files(meta: &Path, data: &Path) -> Result<Vec<DecodedRecord>, ReadError> {
        read_segments(&read_file(meta)?, &read_file(data)?)
    }
}
