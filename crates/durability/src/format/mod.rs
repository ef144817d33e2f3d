//! On-disk byte formats for journal segments.
//!
//! A metadata segment is a sequence of events. Each event is a fixed
//! [`EventHeader`] followed by `ext_length` bytes of per-operation fields.
//! Data-bearing operations (writes) additionally place their payload in the
//! data segment; the metadata carries only its size.
//!
//! Numbers are stored in native width and byte order. Journals are read back
//! on the machine that wrote them.
//!
//! # Module Structure
//!
//! - `cursor`: bounds-checked slice writer/reader
//! - `kv`: key/value extension lists (xattrs, xdata)

pub mod cursor;
pub mod kv;

pub use cursor::{SliceReader, SliceWriter};

use crate::codec::CodecError;
use serde::Serialize;

/// Size of a serialized [`EventHeader`] in bytes.
pub const EVENT_HEADER_SIZE: usize = 16;

/// Flush granularity. Flushed ranges start on a multiple of this.
pub const PAGE_SIZE: usize = 4096;

/// Kind of event recorded in the header.
///
/// Only new requests are written today. Zero is never a valid kind, so an
/// all-zero header marks the unwritten tail of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventKind {
    /// An operation about to be performed
    NewRequest = 1,
}

impl EventKind {
    /// Parse from the on-disk value.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(EventKind::NewRequest),
            _ => None,
        }
    }
}

/// Fixed header at the start of every event.
///
/// ```text
/// event_kind(4) + fop(4) + request_id(4) + ext_length(4) = 16 bytes
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventHeader {
    /// Raw event kind (see [`EventKind`])
    pub event_kind: u32,
    /// Operation tag
    pub fop: u32,
    /// Reserved, always 0
    pub request_id: u32,
    /// Number of metadata bytes following the header
    pub ext_length: u32,
}

impl EventHeader {
    /// Header for a new request of the given operation tag.
    pub fn new_request(fop: u32, ext_length: u32) -> Self {
        EventHeader {
            event_kind: EventKind::NewRequest as u32,
            fop,
            request_id: 0,
            ext_length,
        }
    }

    /// Whether this header is the zero fill past the last event.
    pub fn is_end_marker(&self) -> bool {
        self.event_kind == 0 && self.fop == 0 && self.request_id == 0 && self.ext_length == 0
    }

    /// Write the header at the writer's position.
    pub fn write_to(&self, w: &mut SliceWriter<'_>) -> Result<(), CodecError> {
        w.put_u32(self.event_kind)?;
        w.put_u32(self.fop)?;
        w.put_u32(self.request_id)?;
        w.put_u32(self.ext_length)
    }

    /// Read a header at the reader's position.
    pub fn read_from(r: &mut SliceReader<'_>) -> Result<Self, CodecError> {
        Ok(EventHeader {
            event_kind: r.get_u32()?,
            fop: r.get_u32()?,
            request_id: r.get_u32()?,
            ext_length: r.get_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = EventHeader::new_request(23, 120);
        let mut buf = [0u8; EVENT_HEADER_SIZE];
        let mut w = SliceWriter::new(&mut buf);
        header.write_to(&mut w).unwrap();
        assert_eq!(w.position(), EVENT_HEADER_SIZE);

        let mut r = SliceReader::new(&buf);
        let back = EventHeader::read_from(&mut r).unwrap();
        assert_eq!(back, header);
        assert_eq!(back.request_id, 0);
        assert_eq!(EventKind::from_u32(back.event_kind), Some(EventKind::NewRequest));
    }

    #[test]
    fn test_zero_header_is_end_marker() {
        let buf = [0u8; EVENT_HEADER_SIZE];
        let header = EventHeader::read_from(&mut SliceReader::new(&buf)).unwrap();
        assert!(header.is_end_marker());
        assert!(!EventHeader::new_request(49, 4).is_end_marker());
        assert_eq!(EventKind::from_u32(0), None);
    }

    #[test]
    fn test_header_rejects_short_buffer() {
        let mut buf = [0u8; 10];
        let mut w = SliceWriter::new(&mut buf);
        assert!(matches!(
            EventHeader::new_request(5, 0).write_to(&mut w),
            Err(CodecError::Overrun { .. })
        ));
    }
}
