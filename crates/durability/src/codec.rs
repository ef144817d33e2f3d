//! Event codec: measure, serialize and decode operation records.
//!
//! Every operation kind has a fixed field layout ([`FopKind::schema`]). The
//! functions here walk that layout generically:
//!
//! - [`measure`] computes the exact metadata and data lengths without
//!   touching any buffer.
//! - [`serialize`] writes the event header and every field into caller
//!   supplied slices, and fails rather than write past them.
//! - [`decode`] reads an event back into named, owned field values.
//!
//! # Field encodings
//!
//! | type | metadata bytes |
//! |------|----------------|
//! | i32 / u32 | 4 |
//! | i64 / u64 | 8 |
//! | handle gfid | 16 |
//! | path reference | 16 gfid + 16 parent gfid + 1 flag (+ name + NUL) |
//! | optional string | 1 flag (+ string + NUL) |
//! | key/value list | see [`crate::format::kv`] |
//! | payload | 8-byte total size; bytes go to the data segment |

use crate::format::{kv, EventHeader, EventKind, SliceReader, SliceWriter, EVENT_HEADER_SIZE};
use fsjournal_core::{
    Dict, Error as CoreError, FieldRef, FieldSpec, FieldType, FileOp, FopKind, Gfid, Loc,
};
use serde::Serialize;

/// Exact encoded size of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EncodedLen {
    /// Bytes in the metadata segment, header included
    pub meta: usize,
    /// Bytes in the data segment
    pub data: usize,
}

/// Errors from encoding or decoding events.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A write would pass the end of the destination buffer.
    #[error("write of {needed} bytes overruns buffer ({remaining} bytes left)")]
    Overrun {
        /// Bytes the write needed
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// A read would pass the end of the source buffer.
    #[error("truncated event: need {needed} bytes at offset {offset}, {remaining} left")]
    Truncated {
        /// Offset the read started at
        offset: usize,
        /// Bytes the read needed
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Serialization wrote a different number of bytes than measured.
    #[error("length mismatch: measured {measured:?}, wrote {written:?}")]
    LengthMismatch {
        /// Lengths from the measure pass
        measured: EncodedLen,
        /// Lengths actually written
        written: EncodedLen,
    },

    /// A length does not fit its on-disk field.
    #[error("length {len} exceeds the on-disk limit")]
    TooLarge {
        /// Offending length
        len: usize,
    },

    /// Header carries an event kind this version does not know.
    #[error("unknown event kind {0}")]
    UnknownEvent(u32),

    /// Bytes do not follow the event layout.
    #[error("malformed event: {0}")]
    Format(String),

    /// The operation itself cannot be journaled, or names an unknown kind.
    #[error(transparent)]
    Malformed(#[from] CoreError),
}

fn check_str(kind: FopKind, spec: &FieldSpec, s: &str) -> Result<(), CodecError> {
    if s.as_bytes().contains(&0) {
        return Err(CoreError::InteriorNul {
            kind,
            field: spec.name,
        }
        .into());
    }
    Ok(())
}

/// (metadata, data) bytes of one field, after checking it can be stored.
fn field_len(
    kind: FopKind,
    spec: &FieldSpec,
    value: &FieldRef<'_>,
) -> Result<(usize, usize), CodecError> {
    let len = match value {
        FieldRef::I32(_) | FieldRef::U32(_) => (4, 0),
        FieldRef::I64(_) | FieldRef::U64(_) => (8, 0),
        FieldRef::Gfid(_) => (16, 0),
        FieldRef::Loc(loc) => match &loc.name {
            Some(name) => {
                check_str(kind, spec, name)?;
                (33 + name.len() + 1, 0)
            }
            None => (33, 0),
        },
        FieldRef::Str(Some(s)) => {
            check_str(kind, spec, s)?;
            (1 + s.len() + 1, 0)
        }
        FieldRef::Str(None) => (1, 0),
        FieldRef::Dict(dict) => {
            if kv::invalid_key(dict).is_some() {
                return Err(CoreError::InteriorNul {
                    kind,
                    field: spec.name,
                }
                .into());
            }
            (kv::measure(dict), 0)
        }
        FieldRef::Payload(bufs) => (8, bufs.iter().map(Vec::len).sum()),
    };
    Ok(len)
}

/// Compute the exact encoded size of `op`.
///
/// Side-effect free; calling it twice gives the same answer. Fails if a
/// string or dictionary key contains an interior NUL, or the metadata would
/// not fit the header's 32-bit length field.
pub fn measure(op: &FileOp) -> Result<EncodedLen, CodecError> {
    let kind = op.kind();
    let mut len = EncodedLen {
        meta: EVENT_HEADER_SIZE,
        data: 0,
    };
    for (spec, value) in kind.schema().iter().zip(op.fields().iter()) {
        let (meta, data) = field_len(kind, spec, value)?;
        len.meta += meta;
        len.data += data;
    }
    if u32::try_from(len.meta - EVENT_HEADER_SIZE).is_err() {
        return Err(CodecError::TooLarge { len: len.meta });
    }
    Ok(len)
}

fn put_gfid(w: &mut SliceWriter<'_>, gfid: &Gfid) -> Result<(), CodecError> {
    w.put_bytes(gfid.as_bytes())
}

fn put_opt_str(w: &mut SliceWriter<'_>, s: Option<&str>) -> Result<(), CodecError> {
    match s {
        Some(s) => {
            w.put_u8(1)?;
            w.put_cstr(s)
        }
        None => w.put_u8(0),
    }
}

fn write_field(
    meta: &mut SliceWriter<'_>,
    data: &mut SliceWriter<'_>,
    value: &FieldRef<'_>,
) -> Result<(), CodecError> {
    match value {
        FieldRef::I32(v) => meta.put_i32(*v),
        FieldRef::U32(v) => meta.put_u32(*v),
        FieldRef::I64(v) => meta.put_i64(*v),
        FieldRef::U64(v) => meta.put_u64(*v),
        FieldRef::Gfid(gfid) => put_gfid(meta, gfid),
        FieldRef::Loc(loc) => {
            put_gfid(meta, &loc.gfid)?;
            put_gfid(meta, &loc.pargfid)?;
            put_opt_str(meta, loc.name.as_deref())
        }
        FieldRef::Str(s) => put_opt_str(meta, *s),
        FieldRef::Dict(dict) => kv::write(meta, dict),
        FieldRef::Payload(bufs) => {
            let total: usize = bufs.iter().map(Vec::len).sum();
            meta.put_u64(total as u64)?;
            for buf in bufs.iter() {
                data.put_bytes(buf)?;
            }
            Ok(())
        }
    }
}

/// Serialize `op` into the start of `meta` and `data`.
///
/// Returns the number of bytes written to each, which always equals
/// [`measure`]. Nothing is written past either slice: a short slice yields
/// [`CodecError::Overrun`].
pub fn serialize(op: &FileOp, meta: &mut [u8], data: &mut [u8]) -> Result<EncodedLen, CodecError> {
    let measured = measure(op)?;
    let kind = op.kind();
    let ext_length = u32::try_from(measured.meta - EVENT_HEADER_SIZE)
        .map_err(|_| CodecError::TooLarge { len: measured.meta })?;

    let mut mw = SliceWriter::new(meta);
    let mut dw = SliceWriter::new(data);
    EventHeader::new_request(kind.tag(), ext_length).write_to(&mut mw)?;
    for value in op.fields().iter() {
        write_field(&mut mw, &mut dw, value)?;
    }

    let written = EncodedLen {
        meta: mw.position(),
        data: dw.position(),
    };
    if written != measured {
        return Err(CodecError::LengthMismatch { measured, written });
    }
    Ok(written)
}

/// Serialize `op` into freshly allocated buffers.
pub fn encode(op: &FileOp) -> Result<(Vec<u8>, Vec<u8>), CodecError> {
    let len = measure(op)?;
    let mut meta = vec![0u8; len.meta];
    let mut data = vec![0u8; len.data];
    serialize(op, &mut meta, &mut data)?;
    Ok((meta, data))
}

/// Owned value of one decoded field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// 4-byte signed integer
    I32(i32),
    /// 4-byte unsigned integer
    U32(u32),
    /// 8-byte signed integer
    I64(i64),
    /// 8-byte unsigned integer
    U64(u64),
    /// Handle gfid
    Gfid(Gfid),
    /// Path reference
    Loc(Loc),
    /// Optional string
    Str(Option<String>),
    /// Key/value list
    Dict(Dict),
    /// Payload bytes, contiguous
    Payload(Vec<u8>),
}

impl From<FieldRef<'_>> for FieldValue {
    fn from(value: FieldRef<'_>) -> Self {
        match value {
            FieldRef::I32(v) => FieldValue::I32(v),
            FieldRef::U32(v) => FieldValue::U32(v),
            FieldRef::I64(v) => FieldValue::I64(v),
            FieldRef::U64(v) => FieldValue::U64(v),
            FieldRef::Gfid(g) => FieldValue::Gfid(*g),
            FieldRef::Loc(l) => FieldValue::Loc(l.clone()),
            FieldRef::Str(s) => FieldValue::Str(s.map(str::to_owned)),
            FieldRef::Dict(d) => FieldValue::Dict(d.clone()),
            FieldRef::Payload(bufs) => FieldValue::Payload(bufs.concat()),
        }
    }
}

/// One named field of a decoded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    /// Argument name from the kind's layout
    pub name: &'static str,
    /// Decoded value
    pub value: FieldValue,
}

/// An event read back from a segment pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedRecord {
    /// Event header as stored
    pub header: EventHeader,
    /// Operation kind
    pub kind: FopKind,
    /// Fields in layout order
    pub fields: Vec<DecodedField>,
    /// Metadata bytes consumed, header included
    pub meta_len: usize,
    /// Data bytes consumed
    pub data_len: usize,
}

impl DecodedRecord {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Bytes this event occupies on disk.
    pub fn len(&self) -> EncodedLen {
        EncodedLen {
            meta: self.meta_len,
            data: self.data_len,
        }
    }

    /// An event always has at least a header.
    pub fn is_empty(&self) -> bool {
        false
    }
}

fn get_opt_str(r: &mut SliceReader<'_>) -> Result<Option<String>, CodecError> {
    match r.get_u8()? {
        0 => Ok(None),
        _ => Ok(Some(r.get_cstr()?.to_owned())),
    }
}

fn read_field(
    ty: FieldType,
    meta: &mut SliceReader<'_>,
    data: &mut SliceReader<'_>,
) -> Result<FieldValue, CodecError> {
    let value = match ty {
        FieldType::I32 => FieldValue::I32(meta.get_i32()?),
        FieldType::U32 => FieldValue::U32(meta.get_u32()?),
        FieldType::I64 => FieldValue::I64(meta.get_i64()?),
        FieldType::U64 => FieldValue::U64(meta.get_u64()?),
        FieldType::Gfid => FieldValue::Gfid(Gfid::from_bytes(meta.get_16()?)),
        FieldType::Loc => FieldValue::Loc(Loc {
            gfid: Gfid::from_bytes(meta.get_16()?),
            pargfid: Gfid::from_bytes(meta.get_16()?),
            name: get_opt_str(meta)?,
        }),
        FieldType::Str => FieldValue::Str(get_opt_str(meta)?),
        FieldType::Dict => FieldValue::Dict(kv::read(meta)?),
        FieldType::Payload => {
            let size = meta.get_u64()?;
            let size = usize::try_from(size).map_err(|_| CodecError::TooLarge { len: usize::MAX })?;
            FieldValue::Payload(data.take(size)?.to_vec())
        }
    };
    Ok(value)
}

/// Decode the event at the start of `meta`, whose payload (if any) starts at
/// the start of `data`.
///
/// Both slices may extend past the event; the consumed lengths are reported
/// in the returned record.
pub fn decode(meta: &[u8], data: &[u8]) -> Result<DecodedRecord, CodecError> {
    let header = EventHeader::read_from(&mut SliceReader::new(meta))?;
    if EventKind::from_u32(header.event_kind).is_none() {
        return Err(CodecError::UnknownEvent(header.event_kind));
    }
    let kind = FopKind::from_tag(header.fop).ok_or(CoreError::UnknownFop(header.fop))?;

    let end = EVENT_HEADER_SIZE + header.ext_length as usize;
    if meta.len() < end {
        return Err(CodecError::Truncated {
            offset: EVENT_HEADER_SIZE,
            needed: header.ext_length as usize,
            remaining: meta.len() - EVENT_HEADER_SIZE,
        });
    }

    let mut mr = SliceReader::new(&meta[EVENT_HEADER_SIZE..end]);
    let mut dr = SliceReader::new(data);
    let mut fields = Vec::with_capacity(kind.schema().len());
    for spec in kind.schema() {
        fields.push(DecodedField {
            name: spec.name,
            value: read_field(spec.ty, &mut mr, &mut dr)?,
        });
    }
    if mr.remaining() != 0 {
        return Err(CodecError::Format(format!(
            "{} event has {} trailing bytes",
            kind,
            mr.remaining()
        )));
    }

    Ok(DecodedRecord {
        header,
        kind,
        fields,
        meta_len: end,
        data_len: dr.position(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsjournal_core::StatAttrs;

    fn create_op() -> FileOp {
        FileOp::Create {
            loc: Loc::named(Gfid::new(), "file01.txt"),
            flags: 0o100,
            mode: 0o644,
            umask: 0o022,
            fd: Gfid::new(),
            xdata: Dict::new().with("user.x", "v"),
        }
    }

    #[test]
    fn test_create_lengths() {
        // header + loc(33 + 10 + 1) + flags + mode + umask + fd + xdata
        let expected_xdata = 4 + 7 + 4 + 1 + 4;
        let expected = 16 + 44 + 4 + 4 + 4 + 16 + expected_xdata;
        let len = measure(&create_op()).unwrap();
        assert_eq!(len, EncodedLen { meta: expected, data: 0 });
    }

    #[test]
    fn test_measure_is_idempotent() {
        let op = create_op();
        assert_eq!(measure(&op).unwrap(), measure(&op).unwrap());
    }

    #[test]
    fn test_serialize_header() {
        let op = create_op();
        let (meta, data) = encode(&op).unwrap();
        assert!(data.is_empty());

        let header = EventHeader::read_from(&mut SliceReader::new(&meta)).unwrap();
        assert_eq!(header.event_kind, EventKind::NewRequest as u32);
        assert_eq!(header.fop, FopKind::Create.tag());
        assert_eq!(header.request_id, 0);
        assert_eq!(header.ext_length as usize, meta.len() - EVENT_HEADER_SIZE);
    }

    #[test]
    fn test_write_payload_goes_to_data() {
        let op = FileOp::Write {
            fd: Gfid::new(),
            payload: vec![b"hello ".to_vec(), b"world".to_vec()],
            offset: 4096,
            flags: 0,
            xdata: Dict::new(),
        };
        let len = measure(&op).unwrap();
        assert_eq!(len.data, 11);
        assert_eq!(len.meta, 16 + 16 + 8 + 8 + 4 + 4);

        let (meta, data) = encode(&op).unwrap();
        assert_eq!(data, b"hello world");
        let record = decode(&meta, &data).unwrap();
        assert_eq!(record.field("payload"), Some(&FieldValue::Payload(b"hello world".to_vec())));
        assert_eq!(record.field("offset"), Some(&FieldValue::I64(4096)));
        assert_eq!(record.len(), len);
    }

    #[test]
    fn test_decode_matches_fields() {
        let op = FileOp::Setattr {
            loc: Loc::by_gfid(Gfid::new()),
            stat: StatAttrs {
                prot: 0o755,
                uid: 1000,
                gid: 100,
                atime: 1_700_000_000,
                atime_nsec: 5,
                mtime: -1,
                mtime_nsec: 999_999_999,
            },
            valid: 0x7f,
            xdata: Dict::new().with("a", vec![0u8, 1]),
        };
        let (meta, data) = encode(&op).unwrap();
        let record = decode(&meta, &data).unwrap();
        assert_eq!(record.kind, FopKind::Setattr);

        let expected: Vec<FieldValue> = op.fields().into_iter().map(FieldValue::from).collect();
        let got: Vec<FieldValue> = record.fields.iter().map(|f| f.value.clone()).collect();
        assert_eq!(got, expected);
        assert_eq!(record.fields[3].name, "stat.gid");
    }

    #[test]
    fn test_serialize_refuses_short_buffer() {
        let op = create_op();
        let len = measure(&op).unwrap();
        let mut meta = vec![0u8; len.meta - 1];
        let err = serialize(&op, &mut meta, &mut []).unwrap_err();
        assert!(matches!(err, CodecError::Overrun { .. }));
    }

    #[test]
    fn test_serialize_leaves_tail_untouched() {
        let op = create_op();
        let len = measure(&op).unwrap();
        let mut meta = vec![0xAAu8; len.meta + 8];
        serialize(&op, &mut meta, &mut []).unwrap();
        assert!(meta[len.meta..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_interior_nul_rejected() {
        let op = FileOp::Removexattr {
            loc: Loc::by_gfid(Gfid::new()),
            name: Some("user.\0bad".into()),
            xdata: Dict::new(),
        };
        let err = measure(&op).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Malformed(CoreError::InteriorNul { field: "name", .. })
        ));

        let op = FileOp::Mkdir {
            loc: Loc::named(Gfid::new(), "dir"),
            mode: 0o755,
            umask: 0,
            xdata: Dict::new().with("k\0", "v"),
        };
        assert!(matches!(
            measure(&op),
            Err(CodecError::Malformed(CoreError::InteriorNul { field: "xdata", .. }))
        ));
    }

    #[test]
    fn test_optional_strings() {
        let op = FileOp::Fremovexattr {
            fd: Gfid::new(),
            name: None,
            xdata: Dict::new(),
        };
        assert_eq!(measure(&op).unwrap().meta, 16 + 16 + 1 + 4);
        let (meta, data) = encode(&op).unwrap();
        assert_eq!(decode(&meta, &data).unwrap().field("name"), Some(&FieldValue::Str(None)));
    }

    #[test]
    fn test_decode_unknown_tag() {
        let (mut meta, data) = encode(&create_op()).unwrap();
        meta[4..8].copy_from_slice(&12u32.to_ne_bytes());
        assert!(matches!(
            decode(&meta, &data),
            Err(CodecError::Malformed(CoreError::UnknownFop(12)))
        ));
    }

    #[test]
    fn test_decode_unknown_event_kind() {
        let (mut meta, data) = encode(&create_op()).unwrap();
        meta[0..4].copy_from_slice(&9u32.to_ne_bytes());
        assert!(matches!(decode(&meta, &data), Err(CodecError::UnknownEvent(9))));
    }

    #[test]
    fn test_decode_truncated_event() {
        let (meta, data) = encode(&create_op()).unwrap();
        assert!(matches!(
            decode(&meta[..meta.len() - 1], &data),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decoded_record_json() {
        let (meta, data) = encode(&create_op()).unwrap();
        let record = decode(&meta, &data).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "Create");
        assert_eq!(json["fields"][0]["name"], "loc");
        assert_eq!(json["fields"][0]["value"]["name"], "file01.txt");
    }
}
