//! Human-readable rendering of decoded events.
//!
//! ```text
//! === GF_FOP_CREATE
//! loc = loc {
//!   gfid = 00000000-0000-0000-0000-000000000000
//!   pargfid = 6f3c...
//!   name = file01.txt
//! }
//! flags = 578 (0x242)
//! ...
//! xdata = dict {
//!   user.x = v <1 bytes>
//! }
//! ```

use crate::codec::{DecodedRecord, FieldValue};
use fsjournal_core::{Dict, Loc};
use std::fmt;

/// `Display` adapter for one decoded event.
#[derive(Debug, Clone, Copy)]
pub struct RecordDump<'a>(pub &'a DecodedRecord);

impl fmt::Display for RecordDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        writeln!(f, "=== GF_FOP_{}", record.kind.name().to_ascii_uppercase())?;
        for field in &record.fields {
            write_field(f, field.name, &field.value)?;
        }
        Ok(())
    }
}

fn write_field(f: &mut fmt::Formatter<'_>, name: &str, value: &FieldValue) -> fmt::Result {
    match value {
        FieldValue::I32(v) => writeln!(f, "{} = {} ({:#x})", name, v, v),
        FieldValue::U32(v) => writeln!(f, "{} = {} ({:#x})", name, v, v),
        FieldValue::I64(v) => writeln!(f, "{} = {} ({:#x})", name, v, v),
        FieldValue::U64(v) => writeln!(f, "{} = {} ({:#x})", name, v, v),
        FieldValue::Gfid(g) => writeln!(f, "{} = <gfid {}>", name, g),
        FieldValue::Loc(loc) => write_loc(f, name, loc),
        FieldValue::Str(Some(s)) => writeln!(f, "{} = {}", name, s),
        FieldValue::Str(None) => writeln!(f, "{} = <null>", name),
        FieldValue::Dict(dict) => write_dict(f, name, dict),
        FieldValue::Payload(bytes) => writeln!(f, "{} = <{} bytes>", name, bytes.len()),
    }
}

fn write_loc(f: &mut fmt::Formatter<'_>, name: &str, loc: &Loc) -> fmt::Result {
    writeln!(f, "{} = loc {{", name)?;
    writeln!(f, "  gfid = {}", loc.gfid)?;
    writeln!(f, "  pargfid = {}", loc.pargfid)?;
    match &loc.name {
        Some(entry) => writeln!(f, "  name = {}", entry)?,
        None => writeln!(f, "  name = <null>")?,
    }
    writeln!(f, "}}")
}

fn write_dict(f: &mut fmt::Formatter<'_>, name: &str, dict: &Dict) -> fmt::Result {
    writeln!(f, "{} = dict {{", name)?;
    for (key, value) in dict.iter() {
        match printable(value) {
            Some(text) => writeln!(f, "  {} = {} <{} bytes>", key, text, value.len())?,
            None => writeln!(f, "  {} = <{} bytes>", key, value.len())?,
        }
    }
    writeln!(f, "}}")
}

/// Value as text if every byte is printable ASCII. A single trailing NUL
/// is tolerated since string xattrs are often stored terminated.
fn printable(value: &[u8]) -> Option<&str> {
    let text = value.strip_suffix(&[0]).unwrap_or(value);
    if text.is_empty() || !text.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return None;
    }
    std::str::from_utf8(text).ok()
}

/// Render one event.
pub fn dump_record(record: &DecodedRecord) -> String {
    RecordDump(record).to_string()
}

/// Render a sequence of events in order.
pub fn dump_records(records: &[DecodedRecord]) -> String {
    records.iter().map(dump_record).collect()
}
