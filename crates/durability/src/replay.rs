//! Replay: turn journaled events back into operations.
//!
//! [`DecodedRecord::to_op`] rebuilds the [`FileOp`] a record was captured
//! from by walking its fields in layout order. [`replay`] drives that over a
//! whole term and hands each operation to a caller-supplied applier, which
//! owns the actual filesystem client.
//!
//! Two things do not survive the trip exactly:
//! - write payloads come back as one contiguous buffer
//! - only rollback `ipc` requests are journaled and their op code is not
//!   stored, so every `ipc` record replays as a rollback

use crate::codec::{decode, CodecError, DecodedField, DecodedRecord, FieldValue};
use crate::control::ControlOp;
use crate::reader::{JournalReader, ReadError};
use fsjournal_core::{Dict, FileOp, FopKind, Gfid, Loc, StatAttrs};
use std::fmt;
use tracing::{debug, info};

/// Errors from replaying a term
#[derive(Debug, thiserror::Error)]
pub enum ReplayError<E: fmt::Debug + fmt::Display> {
    /// Segments could not be read or an event did not decode
    #[error("failed to read term {term}: {source}")]
    Read {
        /// Term being replayed
        term: u64,
        /// Read failure
        #[source]
        source: ReadError,
    },

    /// An event decoded but does not form a valid operation
    #[error("event {index} of term {term}: {source}")]
    Rebuild {
        /// Term being replayed
        term: u64,
        /// Position of the event within the term
        index: usize,
        /// What did not match the layout
        #[source]
        source: CodecError,
    },

    /// The applier refused an operation; later events were not replayed
    #[error("applying {kind} (event {index} of term {term}) failed: {error}")]
    Apply {
        /// Term being replayed
        term: u64,
        /// Position of the event within the term
        index: usize,
        /// Operation kind
        kind: FopKind,
        /// Applier's error
        error: E,
    },
}

/// Typed walk over a record's fields in layout order.
struct Fields<'a> {
    kind: FopKind,
    iter: std::slice::Iter<'a, DecodedField>,
}

impl<'a> Fields<'a> {
    fn new(record: &'a DecodedRecord) -> Self {
        Fields {
            kind: record.kind,
            iter: record.fields.iter(),
        }
    }

    fn take(&mut self) -> Result<&'a DecodedField, CodecError> {
        self.iter
            .next()
            .ok_or_else(|| CodecError::Format(format!("{} event is missing fields", self.kind)))
    }

    fn mismatch(&self, field: &DecodedField, expected: &str) -> CodecError {
        CodecError::Format(format!(
            "{} field '{}' is not {}",
            self.kind, field.name, expected
        ))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        let field = self.take()?;
        match field.value {
            FieldValue::I32(v) => Ok(v),
            _ => Err(self.mismatch(field, "i32")),
        }
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let field = self.take()?;
        match field.value {
            FieldValue::U32(v) => Ok(v),
            _ => Err(self.mismatch(field, "u32")),
        }
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        let field = self.take()?;
        match field.value {
            FieldValue::I64(v) => Ok(v),
            _ => Err(self.mismatch(field, "i64")),
        }
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let field = self.take()?;
        match field.value {
            FieldValue::U64(v) => Ok(v),
            _ => Err(self.mismatch(field, "u64")),
        }
    }

    fn gfid(&mut self) -> Result<Gfid, CodecError> {
        let field = self.take()?;
        match field.value {
            FieldValue::Gfid(g) => Ok(g),
            _ => Err(self.mismatch(field, "a gfid")),
        }
    }

    fn loc(&mut self) -> Result<Loc, CodecError> {
        let field = self.take()?;
        match &field.value {
            FieldValue::Loc(loc) => Ok(loc.clone()),
            _ => Err(self.mismatch(field, "a loc")),
        }
    }

    fn str(&mut self) -> Result<Option<String>, CodecError> {
        let field = self.take()?;
        match &field.value {
            FieldValue::Str(s) => Ok(s.clone()),
            _ => Err(self.mismatch(field, "a string")),
        }
    }

    fn dict(&mut self) -> Result<Dict, CodecError> {
        let field = self.take()?;
        match &field.value {
            FieldValue::Dict(d) => Ok(d.clone()),
            _ => Err(self.mismatch(field, "a dict")),
        }
    }

    fn payload(&mut self) -> Result<Vec<Vec<u8>>, CodecError> {
        let field = self.take()?;
        match &field.value {
            FieldValue::Payload(bytes) if bytes.is_empty() => Ok(Vec::new()),
            FieldValue::Payload(bytes) => Ok(vec![bytes.clone()]),
            _ => Err(self.mismatch(field, "a payload")),
        }
    }

    fn stat(&mut self) -> Result<(StatAttrs, i32), CodecError> {
        let stat = StatAttrs {
            prot: self.u32()?,
            uid: self.u32()?,
            gid: self.u32()?,
            atime: self.i64()?,
            atime_nsec: self.u32()?,
            mtime: self.i64()?,
            mtime_nsec: self.u32()?,
        };
        Ok((stat, self.i32()?))
    }

    fn finish(mut self, op: FileOp) -> Result<FileOp, CodecError> {
        match self.iter.next() {
            None => Ok(op),
            Some(extra) => Err(CodecError::Format(format!(
                "{} event has unexpected field '{}'",
                self.kind, extra.name
            ))),
        }
    }
}

impl DecodedRecord {
    /// Rebuild the operation this event was captured from.
    pub fn to_op(&self) -> Result<FileOp, CodecError> {
        let mut f = Fields::new(self);
        // Struct fields are listed in layout order; they are read in that order
        let op = match self.kind {
            FopKind::Mknod => FileOp::Mknod {
                loc: f.loc()?,
                mode: f.u32()?,
                rdev: f.u64()?,
                umask: f.u32()?,
                xdata: f.dict()?,
            },
            FopKind::Mkdir => FileOp::Mkdir {
                loc: f.loc()?,
                mode: f.u32()?,
                umask: f.u32()?,
                xdata: f.dict()?,
            },
            FopKind::Unlink => FileOp::Unlink {
                loc: f.loc()?,
                flags: f.i32()?,
                xdata: f.dict()?,
            },
            FopKind::Rmdir => FileOp::Rmdir {
                loc: f.loc()?,
                flags: f.i32()?,
                xdata: f.dict()?,
            },
            FopKind::Symlink => FileOp::Symlink {
                linkname: f.str()?,
                loc: f.loc()?,
                umask: f.u32()?,
                xdata: f.dict()?,
            },
            FopKind::Rename => FileOp::Rename {
                oldloc: f.loc()?,
                newloc: f.loc()?,
                xdata: f.dict()?,
            },
            FopKind::Link => FileOp::Link {
                oldloc: f.loc()?,
                newloc: f.loc()?,
                xdata: f.dict()?,
            },
            FopKind::Truncate => FileOp::Truncate {
                loc: f.loc()?,
                offset: f.i64()?,
                xdata: f.dict()?,
            },
            FopKind::Write => FileOp::Write {
                fd: f.gfid()?,
                payload: f.payload()?,
                offset: f.i64()?,
                flags: f.u32()?,
                xdata: f.dict()?,
            },
            FopKind::Setxattr => FileOp::Setxattr {
                loc: f.loc()?,
                xattr: f.dict()?,
                flags: f.i32()?,
                xdata: f.dict()?,
            },
            FopKind::Removexattr => FileOp::Removexattr {
                loc: f.loc()?,
                name: f.str()?,
                xdata: f.dict()?,
            },
            FopKind::Create => FileOp::Create {
                loc: f.loc()?,
                flags: f.i32()?,
                mode: f.u32()?,
                umask: f.u32()?,
                fd: f.gfid()?,
                xdata: f.dict()?,
            },
            FopKind::Ftruncate => FileOp::Ftruncate {
                fd: f.gfid()?,
                offset: f.i64()?,
                xdata: f.dict()?,
            },
            FopKind::Xattrop => FileOp::Xattrop {
                loc: f.loc()?,
                optype: f.i32()?,
                xattr: f.dict()?,
                xdata: f.dict()?,
            },
            FopKind::Fxattrop => FileOp::Fxattrop {
                fd: f.gfid()?,
                optype: f.i32()?,
                xattr: f.dict()?,
                xdata: f.dict()?,
            },
            FopKind::Fsetxattr => FileOp::Fsetxattr {
                fd: f.gfid()?,
                xattr: f.dict()?,
                flags: f.i32()?,
                xdata: f.dict()?,
            },
            FopKind::Setattr => {
                let loc = f.loc()?;
                let (stat, valid) = f.stat()?;
                FileOp::Setattr {
                    loc,
                    stat,
                    valid,
                    xdata: f.dict()?,
                }
            }
            FopKind::Fsetattr => {
                let fd = f.gfid()?;
                let (stat, valid) = f.stat()?;
                FileOp::Fsetattr {
                    fd,
                    stat,
                    valid,
                    xdata: f.dict()?,
                }
            }
            FopKind::Fremovexattr => FileOp::Fremovexattr {
                fd: f.gfid()?,
                name: f.str()?,
                xdata: f.dict()?,
            },
            FopKind::Fallocate => FileOp::Fallocate {
                fd: f.gfid()?,
                mode: f.i32()?,
                offset: f.i64()?,
                size: f.u64()?,
                xdata: f.dict()?,
            },
            FopKind::Discard => FileOp::Discard {
                fd: f.gfid()?,
                offset: f.i64()?,
                size: f.u64()?,
                xdata: f.dict()?,
            },
            FopKind::Zerofill => FileOp::Zerofill {
                fd: f.gfid()?,
                offset: f.i64()?,
                size: f.u64()?,
                xdata: f.dict()?,
            },
            FopKind::Ipc => FileOp::Ipc {
                op: ControlOp::ROLLBACK,
                xdata: f.dict()?,
            },
        };
        f.finish(op)
    }
}

/// Decode one event and rebuild its operation.
pub fn decode_op(meta: &[u8], data: &[u8]) -> Result<FileOp, CodecError> {
    decode(meta, data)?.to_op()
}

/// Replay already-decoded records in order. Returns how many were applied.
///
/// Every record is rebuilt before the first one is applied, so a malformed
/// event stops the replay before anything was executed.
pub fn replay_records<E, F>(
    term: u64,
    records: &[DecodedRecord],
    mut apply: F,
) -> Result<usize, ReplayError<E>>
where
    E: fmt::Debug + fmt::Display,
    F: FnMut(FileOp) -> Result<(), E>,
{
    let ops = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            record
                .to_op()
                .map_err(|source| ReplayError::Rebuild { term, index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (index, op) in ops.into_iter().enumerate() {
        let kind = op.kind();
        debug!(target: "fsjournal::journal", term, index, kind = %kind, "Replaying event");
        apply(op).map_err(|error| ReplayError::Apply {
            term,
            index,
            kind,
            error,
        })?;
    }
    Ok(records.len())
}

/// Replay every event of `term`, oldest first.
///
/// `apply` executes one operation against the filesystem; the first error
/// it returns stops the replay.
pub fn replay<E, F>(reader: &JournalReader, term: u64, apply: F) -> Result<usize, ReplayError<E>>
where
    E: fmt::Debug + fmt::Display,
    F: FnMut(FileOp) -> Result<(), E>,
{
    let records = reader
        .read_term(term)
        .map_err(|source| ReplayError::Read { term, source })?;
    let applied = replay_records(term, &records, apply)?;
    info!(target: "fsjournal::journal", term, applied, "Replayed term");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::reader::read_segments;

    fn setattr() -> FileOp {
        FileOp::Setattr {
            loc: Loc::named(Gfid::new(), "a"),
            stat: StatAttrs {
                prot: 0o640,
                uid: 7,
                gid: 8,
                atime: 100,
                atime_nsec: 1,
                mtime: 200,
                mtime_nsec: 2,
            },
            valid: 0x30,
            xdata: Dict::new().with("k", "v"),
        }
    }

    #[test]
    fn test_decode_op_rebuilds_operation() {
        let op = setattr();
        let (meta, data) = encode(&op).unwrap();
        assert_eq!(decode_op(&meta, &data).unwrap(), op);
    }

    #[test]
    fn test_write_payload_comes_back_contiguous() {
        let fd = Gfid::new();
        let op = FileOp::Write {
            fd,
            payload: vec![b"ab".to_vec(), b"cd".to_vec()],
            offset: 9,
            flags: 1,
            xdata: Dict::new(),
        };
        let (meta, data) = encode(&op).unwrap();
        assert_eq!(
            decode_op(&meta, &data).unwrap(),
            FileOp::Write {
                fd,
                payload: vec![b"abcd".to_vec()],
                offset: 9,
                flags: 1,
                xdata: Dict::new(),
            }
        );
    }

    #[test]
    fn test_ipc_replays_as_rollback() {
        let xdata = Dict::new().with("gen", "3");
        let op = FileOp::Ipc {
            op: ControlOp::ROLLBACK,
            xdata: xdata.clone(),
        };
        let (meta, data) = encode(&op).unwrap();
        assert_eq!(decode_op(&meta, &data).unwrap(), op);
    }

    #[test]
    fn test_field_type_mismatch() {
        let (meta, data) = encode(&setattr()).unwrap();
        let mut record = decode(&meta, &data).unwrap();
        record.fields[1].value = FieldValue::I64(1);
        let err = record.to_op().unwrap_err();
        assert!(err.to_string().contains("stat.prot"));

        record.fields.truncate(3);
        assert!(matches!(record.to_op(), Err(CodecError::Format(_))));
    }

    #[test]
    fn test_replay_applies_in_order() {
        let ops = vec![
            FileOp::Mkdir {
                loc: Loc::named(Gfid::new(), "d"),
                mode: 0o755,
                umask: 0o022,
                xdata: Dict::new(),
            },
            setattr(),
            FileOp::Ftruncate {
                fd: Gfid::new(),
                offset: 0,
                xdata: Dict::new(),
            },
        ];
        let mut meta = Vec::new();
        let mut data = Vec::new();
        for op in &ops {
            let (m, d) = encode(op).unwrap();
            meta.extend(m);
            data.extend(d);
        }
        let records = read_segments(&meta, &data).unwrap();

        let mut applied = Vec::new();
        let count = replay_records::<String, _>(1, &records, |op| {
            applied.push(op);
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 3);
        assert_eq!(applied, ops);
    }

    #[test]
    fn test_replay_stops_at_first_failure() {
        let ops: Vec<FileOp> = (0..3)
            .map(|offset| FileOp::Ftruncate {
                fd: Gfid::new(),
                offset,
                xdata: Dict::new(),
            })
            .collect();
        let mut meta = Vec::new();
        for op in &ops {
            meta.extend(encode(op).unwrap().0);
        }
        let records = read_segments(&meta, &[]).unwrap();

        let mut seen = 0;
        let err = replay_records(4, &records, |_| {
            seen += 1;
            if seen == 2 {
                Err("ENOENT")
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(seen, 2);
        assert!(matches!(
            err,
            ReplayError::Apply {
                term: 4,
                index: 1,
                kind: FopKind::Ftruncate,
                error: "ENOENT",
            }
        ));
    }

    #[test]
    fn test_malformed_record_applies_nothing() {
        let (meta, data) = encode(&setattr()).unwrap();
        let mut records = read_segments(&meta, &data).unwrap();
        records.insert(0, records[0].clone());
        records[1].fields.pop();

        let mut seen = 0;
        let err = replay_records::<String, _>(2, &records, |_| {
            seen += 1;
            Ok(())
        })
        .unwrap_err();
        assert_eq!(seen, 0);
        assert!(matches!(err, ReplayError::Rebuild { index: 1, .. }));
    }
}
