//! Journaled filesystem operations
//!
//! [`FileOp`] is the captured argument set of one intercepted mutating
//! filesystem call. Each operation kind has a fixed, ordered field layout
//! described by [`FopKind::schema`]; [`FileOp::fields`] yields the
//! operation's values in that same order. The journal codec interprets these
//! descriptors generically, so adding a kind means adding a variant, a tag,
//! a schema row and a `fields` arm.
//!
//! Tags follow the GlusterFS fop numbering so journals stay comparable with
//! tooling that speaks that numbering.

use crate::types::{Dict, Gfid, Loc, StatAttrs};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Operation kind tag written into every event header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum FopKind {
    /// Create a special file
    Mknod = 3,
    /// Create a directory
    Mkdir = 4,
    /// Remove a file
    Unlink = 5,
    /// Remove a directory
    Rmdir = 6,
    /// Create a symbolic link
    Symlink = 7,
    /// Rename an entry
    Rename = 8,
    /// Create a hard link
    Link = 9,
    /// Truncate by path
    Truncate = 10,
    /// Write data through a handle
    Write = 13,
    /// Set extended attributes by path
    Setxattr = 17,
    /// Remove an extended attribute by path
    Removexattr = 19,
    /// Create and open a regular file
    Create = 23,
    /// Truncate through a handle
    Ftruncate = 24,
    /// Atomic extended-attribute transform by path
    Xattrop = 33,
    /// Atomic extended-attribute transform through a handle
    Fxattrop = 34,
    /// Set extended attributes through a handle
    Fsetxattr = 36,
    /// Change attributes by path
    Setattr = 38,
    /// Change attributes through a handle
    Fsetattr = 39,
    /// Remove an extended attribute through a handle
    Fremovexattr = 45,
    /// Preallocate space
    Fallocate = 46,
    /// Punch a hole
    Discard = 47,
    /// Write zeroes over a range
    Zerofill = 48,
    /// Inter-process control (control plane)
    Ipc = 49,
}

impl FopKind {
    /// Every journaled kind, in tag order
    pub const ALL: [FopKind; 23] = [
        FopKind::Mknod,
        FopKind::Mkdir,
        FopKind::Unlink,
        FopKind::Rmdir,
        FopKind::Symlink,
        FopKind::Rename,
        FopKind::Link,
        FopKind::Truncate,
        FopKind::Write,
        FopKind::Setxattr,
        FopKind::Removexattr,
        FopKind::Create,
        FopKind::Ftruncate,
        FopKind::Xattrop,
        FopKind::Fxattrop,
        FopKind::Fsetxattr,
        FopKind::Setattr,
        FopKind::Fsetattr,
        FopKind::Fremovexattr,
        FopKind::Fallocate,
        FopKind::Discard,
        FopKind::Zerofill,
        FopKind::Ipc,
    ];

    /// Numeric tag as written on disk
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a kind by its on-disk tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    /// Lowercase operation name
    pub fn name(self) -> &'static str {
        match self {
            FopKind::Mknod => "mknod",
            FopKind::Mkdir => "mkdir",
            FopKind::Unlink => "unlink",
            FopKind::Rmdir => "rmdir",
            FopKind::Symlink => "symlink",
            FopKind::Rename => "rename",
            FopKind::Link => "link",
            FopKind::Truncate => "truncate",
            FopKind::Write => "write",
            FopKind::Setxattr => "setxattr",
            FopKind::Removexattr => "removexattr",
            FopKind::Create => "create",
            FopKind::Ftruncate => "ftruncate",
            FopKind::Xattrop => "xattrop",
            FopKind::Fxattrop => "fxattrop",
            FopKind::Fsetxattr => "fsetxattr",
            FopKind::Setattr => "setattr",
            FopKind::Fsetattr => "fsetattr",
            FopKind::Fremovexattr => "fremovexattr",
            FopKind::Fallocate => "fallocate",
            FopKind::Discard => "discard",
            FopKind::Zerofill => "zerofill",
            FopKind::Ipc => "ipc",
        }
    }

    /// Ordered field layout for this kind
    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            FopKind::Mknod => MKNOD,
            FopKind::Mkdir => MKDIR,
            FopKind::Unlink | FopKind::Rmdir => LOC_FLAGS,
            FopKind::Symlink => SYMLINK,
            FopKind::Rename | FopKind::Link => TWO_LOCS,
            FopKind::Truncate => TRUNCATE,
            FopKind::Write => WRITE,
            FopKind::Setxattr => SETXATTR,
            FopKind::Removexattr => REMOVEXATTR,
            FopKind::Create => CREATE,
            FopKind::Ftruncate => FTRUNCATE,
            FopKind::Xattrop => XATTROP,
            FopKind::Fxattrop => FXATTROP,
            FopKind::Fsetxattr => FSETXATTR,
            FopKind::Setattr => SETATTR,
            FopKind::Fsetattr => FSETATTR,
            FopKind::Fremovexattr => FREMOVEXATTR,
            FopKind::Fallocate => FALLOCATE,
            FopKind::Discard | FopKind::Zerofill => FD_RANGE,
            FopKind::Ipc => IPC,
        }
    }
}

impl fmt::Display for FopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wire type of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 4-byte signed integer
    I32,
    /// 4-byte unsigned integer
    U32,
    /// 8-byte signed integer
    I64,
    /// 8-byte unsigned integer
    U64,
    /// 16-byte gfid of an open handle's inode
    Gfid,
    /// Path reference
    Loc,
    /// Presence flag plus optional NUL-terminated string
    Str,
    /// Key/value list with zero terminator
    Dict,
    /// Size prefix in metadata, bytes in the data segment
    Payload,
}

/// Named field in a kind's layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Argument name
    pub name: &'static str,
    /// Wire type
    pub ty: FieldType,
}

const fn field(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { name, ty }
}

const XDATA: FieldSpec = field("xdata", FieldType::Dict);
const LOC: FieldSpec = field("loc", FieldType::Loc);
const FD: FieldSpec = field("fd", FieldType::Gfid);
const XATTR: FieldSpec = field("xattr", FieldType::Dict);

const STAT_AND_VALID: [FieldSpec; 8] = [
    field("stat.prot", FieldType::U32),
    field("stat.uid", FieldType::U32),
    field("stat.gid", FieldType::U32),
    field("stat.atime", FieldType::I64),
    field("stat.atime_nsec", FieldType::U32),
    field("stat.mtime", FieldType::I64),
    field("stat.mtime_nsec", FieldType::U32),
    field("valid", FieldType::I32),
];

static MKNOD: &[FieldSpec] = &[
    LOC,
    field("mode", FieldType::U32),
    field("rdev", FieldType::U64),
    field("umask", FieldType::U32),
    XDATA,
];
static MKDIR: &[FieldSpec] = &[
    LOC,
    field("mode", FieldType::U32),
    field("umask", FieldType::U32),
    XDATA,
];
static LOC_FLAGS: &[FieldSpec] = &[LOC, field("flags", FieldType::I32), XDATA];
static SYMLINK: &[FieldSpec] = &[
    field("linkname", FieldType::Str),
    LOC,
    field("umask", FieldType::U32),
    XDATA,
];
static TWO_LOCS: &[FieldSpec] = &[
    field("oldloc", FieldType::Loc),
    field("newloc", FieldType::Loc),
    XDATA,
];
static TRUNCATE: &[FieldSpec] = &[LOC, field("offset", FieldType::I64), XDATA];
static WRITE: &[FieldSpec] = &[
    FD,
    field("payload", FieldType::Payload),
    field("offset", FieldType::I64),
    field("flags", FieldType::U32),
    XDATA,
];
static SETXATTR: &[FieldSpec] = &[LOC, XATTR, field("flags", FieldType::I32), XDATA];
static REMOVEXATTR: &[FieldSpec] = &[LOC, field("name", FieldType::Str), XDATA];
static CREATE: &[FieldSpec] = &[
    LOC,
    field("flags", FieldType::I32),
    field("mode", FieldType::U32),
    field("umask", FieldType::U32),
    FD,
    XDATA,
];
static FTRUNCATE: &[FieldSpec] = &[FD, field("offset", FieldType::I64), XDATA];
static XATTROP: &[FieldSpec] = &[LOC, field("optype", FieldType::I32), XATTR, XDATA];
static FXATTROP: &[FieldSpec] = &[FD, field("optype", FieldType::I32), XATTR, XDATA];
static FSETXATTR: &[FieldSpec] = &[FD, XATTR, field("flags", FieldType::I32), XDATA];
static SETATTR: &[FieldSpec] = &[
    LOC,
    STAT_AND_VALID[0],
    STAT_AND_VALID[1],
    STAT_AND_VALID[2],
    STAT_AND_VALID[3],
    STAT_AND_VALID[4],
    STAT_AND_VALID[5],
    STAT_AND_VALID[6],
    STAT_AND_VALID[7],
    XDATA,
];
static FSETATTR: &[FieldSpec] = &[
    FD,
    STAT_AND_VALID[0],
    STAT_AND_VALID[1],
    STAT_AND_VALID[2],
    STAT_AND_VALID[3],
    STAT_AND_VALID[4],
    STAT_AND_VALID[5],
    STAT_AND_VALID[6],
    STAT_AND_VALID[7],
    XDATA,
];
static FREMOVEXATTR: &[FieldSpec] = &[FD, field("name", FieldType::Str), XDATA];
static FALLOCATE: &[FieldSpec] = &[
    FD,
    field("mode", FieldType::I32),
    field("offset", FieldType::I64),
    field("size", FieldType::U64),
    XDATA,
];
static FD_RANGE: &[FieldSpec] = &[
    FD,
    field("offset", FieldType::I64),
    field("size", FieldType::U64),
    XDATA,
];
static IPC: &[FieldSpec] = &[XDATA];

/// Borrowed value of one field, in schema order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    /// 4-byte signed integer
    I32(i32),
    /// 4-byte unsigned integer
    U32(u32),
    /// 8-byte signed integer
    I64(i64),
    /// 8-byte unsigned integer
    U64(u64),
    /// Handle gfid
    Gfid(&'a Gfid),
    /// Path reference
    Loc(&'a Loc),
    /// Optional string
    Str(Option<&'a str>),
    /// Key/value list
    Dict(&'a Dict),
    /// Scatter/gather write payload
    Payload(&'a [Vec<u8>]),
}

impl FieldRef<'_> {
    /// Wire type of this value
    pub fn ty(&self) -> FieldType {
        match self {
            FieldRef::I32(_) => FieldType::I32,
            FieldRef::U32(_) => FieldType::U32,
            FieldRef::I64(_) => FieldType::I64,
            FieldRef::U64(_) => FieldType::U64,
            FieldRef::Gfid(_) => FieldType::Gfid,
            FieldRef::Loc(_) => FieldType::Loc,
            FieldRef::Str(_) => FieldType::Str,
            FieldRef::Dict(_) => FieldType::Dict,
            FieldRef::Payload(_) => FieldType::Payload,
        }
    }
}

/// Field values of one operation; most kinds fit inline
pub type Fields<'a> = SmallVec<[FieldRef<'a>; 8]>;

/// Captured arguments of one intercepted mutating operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum FileOp {
    Mknod {
        loc: Loc,
        mode: u32,
        rdev: u64,
        umask: u32,
        xdata: Dict,
    },
    Mkdir {
        loc: Loc,
        mode: u32,
        umask: u32,
        xdata: Dict,
    },
    Unlink {
        loc: Loc,
        flags: i32,
        xdata: Dict,
    },
    Rmdir {
        loc: Loc,
        flags: i32,
        xdata: Dict,
    },
    Symlink {
        linkname: Option<String>,
        loc: Loc,
        umask: u32,
        xdata: Dict,
    },
    Rename {
        oldloc: Loc,
        newloc: Loc,
        xdata: Dict,
    },
    Link {
        oldloc: Loc,
        newloc: Loc,
        xdata: Dict,
    },
    Truncate {
        loc: Loc,
        offset: i64,
        xdata: Dict,
    },
    Write {
        fd: Gfid,
        /// Scatter/gather buffers, journaled contiguously
        payload: Vec<Vec<u8>>,
        offset: i64,
        flags: u32,
        xdata: Dict,
    },
    Setxattr {
        loc: Loc,
        xattr: Dict,
        flags: i32,
        xdata: Dict,
    },
    Removexattr {
        loc: Loc,
        name: Option<String>,
        xdata: Dict,
    },
    Create {
        loc: Loc,
        flags: i32,
        mode: u32,
        umask: u32,
        fd: Gfid,
        xdata: Dict,
    },
    Ftruncate {
        fd: Gfid,
        offset: i64,
        xdata: Dict,
    },
    Xattrop {
        loc: Loc,
        optype: i32,
        xattr: Dict,
        xdata: Dict,
    },
    Fxattrop {
        fd: Gfid,
        optype: i32,
        xattr: Dict,
        xdata: Dict,
    },
    Fsetxattr {
        fd: Gfid,
        xattr: Dict,
        flags: i32,
        xdata: Dict,
    },
    Setattr {
        loc: Loc,
        stat: StatAttrs,
        valid: i32,
        xdata: Dict,
    },
    Fsetattr {
        fd: Gfid,
        stat: StatAttrs,
        valid: i32,
        xdata: Dict,
    },
    Fremovexattr {
        fd: Gfid,
        name: Option<String>,
        xdata: Dict,
    },
    Fallocate {
        fd: Gfid,
        mode: i32,
        offset: i64,
        size: u64,
        xdata: Dict,
    },
    Discard {
        fd: Gfid,
        offset: i64,
        size: u64,
        xdata: Dict,
    },
    Zerofill {
        fd: Gfid,
        offset: i64,
        size: u64,
        xdata: Dict,
    },
    /// Control-plane request; only `xdata` is journaled
    Ipc {
        op: i32,
        xdata: Dict,
    },
}

fn stat_fields<'a>(fields: &mut Fields<'a>, stat: &StatAttrs, valid: i32) {
    fields.push(FieldRef::U32(stat.prot));
    fields.push(FieldRef::U32(stat.uid));
    fields.push(FieldRef::U32(stat.gid));
    fields.push(FieldRef::I64(stat.atime));
    fields.push(FieldRef::U32(stat.atime_nsec));
    fields.push(FieldRef::I64(stat.mtime));
    fields.push(FieldRef::U32(stat.mtime_nsec));
    fields.push(FieldRef::I32(valid));
}

impl FileOp {
    /// Operation kind
    pub fn kind(&self) -> FopKind {
        match self {
            FileOp::Mknod { .. } => FopKind::Mknod,
            FileOp::Mkdir { .. } => FopKind::Mkdir,
            FileOp::Unlink { .. } => FopKind::Unlink,
            FileOp::Rmdir { .. } => FopKind::Rmdir,
            FileOp::Symlink { .. } => FopKind::Symlink,
            FileOp::Rename { .. } => FopKind::Rename,
            FileOp::Link { .. } => FopKind::Link,
            FileOp::Truncate { .. } => FopKind::Truncate,
            FileOp::Write { .. } => FopKind::Write,
            FileOp::Setxattr { .. } => FopKind::Setxattr,
            FileOp::Removexattr { .. } => FopKind::Removexattr,
            FileOp::Create { .. } => FopKind::Create,
            FileOp::Ftruncate { .. } => FopKind::Ftruncate,
            FileOp::Xattrop { .. } => FopKind::Xattrop,
            FileOp::Fxattrop { .. } => FopKind::Fxattrop,
            FileOp::Fsetxattr { .. } => FopKind::Fsetxattr,
            FileOp::Setattr { .. } => FopKind::Setattr,
            FileOp::Fsetattr { .. } => FopKind::Fsetattr,
            FileOp::Fremovexattr { .. } => FopKind::Fremovexattr,
            FileOp::Fallocate { .. } => FopKind::Fallocate,
            FileOp::Discard { .. } => FopKind::Discard,
            FileOp::Zerofill { .. } => FopKind::Zerofill,
            FileOp::Ipc { .. } => FopKind::Ipc,
        }
    }

    /// Field values in the order given by `self.kind().schema()`
    pub fn fields(&self) -> Fields<'_> {
        use FieldRef as F;

        let mut out = Fields::new();
        match self {
            FileOp::Mknod {
                loc,
                mode,
                rdev,
                umask,
                xdata,
            } => out.extend([
                F::Loc(loc),
                F::U32(*mode),
                F::U64(*rdev),
                F::U32(*umask),
                F::Dict(xdata),
            ]),
            FileOp::Mkdir {
                loc,
                mode,
                umask,
                xdata,
            } => out.extend([F::Loc(loc), F::U32(*mode), F::U32(*umask), F::Dict(xdata)]),
            FileOp::Unlink { loc, flags, xdata } | FileOp::Rmdir { loc, flags, xdata } => {
                out.extend([F::Loc(loc), F::I32(*flags), F::Dict(xdata)])
            }
            FileOp::Symlink {
                linkname,
                loc,
                umask,
                xdata,
            } => out.extend([
                F::Str(linkname.as_deref()),
                F::Loc(loc),
                F::U32(*umask),
                F::Dict(xdata),
            ]),
            FileOp::Rename {
                oldloc,
                newloc,
                xdata,
            }
            | FileOp::Link {
                oldloc,
                newloc,
                xdata,
            } => out.extend([F::Loc(oldloc), F::Loc(newloc), F::Dict(xdata)]),
            FileOp::Truncate { loc, offset, xdata } => {
                out.extend([F::Loc(loc), F::I64(*offset), F::Dict(xdata)])
            }
            FileOp::Write {
                fd,
                payload,
                offset,
                flags,
                xdata,
            } => out.extend([
                F::Gfid(fd),
                F::Payload(payload),
                F::I64(*offset),
                F::U32(*flags),
                F::Dict(xdata),
            ]),
            FileOp::Setxattr {
                loc,
                xattr,
                flags,
                xdata,
            } => out.extend([F::Loc(loc), F::Dict(xattr), F::I32(*flags), F::Dict(xdata)]),
            FileOp::Removexattr { loc, name, xdata } => {
                out.extend([F::Loc(loc), F::Str(name.as_deref()), F::Dict(xdata)])
            }
            FileOp::Create {
                loc,
                flags,
                mode,
                umask,
                fd,
                xdata,
            } => out.extend([
                F::Loc(loc),
                F::I32(*flags),
                F::U32(*mode),
                F::U32(*umask),
                F::Gfid(fd),
                F::Dict(xdata),
            ]),
            FileOp::Ftruncate { fd, offset, xdata } => {
                out.extend([F::Gfid(fd), F::I64(*offset), F::Dict(xdata)])
            }
            FileOp::Xattrop {
                loc,
                optype,
                xattr,
                xdata,
            } => out.extend([F::Loc(loc), F::I32(*optype), F::Dict(xattr), F::Dict(xdata)]),
            FileOp::Fxattrop {
                fd,
                optype,
                xattr,
                xdata,
            } => out.extend([F::Gfid(fd), F::I32(*optype), F::Dict(xattr), F::Dict(xdata)]),
            FileOp::Fsetxattr {
                fd,
                xattr,
                flags,
                xdata,
            } => out.extend([F::Gfid(fd), F::Dict(xattr), F::I32(*flags), F::Dict(xdata)]),
            FileOp::Setattr {
                loc,
                stat,
                valid,
                xdata,
            } => {
                out.push(F::Loc(loc));
                stat_fields(&mut out, stat, *valid);
                out.push(F::Dict(xdata));
            }
            FileOp::Fsetattr {
                fd,
                stat,
                valid,
                xdata,
            } => {
                out.push(F::Gfid(fd));
                stat_fields(&mut out, stat, *valid);
                out.push(F::Dict(xdata));
            }
            FileOp::Fremovexattr { fd, name, xdata } => {
                out.extend([F::Gfid(fd), F::Str(name.as_deref()), F::Dict(xdata)])
            }
            FileOp::Fallocate {
                fd,
                mode,
                offset,
                size,
                xdata,
            } => out.extend([
                F::Gfid(fd),
                F::I32(*mode),
                F::I64(*offset),
                F::U64(*size),
                F::Dict(xdata),
            ]),
            FileOp::Discard {
                fd,
                offset,
                size,
                xdata,
            }
            | FileOp::Zerofill {
                fd,
                offset,
                size,
                xdata,
            } => out.extend([F::Gfid(fd), F::I64(*offset), F::U64(*size), F::Dict(xdata)]),
            FileOp::Ipc { xdata, .. } => out.push(F::Dict(xdata)),
        }
        out
    }
}
