//! Core types for fsjournal
//!
//! This crate defines the foundational types used throughout the system:
//! - Gfid / Loc: identity of filesystem entries
//! - Dict: ordered key/value dictionaries (xattrs, request extras)
//! - StatAttrs: attribute subset journaled by setattr
//! - FopKind / FileOp: journaled operation kinds and their captured arguments
//! - FieldSpec / FieldRef: declarative per-kind field layouts
//! - Error: shared error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fop;
pub mod types;

pub use error::Error;
pub use fop::{FieldRef, FieldSpec, FieldType, Fields, FileOp, FopKind};
pub use types::{Dict, Gfid, Loc, StatAttrs, TermRange};
