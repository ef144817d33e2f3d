//! Error types shared across fsjournal crates
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::fop::FopKind;
use thiserror::Error;

/// Errors describing malformed operations or journal data
#[derive(Debug, Error)]
pub enum Error {
    /// A string argument contains an interior NUL and cannot be journaled
    #[error("{kind}: field '{field}' contains an interior NUL byte")]
    InteriorNul {
        /// Operation kind being encoded
        kind: FopKind,
        /// Field that carried the bad string
        field: &'static str,
    },

    /// Unknown operation tag found in journal data
    #[error("Unknown operation tag: {0}")]
    UnknownFop(u32),
}
