//! In-flight operation records.
//!
//! A record is created at the call site, measured once, queued, appended by
//! the worker exactly once, and then handed to its continuation. Records
//! that never reach disk (journal stopped) are dropped without running their
//! continuation.

use crate::codec::{self, CodecError, EncodedLen};
use fsjournal_core::{FileOp, FopKind};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Where a record landed once it is durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Term the record was written in
    pub term: u64,
    /// Offset of the event header in the metadata segment
    pub meta_offset: u64,
    /// Offset of the payload in the data segment
    pub data_offset: u64,
    /// Bytes written to each segment
    pub len: EncodedLen,
}

/// Callback resumed once the record is flushed.
pub type Continuation = Box<dyn FnOnce(Appended) + Send + 'static>;

/// A captured operation waiting to be journaled.
pub struct OperationRecord {
    op: FileOp,
    len: EncodedLen,
    continuation: Continuation,
}

impl OperationRecord {
    /// Capture `op` and measure it.
    ///
    /// Fails if the operation cannot be encoded (e.g. a name with an
    /// interior NUL).
    pub fn new(
        op: FileOp,
        on_durable: impl FnOnce(Appended) + Send + 'static,
    ) -> Result<Self, CodecError> {
        let len = codec::measure(&op)?;
        Ok(OperationRecord {
            op,
            len,
            continuation: Box::new(on_durable),
        })
    }

    /// Captured operation
    pub fn op(&self) -> &FileOp {
        &self.op
    }

    /// Operation kind
    pub fn kind(&self) -> FopKind {
        self.op.kind()
    }

    /// Encoded size computed at capture
    pub fn len(&self) -> EncodedLen {
        self.len
    }

    /// A record always encodes to at least an event header.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Override the captured size, as if the operation changed after capture.
    #[cfg(test)]
    pub(crate) fn with_len(mut self, len: EncodedLen) -> Self {
        self.len = len;
        self
    }

    /// Take the operation and continuation back out.
    pub fn into_parts(self) -> (FileOp, Continuation) {
        (self.op, self.continuation)
    }

    /// Run the continuation. A panicking continuation is logged and does
    /// not unwind into the caller.
    pub(crate) fn resume(self, appended: Appended) {
        let kind = self.op.kind();
        let continuation = self.continuation;
        if catch_unwind(AssertUnwindSafe(move || continuation(appended))).is_err() {
            error!(
                target: "fsjournal::journal",
                kind = %kind,
                term = appended.term,
                "Continuation panicked"
            );
        }
    }
}

impl fmt::Debug for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRecord")
            .field("kind", &self.op.kind())
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Why a record was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// The journal has stopped or is shutting down
    #[error("journal is stopped")]
    Stopped,

    /// The record could never fit an empty segment
    #[error("record of {} metadata / {} data bytes exceeds segment capacity", .len.meta, .len.data)]
    TooLarge {
        /// Encoded size of the record
        len: EncodedLen,
    },
}

/// A submission that was refused, handing the record back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("record rejected: {reason}")]
pub struct Rejected {
    /// Why
    pub reason: RejectReason,
    /// The record, continuation not run
    pub record: OperationRecord,
}
