//! Control-plane operations carried by `ipc` requests.
//!
//! | code | operation | behavior |
//! |------|-----------|----------|
//! | 1 | change term | request a rollover, acknowledge at once |
//! | 2 | get terms | reply with `first`/`last` as u64 dictionary entries |
//! | 3 | rollback | journal the request's xdata, acknowledge once durable |
//! | other | | not ours; forwarded unchanged |

use crate::journal::{Journal, JournalError};
use fsjournal_core::{Dict, FileOp};
use tracing::{info, warn};

/// I/O error
pub const EIO: i32 = 5;

/// Invalid argument
pub const EINVAL: i32 = 22;

/// Control sub-operation of an `ipc` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Roll over to a new term
    ChangeTerm,
    /// Report the first and current term
    GetTerms,
    /// Record a rollback notification in the journal
    Rollback,
    /// Anything else
    Other(i32),
}

impl ControlOp {
    /// Code of [`ControlOp::ChangeTerm`]
    pub const CHANGE_TERM: i32 = 1;
    /// Code of [`ControlOp::GetTerms`]
    pub const GET_TERMS: i32 = 2;
    /// Code of [`ControlOp::Rollback`]
    pub const ROLLBACK: i32 = 3;

    /// Classify an `ipc` op code
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::CHANGE_TERM => ControlOp::ChangeTerm,
            Self::GET_TERMS => ControlOp::GetTerms,
            Self::ROLLBACK => ControlOp::Rollback,
            other => ControlOp::Other(other),
        }
    }

    /// On-the-wire op code
    pub fn code(self) -> i32 {
        match self {
            ControlOp::ChangeTerm => Self::CHANGE_TERM,
            ControlOp::GetTerms => Self::GET_TERMS,
            ControlOp::Rollback => Self::ROLLBACK,
            ControlOp::Other(code) => code,
        }
    }
}

/// Result returned to the caller of an `ipc` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcReply {
    /// 0 on success, -1 on failure
    pub op_ret: i32,
    /// errno on failure
    pub op_errno: i32,
    /// Result dictionary, if the operation produces one
    pub xdata: Option<Dict>,
}

impl IpcReply {
    /// Success with no result
    pub fn ok() -> Self {
        IpcReply {
            op_ret: 0,
            op_errno: 0,
            xdata: None,
        }
    }

    /// Failure with `errno`
    pub fn failed(errno: i32) -> Self {
        IpcReply {
            op_ret: -1,
            op_errno: errno,
            xdata: None,
        }
    }

    /// Whether the operation succeeded
    pub fn is_ok(&self) -> bool {
        self.op_ret == 0
    }
}

/// How an `ipc` request was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcOutcome {
    /// Answered immediately
    Reply(IpcReply),
    /// Queued; the reply arrives through the callback once durable
    Journaled,
    /// Not a journal operation; pass to the next stage unchanged
    Forward {
        /// Original op code
        op: i32,
        /// Original extra data
        xdata: Dict,
    },
}

impl Journal {
    /// Handle an `ipc` request.
    ///
    /// `on_durable` is only called for rollback requests that were queued,
    /// after the record is on disk. Every other path answers through the
    /// returned [`IpcOutcome`].
    pub fn ipc(
        &self,
        op: i32,
        xdata: Dict,
        on_durable: impl FnOnce(IpcReply) + Send + 'static,
    ) -> IpcOutcome {
        match ControlOp::from_code(op) {
            ControlOp::ChangeTerm => {
                info!(target: "fsjournal::journal", "got CHANGE_TERM op");
                match self.request_rollover() {
                    Ok(()) => IpcOutcome::Reply(IpcReply::ok()),
                    Err(e) => {
                        warn!(target: "fsjournal::journal", error = %e, "CHANGE_TERM failed");
                        IpcOutcome::Reply(IpcReply::failed(EIO))
                    }
                }
            }
            ControlOp::GetTerms => {
                info!(target: "fsjournal::journal", "got GET_TERMS op");
                match self.terms() {
                    Ok(range) => {
                        let mut result = Dict::new();
                        result.set_u64("first", range.first);
                        result.set_u64("last", range.last);
                        IpcOutcome::Reply(IpcReply {
                            op_ret: 0,
                            op_errno: 0,
                            xdata: Some(result),
                        })
                    }
                    Err(e) => {
                        warn!(target: "fsjournal::journal", error = %e, "GET_TERMS failed");
                        IpcOutcome::Reply(IpcReply::failed(EIO))
                    }
                }
            }
            ControlOp::Rollback => {
                let submitted = self.submit_op(FileOp::Ipc { op, xdata }, move |_| {
                    on_durable(IpcReply::ok())
                });
                match submitted {
                    Ok(()) => IpcOutcome::Journaled,
                    Err(e) => {
                        warn!(
                            target: "fsjournal::journal",
                            error = %e,
                            "Failed to journal rollback"
                        );
                        IpcOutcome::Reply(IpcReply::failed(errno_for(&e)))
                    }
                }
            }
            ControlOp::Other(op) => IpcOutcome::Forward { op, xdata },
        }
    }
}

fn errno_for(e: &JournalError) -> i32 {
    match e {
        JournalError::Codec(_) => EINVAL,
        _ => EIO,
    }
}
