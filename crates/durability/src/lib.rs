//! Durability layer for fsjournal
//!
//! This crate handles everything that touches disk:
//!
//! - Event codec: per-operation metadata/data encoding with exact length pass
//! - Segment store: append-only memory-mapped log objects (meta and data)
//! - Terms: numbered segment pairs, rollover and the persistent term sidecar
//! - Request queue and the single durability worker that drains it
//! - Journal handle: submission, control-plane operations, shutdown
//! - Reader and dump: decode journals back into typed records
//! - Replay: rebuild operations from a term and hand them to an applier

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec; // Measure / serialize / decode of operation records
pub mod config; // JournalConfig builder and validation
pub mod control; // ipc sub-operations (change term, get terms, rollback)
pub mod dump; // Human-readable rendering of decoded records
pub mod format; // Event header, byte cursors, key/value lists
pub mod journal; // Journal handle (submit, terms, shutdown)
pub mod paths; // On-disk naming of segments and the term sidecar
pub mod queue; // Request FIFO shared by producers and the worker
pub mod reader; // Sequential decoding of on-disk segment pairs
pub mod record; // In-flight operation records and continuations
pub mod replay; // Rebuild and re-apply journaled operations
pub mod segment; // Memory-mapped append-only log objects
pub mod term; // Term manager and sidecar
pub mod worker; // Durability worker thread

// === Re-exports ===

pub use codec::{
    decode, encode, measure, serialize, CodecError, DecodedField, DecodedRecord, EncodedLen,
    FieldValue,
};
pub use config::{ConfigError, JournalConfig};
pub use control::{ControlOp, IpcOutcome, IpcReply};
pub use dump::{dump_record, dump_records, RecordDump};
pub use format::{EventHeader, EventKind, EVENT_HEADER_SIZE, PAGE_SIZE};
pub use journal::{Journal, JournalError};
pub use paths::JournalPaths;
pub use queue::RequestQueue;
pub use reader::{read_segments, JournalReader, ReadError};
pub use record::{Appended, Continuation, OperationRecord, RejectReason, Rejected};
pub use replay::{decode_op, replay, replay_records, ReplayError};
pub use segment::{LogSegment, SegmentError, SegmentKind};
pub use term::{TermError, TermFile, TermManager};
pub use worker::WorkerState;
