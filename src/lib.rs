//! fsjournal - write-ahead journal for mutating filesystem operations
//!
//! Intercepted operations (create, write, setxattr, ...) are captured with
//! their arguments, queued, and appended by a single worker thread to a pair
//! of memory-mapped segment files per term: one for metadata, one for write
//! payloads. A caller's continuation runs only after its record is flushed.
//!
//! # Quick Start
//!
//! ```ignore
//! use fsjournal::{Dict, FileOp, Gfid, Journal, JournalConfig, Loc};
//!
//! let journal = Journal::start(JournalConfig::new().with_log_dir("/var/lib/fdl"))?;
//! let appended = journal.submit_and_wait(FileOp::Mkdir {
//!     loc: Loc::named(Gfid::new(), "logs"),
//!     mode: 0o755,
//!     umask: 0o022,
//!     xdata: Dict::new(),
//! })?;
//! println!("journaled in term {}", appended.term);
//! ```
//!
//! # Architecture
//!
//! - `fsjournal_core`: operation kinds, captured arguments, field layouts
//! - `fsjournal_durability`: encoding, segments, terms, queue, worker, reader

pub use fsjournal_core::*;
pub use fsjournal_durability::*;
