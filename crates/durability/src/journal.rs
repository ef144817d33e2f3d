//! Journal handle.
//!
//! [`Journal`] is the interception-side API: call sites capture an
//! operation, submit it, and get their continuation resumed on the worker
//! thread once the record is on stable storage. The handle is `Sync`;
//! share it behind an `Arc` between request threads.
//!
//! # Example
//!
//! ```no_run
//! use fsjournal_durability::{Journal, JournalConfig};
//! use fsjournal_core::{Dict, FileOp, Gfid, Loc};
//!
//! let journal = Journal::start(JournalConfig::new().with_log_dir("/var/lib/fdl"))?;
//! let op = FileOp::Unlink {
//!     loc: Loc::named(Gfid::new(), "stale.tmp"),
//!     flags: 0,
//!     xdata: Dict::new(),
//! };
//! journal.submit_op(op, |appended| {
//!     // durable: continue the unlink down the stack
//!     let _ = appended.term;
//! })?;
//! journal.shutdown();
//! # Ok::<(), fsjournal_durability::JournalError>(())
//! ```

use crate::codec::CodecError;
use crate::config::{ConfigError, JournalConfig};
use crate::queue::RequestQueue;
use crate::record::{Appended, OperationRecord, RejectReason, Rejected};
use crate::worker::{self, WorkerState};
use fsjournal_core::{FileOp, TermRange};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Errors from the journal handle
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Log directory could not be created
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        /// Directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Worker thread could not be spawned
    #[error("failed to spawn durability worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker has stopped; nothing more can be journaled
    #[error("journal is stopped")]
    Stopped,

    /// The operation cannot be encoded
    #[error("cannot encode operation: {0}")]
    Codec(#[from] CodecError),

    /// The record was refused
    #[error("submission rejected: {0}")]
    Rejected(RejectReason),
}

impl From<Rejected> for JournalError {
    fn from(rejected: Rejected) -> Self {
        match rejected.reason {
            RejectReason::Stopped => JournalError::Stopped,
            reason => JournalError::Rejected(reason),
        }
    }
}

/// Handle to a running journal
pub struct Journal {
    config: JournalConfig,
    queue: Arc<RequestQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Journal {
    /// Validate `config`, create the log directory and start the worker.
    ///
    /// Returns once the worker has opened its first term or failed to.
    /// If opening the first term fails the journal is returned already
    /// stopped: submissions are rejected and [`Journal::state`] reports
    /// [`WorkerState::Stopped`].
    pub fn start(config: JournalConfig) -> Result<Self, JournalError> {
        config.validate()?;
        config
            .paths()
            .create_dir()
            .map_err(|source| JournalError::CreateDir {
                path: config.log_dir.clone(),
                source,
            })?;

        let queue = Arc::new(RequestQueue::new());
        let handle =
            worker::spawn(Arc::clone(&queue), config.clone()).map_err(JournalError::Spawn)?;

        match queue.wait_started() {
            WorkerState::Running => info!(
                target: "fsjournal::journal",
                dir = %config.log_dir.display(),
                ident = %config.ident,
                meta_capacity = config.meta_capacity,
                data_capacity = config.data_capacity,
                "Journal started"
            ),
            state => warn!(
                target: "fsjournal::journal",
                dir = %config.log_dir.display(),
                state = %state,
                "Journal unavailable after startup"
            ),
        }

        Ok(Journal {
            config,
            queue,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queue a captured record. Never blocks on I/O.
    ///
    /// The record is handed back if the journal has stopped, or if it is
    /// larger than an empty segment.
    pub fn submit(&self, record: OperationRecord) -> Result<(), Rejected> {
        let len = record.len();
        if len.meta > self.config.meta_capacity || len.data > self.config.data_capacity {
            return Err(Rejected {
                reason: RejectReason::TooLarge { len },
                record,
            });
        }
        self.queue.enqueue(record)
    }

    /// Capture `op` and queue it; `on_durable` runs once it is on disk.
    pub fn submit_op(
        &self,
        op: FileOp,
        on_durable: impl FnOnce(Appended) + Send + 'static,
    ) -> Result<(), JournalError> {
        let record = OperationRecord::new(op, on_durable)?;
        self.submit(record)?;
        Ok(())
    }

    /// Journal `op` and block until it is durable.
    ///
    /// Returns [`JournalError::Stopped`] if the journal stops before the
    /// record is written.
    pub fn submit_and_wait(&self, op: FileOp) -> Result<Appended, JournalError> {
        let (tx, rx) = mpsc::channel();
        self.submit_op(op, move |appended| {
            let _ = tx.send(appended);
        })?;
        rx.recv().map_err(|_| JournalError::Stopped)
    }

    /// Ask the worker to start a new term. Returns without waiting for it.
    pub fn request_rollover(&self) -> Result<(), JournalError> {
        if self.queue.request_rollover() {
            Ok(())
        } else {
            Err(JournalError::Stopped)
        }
    }

    /// First term of this run and the active term.
    ///
    /// Reads the range the worker last published without waiting on it, so
    /// it is safe to call from a continuation. A rollover that was requested
    /// but not yet performed is not reflected.
    pub fn terms(&self) -> Result<TermRange, JournalError> {
        self.queue.terms().ok_or(JournalError::Stopped)
    }

    /// Current worker state
    pub fn state(&self) -> WorkerState {
        self.queue.state()
    }

    /// Records queued but not yet written
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Configuration the journal was started with
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Validate a new configuration.
    ///
    /// A running journal keeps its directory, ident and capacities; changes
    /// take effect the next time a journal is started with them.
    pub fn reconfigure(&self, new: &JournalConfig) -> Result<(), ConfigError> {
        new.validate()?;
        if *new != self.config {
            info!(
                target: "fsjournal::journal",
                old_dir = %self.config.log_dir.display(),
                new_dir = %new.log_dir.display(),
                "Reconfiguration accepted; applies on next start"
            );
        }
        Ok(())
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// The record being written finishes; records still queued are
    /// discarded without resuming them. Idempotent.
    ///
    /// Called from a continuation (on the worker thread itself) it only
    /// flags the shutdown; the worker stops once the continuation returns.
    pub fn shutdown(&self) {
        self.queue.request_shutdown();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!(
                    target: "fsjournal::journal",
                    "Shutdown requested from the worker thread, not joining"
                );
                return;
            }
            if handle.join().is_err() {
                error!(target: "fsjournal::journal", "Durability worker panicked");
            }
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsjournal_core::{Dict, Gfid, Loc};
    use tempfile::tempdir;

    fn mkdir(name: &str) -> FileOp {
        FileOp::Mkdir {
            loc: Loc::named(Gfid::new(), name),
            mode: 0o755,
            umask: 0o022,
            xdata: Dict::new(),
        }
    }

    fn start(dir: &std::path::Path) -> Journal {
        Journal::start(JournalConfig::for_testing().with_log_dir(dir)).unwrap()
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let config = JournalConfig::for_testing().with_ident("");
        assert!(matches!(Journal::start(config), Err(JournalError::Config(_))));
    }

    #[test]
    fn test_start_creates_log_dir() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("fdl");
        let journal = Journal::start(JournalConfig::for_testing().with_log_dir(&log_dir)).unwrap();
        assert!(log_dir.is_dir());
        assert_eq!(journal.state(), WorkerState::Running);
        assert_eq!(journal.terms().unwrap(), TermRange { first: 1, last: 1 });
    }

    #[test]
    fn test_submit_and_wait() {
        let dir = tempdir().unwrap();
        let journal = start(dir.path());
        let first = journal.submit_and_wait(mkdir("a")).unwrap();
        let second = journal.submit_and_wait(mkdir("b")).unwrap();
        assert_eq!(first.meta_offset, 0);
        assert_eq!(second.meta_offset, first.len.meta as u64);
        assert_eq!(journal.pending(), 0);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let dir = tempdir().unwrap();
        let journal = start(dir.path());
        journal.shutdown();
        assert_eq!(journal.state(), WorkerState::Stopped);
        assert!(matches!(journal.submit_op(mkdir("x"), |_| {}), Err(JournalError::Stopped)));
        assert!(matches!(journal.terms(), Err(JournalError::Stopped)));
        assert!(matches!(journal.request_rollover(), Err(JournalError::Stopped)));
        // Second shutdown is a no-op
        journal.shutdown();
    }

    #[test]
    fn test_too_large_record_is_rejected() {
        let dir = tempdir().unwrap();
        let config = JournalConfig::for_testing()
            .with_log_dir(dir.path())
            .with_data_capacity(4096);
        let journal = Journal::start(config).unwrap();
        let op = FileOp::Write {
            fd: Gfid::new(),
            payload: vec![vec![0u8; 4097]],
            offset: 0,
            flags: 0,
            xdata: Dict::new(),
        };
        let record = OperationRecord::new(op, |_| {}).unwrap();
        let rejected = journal.submit(record).unwrap_err();
        assert!(matches!(rejected.reason, RejectReason::TooLarge { .. }));
        assert_eq!(rejected.record.kind(), fsjournal_core::FopKind::Write);
    }

    #[test]
    fn test_reconfigure_validates_only() {
        let dir = tempdir().unwrap();
        let journal = start(dir.path());
        let other = JournalConfig::for_testing().with_log_dir(dir.path().join("elsewhere"));
        journal.reconfigure(&other).unwrap();
        assert_eq!(journal.config().log_dir, dir.path());
        assert!(journal
            .reconfigure(&JournalConfig::new().with_meta_capacity(1))
            .is_err());
    }
}
