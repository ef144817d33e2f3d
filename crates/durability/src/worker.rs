//! The durability worker.
//!
//! A single named thread owns the term manager and both segments. It drains
//! the request queue one event at a time:
//!
//! ```text
//! Starting -> Running <-> RollingOver
//!                |
//!                v
//!            Stopping -> Stopped
//! ```
//!
//! For each record it rolls over if either segment lacks room, serializes
//! at the current offsets, flushes the touched pages, advances both offsets
//! and only then resumes the record's continuation. Records therefore become
//! durable, and are resumed, in enqueue order.

use crate::codec;
use crate::config::JournalConfig;
use crate::queue::{Event, RequestQueue};
use crate::record::{Appended, OperationRecord};
use crate::term::{TermError, TermManager};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Thread name of the durability worker
pub const WORKER_THREAD_NAME: &str = "fdl-worker";

/// Lifecycle of the durability worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerState {
    /// Opening the first term
    Starting,
    /// Appending records
    Running,
    /// Closing one term and opening the next
    RollingOver,
    /// Closing segments and discarding queued work
    Stopping,
    /// Gone; the journal accepts nothing
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::RollingOver => "rolling-over",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Spawn the worker thread.
pub(crate) fn spawn(
    queue: Arc<RequestQueue>,
    config: JournalConfig,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run(&queue, &config))
}

/// Moves the queue to `Stopped` on every exit path, including a panic
/// inside the loop, so waiting callers are always released.
struct StopGuard<'a> {
    queue: &'a RequestQueue,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.queue.set_state(WorkerState::Stopping);
        let discarded = self.queue.close_and_drain();
        if !discarded.is_empty() {
            warn!(
                target: "fsjournal::journal",
                count = discarded.len(),
                "Discarding queued records at shutdown"
            );
        }
        drop(discarded);
        self.queue.set_state(WorkerState::Stopped);
        info!(target: "fsjournal::journal", "Durability worker stopped");
    }
}

fn run(queue: &RequestQueue, config: &JournalConfig) {
    let _guard = StopGuard { queue };

    let opened = TermManager::open(config.paths(), config.meta_capacity, config.data_capacity);
    let mut terms = match opened {
        Ok(terms) => terms,
        Err(e) => {
            error!(
                target: "fsjournal::journal",
                dir = %config.log_dir.display(),
                error = %e,
                "Failed to open initial term"
            );
            return;
        }
    };
    queue.publish_terms(terms.range());
    queue.set_state(WorkerState::Running);

    loop {
        match queue.next_event() {
            Event::Shutdown => {
                debug!(target: "fsjournal::journal", "Shutdown requested");
                break;
            }
            Event::Rollover => {
                if let Err(e) = rollover(queue, &mut terms) {
                    error!(
                        target: "fsjournal::journal",
                        error = %e,
                        "Requested rollover failed"
                    );
                    break;
                }
            }
            Event::Record(record) => {
                if let Err(e) = append(queue, &mut terms, record) {
                    error!(
                        target: "fsjournal::journal",
                        error = %e,
                        "Append failed, stopping journal"
                    );
                    break;
                }
            }
        }
    }

    queue.set_state(WorkerState::Stopping);
    terms.close();
}

fn rollover(queue: &RequestQueue, terms: &mut TermManager) -> Result<u64, TermError> {
    queue.set_state(WorkerState::RollingOver);
    let term = terms.rollover()?;
    queue.publish_terms(terms.range());
    queue.set_state(WorkerState::Running);
    Ok(term)
}

/// Write one record and resume it.
///
/// Only term failures are returned; a record that cannot be encoded is
/// logged and dropped without resuming it, and whatever it left in the
/// reserved region is zeroed.
fn append(
    queue: &RequestQueue,
    terms: &mut TermManager,
    record: OperationRecord,
) -> Result<(), TermError> {
    let len = record.len();
    if !terms.fits_empty(len) {
        error!(
            target: "fsjournal::journal",
            kind = %record.kind(),
            meta_len = len.meta,
            data_len = len.data,
            "Record exceeds segment capacity, dropping"
        );
        return Ok(());
    }
    if terms.needs_rollover(len) {
        rollover(queue, terms)?;
    }

    let term = terms.current();
    let (meta, data) = terms.segments_mut()?;
    let meta_offset = meta.max_offset();
    let data_offset = data.max_offset();

    let written = {
        let meta_buf = meta.reserve(len.meta)?;
        let data_buf = data.reserve(len.data)?;
        codec::serialize(record.op(), meta_buf, data_buf)
    };
    let complete = match written {
        Ok(written) if written == len => true,
        Ok(written) => {
            error!(
                target: "fsjournal::journal",
                kind = %record.kind(),
                measured = ?len,
                written = ?written,
                "Encoded length changed after capture, dropping record"
            );
            false
        }
        Err(e) => {
            error!(
                target: "fsjournal::journal",
                kind = %record.kind(),
                error = %e,
                "Failed to serialize record, dropping"
            );
            false
        }
    };
    if !complete {
        meta.discard(len.meta)?;
        data.discard(len.data)?;
        return Ok(());
    }

    meta.commit(len.meta)?;
    data.commit(len.data)?;

    record.resume(Appended {
        term,
        meta_offset: meta_offset as u64,
        data_offset: data_offset as u64,
        len,
    });
    Ok(())
}
