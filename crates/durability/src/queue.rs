//! Request queue shared by submitting threads and the durability worker.
//!
//! One mutex guards every piece of shared state: the record FIFO, the
//! shutdown and rollover flags, the published term range and the worker
//! state.
//! Producers hold it only long enough to push. The worker blocks on
//! `work_ready` until there is something to do.
//!
//! Notifications are always sent while holding the lock. The worker checks
//! its wake conditions and calls `wait()` under the same lock, so a notify
//! can never fall between the check and the wait.

use crate::record::{OperationRecord, RejectReason, Rejected};
use crate::worker::WorkerState;
use fsjournal_core::TermRange;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct QueueState {
    records: VecDeque<OperationRecord>,
    shutdown: bool,
    change_term: bool,
    terms: Option<TermRange>,
    worker_state: WorkerState,
}

impl QueueState {
    fn accepting(&self) -> bool {
        !self.shutdown
            && matches!(
                self.worker_state,
                WorkerState::Starting | WorkerState::Running | WorkerState::RollingOver
            )
    }
}

/// Next thing for the worker to do, in priority order.
#[derive(Debug)]
pub enum Event {
    /// Shutdown was requested
    Shutdown,
    /// A rollover was requested
    Rollover,
    /// Oldest queued record
    Record(OperationRecord),
}

/// FIFO of records plus the control flags that wake the worker.
pub struct RequestQueue {
    state: Mutex<QueueState>,
    work_ready: Condvar,
    state_changed: Condvar,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    /// Empty queue, worker state `Starting`
    pub fn new() -> Self {
        RequestQueue {
            state: Mutex::new(QueueState {
                records: VecDeque::new(),
                shutdown: false,
                change_term: false,
                terms: None,
                worker_state: WorkerState::Starting,
            }),
            work_ready: Condvar::new(),
            state_changed: Condvar::new(),
        }
    }

    /// Append a record and wake the worker.
    ///
    /// Refused once shutdown was requested or the worker stopped.
    pub fn enqueue(&self, record: OperationRecord) -> Result<(), Rejected> {
        let mut state = self.state.lock();
        if !state.accepting() {
            return Err(Rejected {
                reason: RejectReason::Stopped,
                record,
            });
        }
        state.records.push_back(record);
        self.work_ready.notify_one();
        Ok(())
    }

    /// Ask the worker to start a new term. Returns false if it has stopped.
    pub fn request_rollover(&self) -> bool {
        let mut state = self.state.lock();
        if !state.accepting() {
            return false;
        }
        state.change_term = true;
        self.work_ready.notify_one();
        true
    }

    /// Ask the worker to stop at its next wake.
    pub fn request_shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.work_ready.notify_all();
    }

    /// Record the term range after the worker opened a term.
    pub fn publish_terms(&self, range: TermRange) {
        self.state.lock().terms = Some(range);
    }

    /// Last published term range. `None` before the first term is open
    /// and once the worker has stopped.
    pub fn terms(&self) -> Option<TermRange> {
        let state = self.state.lock();
        if !state.accepting() {
            return None;
        }
        state.terms
    }

    /// Block until there is work, then take the most urgent item.
    ///
    /// Order: shutdown, rollover, records.
    pub fn next_event(&self) -> Event {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return Event::Shutdown;
            }
            if state.change_term {
                state.change_term = false;
                return Event::Rollover;
            }
            if let Some(record) = state.records.pop_front() {
                return Event::Record(record);
            }
            self.work_ready.wait(&mut state);
        }
    }

    /// Stop accepting work and take everything still queued.
    pub fn close_and_drain(&self) -> Vec<OperationRecord> {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.change_term = false;
        state.records.drain(..).collect()
    }

    /// Publish a new worker state.
    pub fn set_state(&self, new: WorkerState) {
        let mut state = self.state.lock();
        state.worker_state = new;
        self.state_changed.notify_all();
    }

    /// Current worker state
    pub fn state(&self) -> WorkerState {
        self.state.lock().worker_state
    }

    /// Block until the worker is either running or fully stopped.
    pub fn wait_started(&self) -> WorkerState {
        let mut state = self.state.lock();
        while matches!(
            state.worker_state,
            WorkerState::Starting | WorkerState::Stopping
        ) {
            self.state_changed.wait(&mut state);
        }
        state.worker_state
    }

    /// Records waiting to be appended
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether no records are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
