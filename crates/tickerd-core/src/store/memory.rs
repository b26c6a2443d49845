//! In-memory task store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, Notify, watch};

use super::{Limits, TaskCounts};
use crate::domain::{LogLevel, Subject, TaskId, TaskRecord, TaskState, TaskSummary};
use crate::error::{SubmitError, UnknownTask};

/// Store internals, all behind one mutex.
///
/// Design:
/// - `records` is the single source of truth; `ready` and `order` hold ids only.
/// - Admission checks and task creation happen under the same lock
///   acquisition, so two concurrent submissions cannot jointly exceed the
///   in-flight cap.
struct StoreState {
    records: HashMap<TaskId, TaskRecord>,

    /// Submission order, oldest first. Drives listing and eviction.
    order: Vec<TaskId>,

    /// FIFO queue of claimable ids.
    ready: VecDeque<TaskId>,

    /// Cancel senders for currently running tasks.
    cancels: HashMap<TaskId, watch::Sender<bool>>,

    limits: Limits,
}

impl StoreState {
    fn new(limits: Limits) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            ready: VecDeque::new(),
            cancels: HashMap::new(),
            limits,
        }
    }

    fn in_flight(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state.is_in_flight())
            .count()
    }

    fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Drop the oldest terminal records beyond `max_retained`. In-flight
    /// tasks are never evicted.
    fn evict_terminal(&mut self) {
        let cap = self.limits.max_retained;
        let mut terminal = self
            .records
            .values()
            .filter(|r| r.state.is_terminal())
            .count();
        if terminal <= cap {
            return;
        }

        let mut keep = Vec::with_capacity(self.order.len());
        for id in self.order.drain(..) {
            let evictable = terminal > cap
                && self
                    .records
                    .get(&id)
                    .is_some_and(|r| r.state.is_terminal());
            if evictable {
                self.records.remove(&id);
                terminal -= 1;
                tracing::debug!(task_id = %id, "evicted terminal task");
            } else {
                keep.push(id);
            }
        }
        self.order = keep;
    }
}

/// In-memory task store with a FIFO ready queue.
pub struct TaskStore {
    state: Arc<Mutex<StoreState>>,
    notify: Arc<Notify>,
}

impl TaskStore {
    pub fn new(limits: Limits) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new(limits))),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Admit a batch atomically: either every subject becomes a queued task
    /// (ids returned in input order) or nothing is created.
    pub async fn submit(&self, subjects: Vec<Subject>) -> Result<Vec<TaskId>, SubmitError> {
        if subjects.is_empty() {
            return Err(SubmitError::EmptyBatch);
        }

        let ids = {
            let mut state = self.state.lock().await;

            let cap = state.limits.max_batch;
            if subjects.len() > cap {
                return Err(SubmitError::TooManySubjects {
                    count: subjects.len(),
                    cap,
                });
            }

            let in_flight = state.in_flight();
            let cap = state.limits.max_in_flight;
            if in_flight + subjects.len() > cap {
                return Err(SubmitError::TooManyInFlight { in_flight, cap });
            }

            let mut ids = Vec::with_capacity(subjects.len());
            for subject in subjects {
                let id = TaskId::new();
                state.records.insert(id, TaskRecord::new(id, subject));
                state.order.push(id);
                state.ready.push_back(id);
                ids.push(id);
            }
            state.evict_terminal();
            ids
        };

        // Wake idle workers outside the lock.
        for _ in 0..ids.len() {
            self.notify.notify_one();
        }
        Ok(ids)
    }

    /// Claim the next queued task, FIFO. Waits until one is available.
    ///
    /// The returned handle is the only mutator of the claimed record.
    pub async fn claim(&self) -> RunningTask {
        loop {
            {
                let mut state = self.state.lock().await;
                while let Some(id) = state.ready.pop_front() {
                    // Only ids whose record is still Queued are claimable.
                    let Some(record) = state.records.get_mut(&id) else {
                        continue;
                    };
                    if record.state != TaskState::Queued {
                        continue;
                    }
                    record.start();
                    let subject = record.subject.clone();
                    let (tx, rx) = watch::channel(false);
                    state.cancels.insert(id, tx);
                    return RunningTask {
                        id,
                        subject,
                        state: Arc::clone(&self.state),
                        cancel_rx: rx,
                    };
                }
            }
            self.notify.notified().await;
        }
    }

    /// Cancel a task.
    ///
    /// Queued tasks go straight to `cancelled` without ever running.
    /// Running tasks are marked `cancelled` and the owning worker is
    /// signalled to abandon the runner; any late output is discarded.
    /// Terminal tasks are left untouched (the current state is returned).
    pub async fn cancel(&self, id: TaskId) -> Result<TaskState, UnknownTask> {
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get_mut(&id) else {
            return Err(UnknownTask(id));
        };
        match record.state {
            TaskState::Queued => {
                record.cancel();
                state.ready.retain(|q| *q != id);
                tracing::info!(task_id = %id, "cancelled queued task");
                Ok(TaskState::Cancelled)
            }
            TaskState::Running => {
                record.cancel();
                if let Some(tx) = state.cancels.remove(&id) {
                    let _ = tx.send(true);
                }
                tracing::info!(task_id = %id, "cancelled running task");
                Ok(TaskState::Cancelled)
            }
            terminal => Ok(terminal),
        }
    }

    /// Snapshot one task (full log and result) as of one lock acquisition.
    pub async fn get(&self, id: TaskId) -> Option<TaskRecord> {
        let state = self.state.lock().await;
        state.records.get(&id).cloned()
    }

    /// Task summaries, most recent submission first.
    pub async fn list(&self, limit: usize) -> Vec<TaskSummary> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.records.get(id))
            .map(TaskRecord::summary)
            .take(limit)
            .collect()
    }

    pub async fn counts(&self) -> TaskCounts {
        let state = self.state.lock().await;
        state.counts()
    }
}

/// Exclusive owner handle for a running task.
///
/// Every mutation re-checks that the record is still `Running`, so output
/// arriving after a cancellation is dropped instead of resurrecting the
/// record.
pub struct RunningTask {
    id: TaskId,
    subject: Subject,
    state: Arc<Mutex<StoreState>>,
    cancel_rx: watch::Receiver<bool>,
}

impl RunningTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Receiver that flips to `true` when this task is cancelled.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    pub async fn append_log(&self, level: LogLevel, msg: impl Into<String>) {
        let mut state = self.state.lock().await;
        if let Some(record) = state.records.get_mut(&self.id) {
            record.append_log(level, msg);
        }
    }

    /// Running -> Succeeded. No-op if the task was cancelled meanwhile.
    pub async fn succeed(self, result: Value) {
        let mut state = self.state.lock().await;
        state.cancels.remove(&self.id);
        if let Some(record) = state.records.get_mut(&self.id)
            && record.state == TaskState::Running
        {
            record.succeed(result);
        }
    }

    /// Running -> Failed. No-op if the task was cancelled meanwhile.
    pub async fn fail(self, error: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.cancels.remove(&self.id);
        if let Some(record) = state.records.get_mut(&self.id)
            && record.state == TaskState::Running
        {
            record.fail(error);
        }
    }
}
