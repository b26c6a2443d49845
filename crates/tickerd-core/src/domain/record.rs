//! Task record: the single source of truth for one task's lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Subject, TaskId, TaskState};

/// Severity of one task log line (UI display levels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One appended task log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub msg: String,
}

/// Full task record.
///
/// Design:
/// - All state transitions happen through methods here.
/// - The store hands mutable access only to the owning worker; readers get
///   clones, so a snapshot is always internally consistent.
/// - `log` is append-only and frozen once the state is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub subject: Subject,
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log: Vec<LogLine>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(id: TaskId, subject: Subject) -> Self {
        Self {
            id,
            subject,
            state: TaskState::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            log: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Queued -> Running.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, TaskState::Queued);
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Append one log line. Ignored once the record left Running: a line
    /// arriving after cancellation must not thaw a frozen log.
    pub fn append_log(&mut self, level: LogLevel, msg: impl Into<String>) {
        if self.state != TaskState::Running {
            return;
        }
        self.log.push(LogLine {
            ts: Utc::now(),
            level,
            msg: msg.into(),
        });
    }

    /// Running -> Succeeded.
    pub fn succeed(&mut self, result: Value) {
        debug_assert_eq!(self.state, TaskState::Running);
        self.state = TaskState::Succeeded;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    /// Running -> Failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        debug_assert_eq!(self.state, TaskState::Running);
        self.state = TaskState::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Queued|Running -> Cancelled.
    pub fn cancel(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = TaskState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            subject: self.subject.clone(),
            state: self.state,
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            log_len: self.log.len(),
            error: self.error.clone(),
        }
    }
}

/// List view of a task: everything but the log body and result artifact.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub subject: Subject,
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log_len: usize,
    pub error: Option<String>,
}
