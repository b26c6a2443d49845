//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// Transitions:
/// - Queued -> Running -> Succeeded
/// - Queued -> Running -> Failed
/// - Queued -> Cancelled (never observed Running)
/// - Running -> Cancelled (runner abandoned, late output discarded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the ready queue.
    Queued,

    /// Claimed by a worker, runner in progress.
    Running,

    /// Runner returned a result artifact.
    Succeeded,

    /// Runner reported an error (or the per-task timeout expired).
    Failed,

    /// Cancelled before or during execution.
    Cancelled,
}

impl TaskState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// In-flight states count against the admission limit.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Running)
    }
}
