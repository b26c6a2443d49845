//! Submission-time and lookup error types.

use thiserror::Error;

use crate::domain::TaskId;

/// Why a submission was rejected. Rejections are all-or-nothing: no task
/// from the batch is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("no subjects after normalization")]
    EmptyBatch,

    #[error("invalid subjects: {}", .0.join(", "))]
    InvalidSubjects(Vec<String>),

    #[error("batch of {count} subjects exceeds the limit of {cap}")]
    TooManySubjects { count: usize, cap: usize },

    #[error("{in_flight} tasks already queued or running (limit {cap})")]
    TooManyInFlight { in_flight: usize, cap: usize },
}

/// Lookup of an id the store has never seen (or has already evicted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown task: {0}")]
pub struct UnknownTask(pub TaskId);
