//! Task store: in-memory registry, ready queue, and admission limits.

mod memory;

pub use memory::{RunningTask, TaskStore};

use serde::{Deserialize, Serialize};

/// Admission and retention limits.
///
/// Defaults are deliberately small: this store backs a single-operator UI,
/// and the caps exist to bound memory and upstream load, not to shape
/// multi-tenant traffic.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum subjects in one batch submission.
    pub max_batch: usize,

    /// Maximum tasks queued or running at once.
    pub max_in_flight: usize,

    /// Maximum terminal tasks retained; oldest are evicted first.
    pub max_retained: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_batch: 16,
            max_in_flight: 32,
            max_retained: 256,
        }
    }
}

/// Per-state task totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}
