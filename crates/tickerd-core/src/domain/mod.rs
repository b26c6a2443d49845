//! Domain model (ids, subjects, states, records).

pub mod ids;
pub mod record;
pub mod state;
pub mod subject;

pub use ids::TaskId;
pub use record::{LogLevel, LogLine, TaskRecord, TaskSummary};
pub use state::TaskState;
pub use subject::Subject;
