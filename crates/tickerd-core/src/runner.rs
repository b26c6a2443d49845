//! The analysis collaborator seam.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::domain::{LogLevel, Subject};

#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    #[error("{0}")]
    Failed(String),

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
}

/// Streaming log handle given to a runner.
///
/// Lines are relayed into the task record as they arrive, so the UI sees
/// progress live instead of a buffered dump at completion. Send failures
/// are ignored: a closed receiver means the task already reached a terminal
/// state and the line would be discarded anyway.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<(LogLevel, String)>,
}

impl LogSink {
    pub fn new(tx: mpsc::UnboundedSender<(LogLevel, String)>) -> Self {
        Self { tx }
    }

    pub fn info(&self, msg: impl Into<String>) {
        let _ = self.tx.send((LogLevel::Info, msg.into()));
    }

    pub fn warning(&self, msg: impl Into<String>) {
        let _ = self.tx.send((LogLevel::Warning, msg.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        let _ = self.tx.send((LogLevel::Error, msg.into()));
    }
}

/// External analysis engine.
///
/// Opaque to the orchestrator: given a subject it emits log lines over time
/// and ends with a result artifact or an error. `cancel` flips to `true`
/// when the task is cancelled; honoring it is cooperative, and the worker
/// abandons the call either way and discards late output.
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    async fn run(
        &self,
        subject: &Subject,
        log: LogSink,
        cancel: watch::Receiver<bool>,
    ) -> Result<Value, RunnerError>;
}
