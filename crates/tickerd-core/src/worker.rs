//! Worker pool: claims queued tasks and drives the analysis runner.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::domain::LogLevel;
use crate::runner::{AnalysisRunner, LogSink, RunnerError};
use crate::store::{RunningTask, TaskStore};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Pool size: at most this many tasks run concurrently.
    pub workers: usize,

    /// Optional wall-clock bound per task; expiry is recorded as a failure.
    pub task_timeout: Option<Duration>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            task_timeout: None,
        }
    }
}

/// Worker group handle.
/// - `request_shutdown()` stops workers from taking new claims.
/// - `shutdown_and_join()` additionally waits for in-flight runs to finish.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn spawn(
        settings: WorkerSettings,
        store: Arc<TaskStore>,
        runner: Arc<dyn AnalysisRunner>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = settings.workers.max(1);

        let mut joins = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let store = Arc::clone(&store);
            let runner = Arc::clone(&runner);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, store, runner, settings.task_timeout, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Stop taking new claims. In-flight handler execution is not cancelled.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    store: Arc<TaskStore>,
    runner: Arc<dyn AnalysisRunner>,
    task_timeout: Option<Duration>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // claim() can wait indefinitely, so race it against shutdown.
        let task = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break; // group handle dropped
                }
                continue;
            }
            task = store.claim() => task,
        };

        tracing::debug!(worker_id, task_id = %task.id(), subject = %task.subject(), "claimed task");
        run_one(task, runner.as_ref(), task_timeout).await;
    }
}

/// Drive one claimed task to a terminal state.
///
/// Log lines are relayed into the record as they arrive. A failure here
/// never escapes: it lands on the task, and the worker pulls the next id.
async fn run_one(task: RunningTask, runner: &dyn AnalysisRunner, task_timeout: Option<Duration>) {
    let (log_tx, mut log_rx) = mpsc::unbounded_channel();
    let mut cancel = task.cancel_signal();
    let subject = task.subject().clone();

    let deadline = async move {
        match task_timeout {
            Some(bound) => {
                tokio::time::sleep(bound).await;
                bound
            }
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let run = runner.run(&subject, LogSink::new(log_tx), cancel.clone());
    tokio::pin!(run);

    // None means cancelled: the record is already terminal and the runner
    // future is abandoned (dropping it cancels the underlying call).
    let outcome = loop {
        tokio::select! {
            Some((level, msg)) = log_rx.recv() => {
                task.append_log(level, msg).await;
            }
            result = &mut run => break Some(result),
            _ = cancel.changed() => break None,
            bound = &mut deadline => break Some(Err(RunnerError::Timeout(bound))),
        }
    };

    let Some(result) = outcome else {
        tracing::info!(task_id = %task.id(), "abandoning cancelled task");
        return;
    };

    // Flush lines that were emitted before the runner finished but not yet
    // relayed, so the frozen log is complete and in emission order.
    while let Ok((level, msg)) = log_rx.try_recv() {
        task.append_log(level, msg).await;
    }

    match result {
        Ok(value) => {
            tracing::info!(task_id = %task.id(), subject = %subject, "task succeeded");
            task.succeed(value).await;
        }
        Err(err) => {
            tracing::warn!(task_id = %task.id(), subject = %subject, error = %err, "task failed");
            task.append_log(LogLevel::Error, err.to_string()).await;
            task.fail(err.to_string()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::time::timeout;

    use crate::domain::{Subject, TaskId, TaskState};
    use crate::store::Limits;

    /// Succeeds for every ticker except `FAIL`, emitting a couple of lines.
    struct ScriptedRunner;

    #[async_trait]
    impl AnalysisRunner for ScriptedRunner {
        async fn run(
            &self,
            subject: &Subject,
            log: LogSink,
            _cancel: watch::Receiver<bool>,
        ) -> Result<Value, RunnerError> {
            log.info(format!("analyzing {subject}"));
            tokio::time::sleep(Duration::from_millis(5)).await;
            if subject.designator() == "FAIL" {
                return Err(RunnerError::Failed("scripted failure".into()));
            }
            log.info("done");
            Ok(serde_json::json!({"subject": subject.designator()}))
        }
    }

    /// Blocks until the shared gate opens, then succeeds.
    struct GatedRunner {
        gate: watch::Receiver<bool>,
    }

    #[async_trait]
    impl AnalysisRunner for GatedRunner {
        async fn run(
            &self,
            _subject: &Subject,
            log: LogSink,
            _cancel: watch::Receiver<bool>,
        ) -> Result<Value, RunnerError> {
            log.info("waiting at the gate");
            let mut gate = self.gate.clone();
            gate.wait_for(|open| *open)
                .await
                .map_err(|e| RunnerError::Failed(e.to_string()))?;
            Ok(Value::Null)
        }
    }

    fn store() -> Arc<TaskStore> {
        Arc::new(TaskStore::new(Limits::default()))
    }

    async fn wait_terminal(store: &TaskStore, id: TaskId) -> TaskState {
        timeout(Duration::from_secs(2), async {
            loop {
                if let Some(rec) = store.get(id).await
                    && rec.state.is_terminal()
                {
                    return rec.state;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_worker() {
        let store = store();
        let ids = store
            .submit(vec![
                Subject::Ticker("FAIL".into()),
                Subject::Ticker("AAPL".into()),
            ])
            .await
            .unwrap();

        let group = WorkerGroup::spawn(
            WorkerSettings {
                workers: 1,
                task_timeout: None,
            },
            Arc::clone(&store),
            Arc::new(ScriptedRunner),
        );

        assert_eq!(wait_terminal(&store, ids[0]).await, TaskState::Failed);
        assert_eq!(wait_terminal(&store, ids[1]).await, TaskState::Succeeded);

        let failed = store.get(ids[0]).await.unwrap();
        assert_eq!(failed.error.as_deref(), Some("scripted failure"));
        assert!(failed.result.is_none());
        assert!(!failed.log.is_empty());

        let ok = store.get(ids[1]).await.unwrap();
        assert!(ok.result.is_some());
        assert_eq!(ok.log[0].msg, "analyzing AAPL");

        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn at_most_pool_size_tasks_run_concurrently() {
        let store = store();
        let (gate_tx, gate_rx) = watch::channel(false);
        let ids = store
            .submit(vec![
                Subject::Ticker("AAPL".into()),
                Subject::Ticker("MSFT".into()),
                Subject::Ticker("TSLA".into()),
            ])
            .await
            .unwrap();

        let group = WorkerGroup::spawn(
            WorkerSettings {
                workers: 2,
                task_timeout: None,
            },
            Arc::clone(&store),
            Arc::new(GatedRunner { gate: gate_rx }),
        );

        // Both workers pick up a task and park at the gate; the third task
        // stays queued the whole time.
        timeout(Duration::from_secs(2), async {
            while store.counts().await.running < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let counts = store.counts().await;
        assert_eq!(counts.running, 2);
        assert_eq!(counts.queued, 1);

        gate_tx.send(true).unwrap();
        for id in ids {
            assert_eq!(wait_terminal(&store, id).await, TaskState::Succeeded);
        }

        group.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_recorded_as_failure() {
        struct SlowRunner;

        #[async_trait]
        impl AnalysisRunner for SlowRunner {
            async fn run(
                &self,
                _subject: &Subject,
                _log: LogSink,
                _cancel: watch::Receiver<bool>,
            ) -> Result<Value, RunnerError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }
        }

        let store = store();
        let ids = store
            .submit(vec![Subject::Ticker("AAPL".into())])
            .await
            .unwrap();

        let group = WorkerGroup::spawn(
            WorkerSettings {
                workers: 1,
                task_timeout: Some(Duration::from_millis(50)),
            },
            Arc::clone(&store),
            Arc::new(SlowRunner),
        );

        assert_eq!(wait_terminal(&store, ids[0]).await, TaskState::Failed);
        let rec = store.get(ids[0]).await.unwrap();
        assert!(rec.error.as_deref().unwrap().contains("timed out"));

        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn cancelling_a_running_task_frees_the_worker() {
        let store = store();
        let (_gate_tx, gate_rx) = watch::channel(false); // never opens
        let ids = store
            .submit(vec![Subject::Ticker("AAPL".into())])
            .await
            .unwrap();

        let group = WorkerGroup::spawn(
            WorkerSettings {
                workers: 1,
                task_timeout: None,
            },
            Arc::clone(&store),
            Arc::new(GatedRunner { gate: gate_rx }),
        );

        timeout(Duration::from_secs(2), async {
            while store.counts().await.running < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        store.cancel(ids[0]).await.unwrap();
        assert_eq!(wait_terminal(&store, ids[0]).await, TaskState::Cancelled);

        // The worker is free again: submit against a fresh runner path by
        // cancelling the queued task too, proving the loop still serves.
        let next = store
            .submit(vec![Subject::Ticker("MSFT".into())])
            .await
            .unwrap();
        store.cancel(next[0]).await.unwrap();
        assert_eq!(wait_terminal(&store, next[0]).await, TaskState::Cancelled);

        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn log_lines_are_visible_while_still_running() {
        /// Emits one line, parks at the gate, then emits another and finishes.
        struct TwoPhaseRunner {
            gate: watch::Receiver<bool>,
        }

        #[async_trait]
        impl AnalysisRunner for TwoPhaseRunner {
            async fn run(
                &self,
                _subject: &Subject,
                log: LogSink,
                _cancel: watch::Receiver<bool>,
            ) -> Result<Value, RunnerError> {
                log.info("phase one");
                let mut gate = self.gate.clone();
                gate.wait_for(|open| *open)
                    .await
                    .map_err(|e| RunnerError::Failed(e.to_string()))?;
                log.info("phase two");
                Ok(Value::Null)
            }
        }

        let store = store();
        let (gate_tx, gate_rx) = watch::channel(false);
        let ids = store
            .submit(vec![Subject::Ticker("AAPL".into())])
            .await
            .unwrap();

        let group = WorkerGroup::spawn(
            WorkerSettings {
                workers: 1,
                task_timeout: None,
            },
            Arc::clone(&store),
            Arc::new(TwoPhaseRunner { gate: gate_rx }),
        );

        // The first line must land in the record before the runner finishes.
        let early = timeout(Duration::from_secs(2), async {
            loop {
                if let Some(rec) = store.get(ids[0]).await
                    && !rec.log.is_empty()
                {
                    return rec;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(early.state, TaskState::Running);
        assert_eq!(early.log[0].msg, "phase one");

        gate_tx.send(true).unwrap();
        assert_eq!(wait_terminal(&store, ids[0]).await, TaskState::Succeeded);

        // A later snapshot extends the earlier one, never rewrites it.
        let late = store.get(ids[0]).await.unwrap();
        assert!(late.log.len() >= early.log.len());
        for (seen, now) in early.log.iter().zip(late.log.iter()) {
            assert_eq!(seen.msg, now.msg);
        }
        assert_eq!(late.log.last().unwrap().msg, "phase two");

        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn log_lines_arrive_in_emission_order() {
        let store = store();
        let ids = store
            .submit(vec![Subject::Ticker("AAPL".into())])
            .await
            .unwrap();

        let group = WorkerGroup::spawn(
            WorkerSettings::default(),
            Arc::clone(&store),
            Arc::new(ScriptedRunner),
        );

        assert_eq!(wait_terminal(&store, ids[0]).await, TaskState::Succeeded);
        let rec = store.get(ids[0]).await.unwrap();
        let msgs: Vec<&str> = rec.log.iter().map(|l| l.msg.as_str()).collect();
        assert_eq!(msgs, vec!["analyzing AAPL", "done"]);

        group.shutdown_and_join().await;
    }
}
