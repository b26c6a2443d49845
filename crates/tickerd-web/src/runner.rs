//! Command-backed analysis runner.
//!
//! The actual analysis engine is an external program (`ANALYZE_CMD`),
//! invoked once per task with the subject designator as its final
//! argument. Progress lines on stderr stream into the task log as they
//! appear; stdout is the result artifact (JSON if it parses, a plain
//! string otherwise).

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;

use tickerd_core::domain::Subject;
use tickerd_core::runner::{AnalysisRunner, LogSink, RunnerError};

pub struct CommandRunner {
    argv: Vec<String>,
}

impl CommandRunner {
    /// Split a command line on whitespace. Returns None for a blank command.
    pub fn new(command: &str) -> Option<Self> {
        let argv: Vec<String> = command.split_whitespace().map(String::from).collect();
        if argv.is_empty() { None } else { Some(Self { argv }) }
    }

    async fn drive(child: &mut Child, stdout: ChildStdout) -> Result<String, RunnerError> {
        let mut reader = BufReader::new(stdout);
        let mut out = String::new();
        reader
            .read_to_string(&mut out)
            .await
            .map_err(|e| RunnerError::Failed(format!("read stdout: {e}")))?;
        let status = child
            .wait()
            .await
            .map_err(|e| RunnerError::Failed(format!("wait: {e}")))?;
        if !status.success() {
            return Err(RunnerError::Failed(format!(
                "analysis command exited with {status}"
            )));
        }
        Ok(out)
    }
}

#[async_trait]
impl AnalysisRunner for CommandRunner {
    async fn run(
        &self,
        subject: &Subject,
        log: LogSink,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Value, RunnerError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| RunnerError::Failed("empty analysis command".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .arg(subject.designator())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Failed(format!("spawn {program}: {e}")))?;

        log.info(format!("analysis started: {subject}"));

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Failed("stderr not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Failed("stdout not captured".into()))?;

        // Progress relay: one stderr line becomes one task log line.
        let progress = log.clone();
        let relay = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                progress.info(line);
            }
        });

        let outcome = tokio::select! {
            res = Self::drive(&mut child, stdout) => Some(res),
            _ = cancel.changed() => None,
        };

        let result = match outcome {
            Some(res) => res,
            None => {
                // kill_on_drop is the backstop; killing here reaps promptly.
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(RunnerError::Failed("cancelled by operator".into()))
            }
        };
        let _ = relay.await;

        let out = result?;
        let trimmed = out.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(trimmed)
            .unwrap_or_else(|_| Value::String(trimmed.to_string())))
    }
}
