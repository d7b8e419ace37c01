//! Connector Subprocess Source
//!
//! Runs a connector command through `sh -c` and decodes its stdout. Stderr
//! is drained in a background task and forwarded to the log so a chatty
//! connector never blocks on a full pipe. The child is killed when the
//! source is dropped. Once stdout closes, the exit status is awaited for a
//! short grace period and a failing connector is logged as a warning.

use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{LineSource, RecordSource, SourceError};
use crate::protocol::{Message, SourceLabel};

/// How long to wait for the connector to exit after its stdout closes.
const EXIT_GRACE: Duration = Duration::from_secs(5);

pub struct SubprocessSource {
    command: String,
    child: Child,
    stdout: LineSource<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl SubprocessSource {
    /// Spawn `command` under `sh -c`. Must be called from within a tokio
    /// runtime.
    pub fn spawn(label: SourceLabel, command: &str) -> Result<Self, SourceError> {
        let spawn_error = |source: io::Error| SourceError::Spawn {
            label,
            command: command.to_string(),
            source,
        };

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(io::Error::new(io::ErrorKind::Other, "stdout not captured")))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_stderr(label, stderr)));

        info!(source = %label, pid = ?child.id(), command, "spawned connector");

        Ok(Self {
            command: command.to_string(),
            child,
            stdout: LineSource::new(label, BufReader::new(stdout)),
            stderr_task,
            exit_status: None,
        })
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.stdout.set_strict(strict);
        self
    }

    pub fn skipped_lines(&self) -> u64 {
        self.stdout.skipped_lines()
    }

    /// Exit status, known once stdout has closed and the child has exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    async fn log_exit(&mut self) {
        let label = self.stdout.label();
        if self.exit_status.is_some() {
            return;
        }
        match timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                if status.success() {
                    info!(source = %label, %status, "connector finished");
                } else {
                    warn!(
                        source = %label,
                        %status,
                        command = %self.command,
                        "connector exited with failure"
                    );
                }
            }
            Ok(Err(e)) => warn!(source = %label, error = %e, "could not query connector status"),
            Err(_) => debug!(source = %label, "stdout closed, connector still running"),
        }
    }
}

impl Drop for SubprocessSource {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl RecordSource for SubprocessSource {
    fn label(&self) -> SourceLabel {
        self.stdout.label()
    }

    async fn next_message(&mut self) -> Result<Option<Message>, SourceError> {
        let next = self.stdout.next_message().await?;
        if next.is_none() {
            self.log_exit().await;
        }
        Ok(next)
    }
}

async fn forward_stderr(label: SourceLabel, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(source = %label, "stderr: {}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(source = %label, error = %e, "stderr closed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::protocol::{Event, MessageKind};

    #[tokio::test]
    async fn test_streams_subprocess_stdout() {
        let command = r#"echo 'booting'; echo '{"type":"RECORD","record":{"stream":"s","data":{"id":1}}}'; echo '{"type":"STATE","state":{}}' ; echo 'noise' >&2"#;
        let mut source = SubprocessSource::spawn(SourceLabel::Left, command).unwrap();

        let first = source.next_message().await.unwrap().unwrap();
        assert!(matches!(first.event, Event::Record(_)));
        let second = source.next_message().await.unwrap().unwrap();
        assert_eq!(second.event.kind(), MessageKind::State);
        assert!(source.next_message().await.unwrap().is_none());
        assert_eq!(source.skipped_lines(), 1);
    }

    #[tokio::test]
    async fn test_failed_command_is_just_exhausted() {
        let mut source = SubprocessSource::spawn(SourceLabel::Right, "exit 3").unwrap();
        assert!(source.next_message().await.unwrap().is_none());
        assert_eq!(source.exit_status().and_then(|s| s.code()), Some(3));
    }

    #[tokio::test]
    async fn test_successful_exit_is_recorded() {
        let mut source = SubprocessSource::spawn(SourceLabel::Left, "true").unwrap();
        assert!(source.next_message().await.unwrap().is_none());
        assert!(source.exit_status().unwrap().success());
        assert!(source.next_message().await.unwrap().is_none());
    }
}
