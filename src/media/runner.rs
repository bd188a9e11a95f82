use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::MediaCommand;
use crate::error::{BridgeError, Result};

const READ_CHUNK: usize = 4096;
const LINE_BUFFER: usize = 256;

/// One line of media processor output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub raw_line: String,
}

impl ProgressEvent {
    pub fn new<S: Into<String>>(raw_line: S) -> Self {
        Self {
            raw_line: raw_line.into(),
        }
    }
}

/// Receiver of progress events, called in the order lines are produced
#[async_trait]
pub trait ProgressSink: Send {
    async fn progress(&mut self, event: ProgressEvent);
}

#[async_trait]
impl ProgressSink for mpsc::Sender<ProgressEvent> {
    async fn progress(&mut self, event: ProgressEvent) {
        // A gone receiver only means nobody is listening any more
        let _ = self.send(event).await;
    }
}

#[async_trait]
impl ProgressSink for Vec<ProgressEvent> {
    async fn progress(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

/// Result of one finished media process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Whether the expected output file exists after exit
    pub output_file_exists: bool,
}

impl ProcessOutcome {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Clean exit and the expected output is present
    pub fn is_success(&self) -> bool {
        self.exited_cleanly() && self.output_file_exists
    }
}

/// Launches media commands and streams their output
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    binary_path: String,
}

impl ProcessRunner {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Run `command` to completion, reporting every stdout/stderr line to `sink`.
    ///
    /// Exit codes are not interpreted here. `expected_output`, when given, is
    /// checked for existence once the process has exited.
    pub async fn run(
        &self,
        command: &MediaCommand,
        work_dir: Option<&Path>,
        expected_output: Option<&Path>,
        sink: &mut dyn ProgressSink,
    ) -> Result<ProcessOutcome> {
        info!("Running {}: {}", command.description, command.binary_path);
        debug!("Arguments: {:?}", command.args);

        let mut cmd = Command::new(&command.binary_path);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::LaunchFailed(format!("{}: {}", command.binary_path, e)))?;

        let (line_tx, mut line_rx) = mpsc::channel(LINE_BUFFER);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        // Ends once both streams are closed
        while let Some(line) = line_rx.recv().await {
            debug!("shellOut: {}", line);
            sink.progress(ProgressEvent::new(line)).await;
        }
        for reader in readers {
            if let Err(e) = reader.await {
                warn!("Output reader for {} stopped abnormally: {}", command.description, e);
            }
        }

        let status = child.wait().await?;
        let output_file_exists = match expected_output {
            Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            None => false,
        };

        info!("{} finished with {}", command.description, status);
        Ok(ProcessOutcome {
            exit_code: status.code(),
            output_file_exists,
        })
    }

    /// Check that the media binary can be launched; returns its version line
    pub async fn check_availability(&self) -> Result<String> {
        let stdout = MediaCommand::new(&self.binary_path, "Version check")
            .arg("-version")
            .capture_stdout()
            .await?;

        let version_info = String::from_utf8_lossy(&stdout);
        let first_line = version_info.lines().next().unwrap_or("Unknown version").to_string();
        info!("Media processor is available: {}", first_line);
        Ok(first_line)
    }
}

fn forward_lines<R>(mut reader: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut splitter = LineSplitter::default();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let read = match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("Failed to read process output: {}", e);
                    break;
                }
            };
            for line in splitter.feed(&chunk[..read]) {
                if tx.send(line).await.is_err() {
                    return;
                }
            }
        }
        if let Some(line) = splitter.finish() {
            let _ = tx.send(line).await;
        }
    })
}

/// Splits a byte stream into lines terminated by `\n`, `\r` or `\r\n`.
///
/// ffmpeg rewrites its status line with bare carriage returns, so each
/// rewrite is reported as its own line.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            let after_cr = std::mem::replace(&mut self.after_cr, false);
            match byte {
                b'\n' if after_cr => {}
                b'\n' => lines.push(self.take_line()),
                b'\r' => {
                    lines.push(self.take_line());
                    self.after_cr = true;
                }
                other => self.pending.push(other),
            }
        }
        lines
    }

    /// Remaining unterminated text, if any
    pub fn finish(&mut self) -> Option<String> {
        (!self.pending.is_empty()).then(|| self.take_line())
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_splitter_terminators() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.feed(b"a\nb\r\nc\rd"), vec!["a", "b", "c"]);
        assert_eq!(splitter.feed(b"e\n\n"), vec!["de", ""]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_line_splitter_crlf_across_chunks() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.feed(b"frame=1\r"), vec!["frame=1"]);
        assert_eq!(splitter.feed(b"\nframe=2"), Vec::<String>::new());
        assert_eq!(splitter.finish(), Some("frame=2".to_string()));
    }

    #[test]
    fn test_outcome_success_needs_output() {
        let clean_no_file = ProcessOutcome { exit_code: Some(0), output_file_exists: false };
        assert!(clean_no_file.exited_cleanly());
        assert!(!clean_no_file.is_success());

        let failed_with_file = ProcessOutcome { exit_code: Some(1), output_file_exists: true };
        assert!(!failed_with_file.is_success());

        let killed = ProcessOutcome { exit_code: None, output_file_exists: true };
        assert!(!killed.exited_cleanly());
    }

    #[tokio::test]
    async fn test_launch_failure_emits_nothing() {
        let runner = ProcessRunner::new("/nonexistent/ffmpeg");
        let command = MediaCommand::new("/nonexistent/ffmpeg", "Raw command").arg("-version");
        let mut events: Vec<ProgressEvent> = Vec::new();

        let err = runner.run(&command, None, None, &mut events).await.unwrap_err();
        assert!(matches!(err, BridgeError::LaunchFailed(_)));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_check_availability_missing_binary() {
        let runner = ProcessRunner::new("/nonexistent/ffmpeg");
        assert!(matches!(
            runner.check_availability().await,
            Err(BridgeError::LaunchFailed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let command = MediaCommand::new("/bin/sh", "Script")
            .arg("-c")
            .arg("printf 'L1\\nL2\\n'; printf 'L3\\n'; touch \"$0\"")
            .output(&output);
        let mut events: Vec<ProgressEvent> = Vec::new();

        let outcome = ProcessRunner::new("/bin/sh")
            .run(&command, Some(dir.path()), Some(&output), &mut events)
            .await
            .unwrap();

        assert_eq!(
            events,
            vec![ProgressEvent::new("L1"), ProgressEvent::new("L2"), ProgressEvent::new("L3")]
        );
        assert!(outcome.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_reported_not_raised() {
        let command = MediaCommand::new("/bin/sh", "Script").arg("-c").arg("echo boom >&2; exit 3");
        let mut events: Vec<ProgressEvent> = Vec::new();

        let outcome = ProcessRunner::new("/bin/sh")
            .run(&command, None, None, &mut events)
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.output_file_exists);
        assert_eq!(events, vec![ProgressEvent::new("boom")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_channel_sink_receives_events() {
        let (mut tx, mut rx) = mpsc::channel::<ProgressEvent>(8);
        let command = MediaCommand::new("/bin/sh", "Script").arg("-c").arg("echo one; echo two");

        ProcessRunner::new("/bin/sh")
            .run(&command, None, None, &mut tx)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(ProgressEvent::new("one")));
        assert_eq!(rx.recv().await, Some(ProgressEvent::new("two")));
        assert_eq!(rx.recv().await, None);
    }
}
