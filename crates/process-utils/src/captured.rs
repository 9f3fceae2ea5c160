//! Run a child process to completion while keeping the tail of its stderr.

use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bytes of stderr kept by default.
pub const DEFAULT_TAIL_BYTES: usize = 64 * 1024;

/// How long to wait for the stderr reader after the child is gone.
///
/// A grandchild may inherit the pipe and keep it open past the child's exit.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Bounded buffer holding the most recent stderr lines.
#[derive(Debug, Clone)]
pub struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
    limit: usize,
}

impl StderrTail {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            limit: limit.max(1),
        }
    }

    /// Append a line, evicting the oldest lines once over the byte limit.
    pub fn push(&mut self, line: impl Into<String>) {
        let mut line = line.into();
        if line.len() > self.limit {
            let mut start = line.len() - self.limit;
            while !line.is_char_boundary(start) {
                start += 1;
            }
            line = line.split_off(start);
        }

        self.bytes += line.len();
        self.lines.push_back(line);

        while self.bytes > self.limit {
            match self.lines.pop_front() {
                Some(old) => self.bytes -= old.len(),
                None => break,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_text(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

/// Outcome of a [`run_captured`] call.
#[derive(Debug)]
pub struct CapturedRun {
    /// Exit status, `None` when the run was cancelled.
    pub status: Option<ExitStatus>,
    /// Most recent stderr output, lossily decoded.
    pub stderr: String,
}

impl CapturedRun {
    pub fn cancelled(&self) -> bool {
        self.status.is_none()
    }

    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    /// Exit code, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Spawn `command` and wait for it to exit.
///
/// stdin and stdout are discarded, stderr is read line by line (logged at
/// debug level) and its last `tail_bytes` are returned. When `cancel` fires
/// the child is killed and reaped and the result reports no status.
///
/// Spawn failures are returned as `Err`; a nonzero exit is not an error.
pub async fn run_captured(
    command: Command,
    cancel: &CancellationToken,
    tail_bytes: usize,
) -> io::Result<CapturedRun> {
    run_captured_with(command, cancel, tail_bytes, str::to_owned).await
}

/// Like [`run_captured`], but every stderr line goes through `sanitize`
/// before it is logged or kept in the tail.
pub async fn run_captured_with<F>(
    mut command: Command,
    cancel: &CancellationToken,
    tail_bytes: usize,
    sanitize: F,
) -> io::Result<CapturedRun>
where
    F: Fn(&str) -> String + Send + 'static,
{
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let reader = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(collect_tail(stderr, tail_bytes, sanitize)));

    let status = tokio::select! {
        status = child.wait() => Some(status?),
        _ = cancel.cancelled() => {
            debug!("Cancellation requested, killing child process");
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Failed to kill child process");
            }
            None
        }
    };

    let stderr = match reader {
        Some(mut handle) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut handle).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                handle.abort();
                String::new()
            }
        },
        None => String::new(),
    };

    Ok(CapturedRun { status, stderr })
}

async fn collect_tail<R, F>(stderr: R, limit: usize, sanitize: F) -> String
where
    R: AsyncRead + Unpin,
    F: Fn(&str) -> String,
{
    let mut reader = BufReader::new(stderr);
    let mut tail = StderrTail::new(limit);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buf);
                let line = decoded.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                let line = sanitize(line);
                debug!(target: "process_utils::stderr", "{line}");
                tail.push(line);
            }
            Err(e) => {
                debug!(error = %e, "Error reading child stderr");
                break;
            }
        }
    }

    tail.into_text()
}
