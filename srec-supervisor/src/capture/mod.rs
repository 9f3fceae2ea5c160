//! Capture invoker: runs the external capture tool against one destination.
//!
//! Two tools are supported, matching the platforms:
//! - streamlink (Twitch), authenticated with OAuth/Client-ID API headers
//! - yt-dlp (Kick), authenticated with the cookie jar kept fresh by
//!   [`crate::credentials`]

mod command;
mod redact;

pub use command::{CommandLine, tokenize_args};
pub use redact::Redactor;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{DEFAULT_TAIL_BYTES, run_captured_with};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Secret;
use crate::domain::{AttemptOutcome, CaptureTarget};

/// Runs one capture attempt to completion.
#[async_trait]
pub trait CaptureInvoker: Send + Sync {
    /// Capture the stream into `output`, returning when the tool exits.
    ///
    /// Cancellation stops the tool and yields [`AttemptOutcome::Interrupted`].
    async fn capture(&self, output: &Path, cancel: &CancellationToken) -> AttemptOutcome;
}

/// Twitch API credentials passed to streamlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitchAuth {
    pub token: Secret,
    pub client_id: String,
}

/// streamlink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamlinkConfig {
    pub binary: String,
    pub quality: String,
    pub extra_args: Vec<String>,
    pub auth: Option<TwitchAuth>,
}

/// yt-dlp settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpConfig {
    pub binary: String,
    pub extra_args: Vec<String>,
    pub cookies_file: PathBuf,
}

/// The external capture tool and how to invoke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTool {
    Streamlink(StreamlinkConfig),
    YtDlp(YtDlpConfig),
}

impl CaptureTool {
    pub fn binary(&self) -> &str {
        match self {
            Self::Streamlink(c) => &c.binary,
            Self::YtDlp(c) => &c.binary,
        }
    }

    /// Secret values that must be hidden from logs.
    pub fn secrets(&self) -> Vec<&Secret> {
        match self {
            Self::Streamlink(StreamlinkConfig {
                auth: Some(auth), ..
            }) => vec![&auth.token],
            _ => Vec::new(),
        }
    }

    /// Build the full argument list for one attempt writing to `output`.
    ///
    /// Always rebuilt from scratch per destination.
    pub fn command_line(&self, stream_url: &str, output: &Path) -> CommandLine {
        let output = output.to_string_lossy().into_owned();
        match self {
            Self::Streamlink(c) => {
                let mut cmd = CommandLine::new(&c.binary)
                    .arg(stream_url)
                    .arg(&c.quality)
                    .args(["-o".to_string(), output])
                    .args(c.extra_args.iter().cloned());
                if let Some(auth) = &c.auth {
                    cmd = cmd.args([
                        "--twitch-api-header".to_string(),
                        format!("Authorization=OAuth {}", auth.token.expose()),
                        "--twitch-api-header".to_string(),
                        format!("Client-ID={}", auth.client_id),
                    ]);
                }
                cmd
            }
            Self::YtDlp(c) => {
                let mut cmd = CommandLine::new(&c.binary).args(c.extra_args.iter().cloned());
                if c.cookies_file.is_file() {
                    cmd = cmd.args([
                        "--cookies".to_string(),
                        c.cookies_file.to_string_lossy().into_owned(),
                    ]);
                } else {
                    debug!(
                        path = %c.cookies_file.display(),
                        "Cookie jar missing, capturing without cookies"
                    );
                }
                cmd.arg(stream_url).args(["-o".to_string(), output])
            }
        }
    }
}

/// [`CaptureInvoker`] backed by a real child process.
pub struct ProcessCaptureInvoker {
    tool: CaptureTool,
    stream_url: String,
    redactor: Redactor,
}

impl ProcessCaptureInvoker {
    pub fn new(tool: CaptureTool, target: &CaptureTarget) -> Self {
        let redactor = tool
            .secrets()
            .into_iter()
            .fold(Redactor::new(), |r, secret| r.with_secret(secret));
        Self {
            tool,
            stream_url: target.stream_url().to_string(),
            redactor,
        }
    }

    pub fn command_line(&self, output: &Path) -> CommandLine {
        self.tool.command_line(&self.stream_url, output)
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }
}

#[async_trait]
impl CaptureInvoker for ProcessCaptureInvoker {
    async fn capture(&self, output: &Path, cancel: &CancellationToken) -> AttemptOutcome {
        let cmd = self.command_line(output);
        info!("Running: {}", cmd.display(&self.redactor));

        let run = run_captured_with(
            cmd.to_command(),
            cancel,
            DEFAULT_TAIL_BYTES,
            self.redactor.line_filter(),
        )
        .await;

        match run {
            Err(e) => AttemptOutcome::failure(None, format!("failed to start {}: {e}", cmd.program)),
            Ok(run) if run.cancelled() => AttemptOutcome::Interrupted,
            Ok(run) if run.success() => AttemptOutcome::Success,
            Ok(run) => AttemptOutcome::failure(
                run.exit_code(),
                self.redactor.redact(run.stderr.trim()).into_owned(),
            ),
        }
    }
}
