//! Credential refresher: keeps the capture tool's cookie jar fresh.
//!
//! The refresh runs an external fetch (curl, typically a browser-impersonating
//! build) on a cadence decided by [`RefreshSchedule`]. Failures never stop the
//! supervisor; captures simply proceed with whatever jar exists.

mod schedule;

pub use schedule::RefreshSchedule;

use std::path::PathBuf;

use async_trait::async_trait;
use process_utils::{DEFAULT_TAIL_BYTES, run_captured_with};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::{CommandLine, Redactor};

/// Page fetched to obtain Kick session cookies.
pub const KICK_COOKIE_URL: &str = "https://kick.com/";

/// Result of one refresh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Required configuration is missing; nothing was run.
    Skipped,
    Failed {
        exit_code: Option<i32>,
        diagnostic: String,
    },
    Interrupted,
}

/// Obtains a fresh credential artifact.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, cancel: &CancellationToken) -> RefreshOutcome;
}

/// Settings for the curl cookie fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRefreshConfig {
    pub binary: String,
    /// curl `--config` file (client/TLS fingerprint settings).
    pub client_config: Option<PathBuf>,
    /// File with request headers, passed as `--header @file`.
    pub headers: Option<PathBuf>,
    /// Cookie jar written by curl and read by the capture tool.
    pub cookies_file: PathBuf,
    pub url: String,
}

/// [`CredentialRefresher`] that writes a cookie jar with curl.
pub struct CurlCookieRefresher {
    config: CookieRefreshConfig,
    redactor: Redactor,
}

impl CurlCookieRefresher {
    pub fn new(config: CookieRefreshConfig) -> Self {
        Self {
            config,
            redactor: Redactor::new(),
        }
    }

    /// The curl invocation, or `None` when the client config or headers are missing.
    pub fn command_line(&self) -> Option<CommandLine> {
        let client_config = self.config.client_config.as_ref()?;
        let headers = self.config.headers.as_ref()?;

        Some(
            CommandLine::new(&self.config.binary)
                .args([
                    "--config".to_string(),
                    client_config.to_string_lossy().into_owned(),
                    "--header".to_string(),
                    format!("@{}", headers.to_string_lossy()),
                    self.config.url.clone(),
                    "-c".to_string(),
                    self.config.cookies_file.to_string_lossy().into_owned(),
                ]),
        )
    }

    fn remove_stale_jar(&self) {
        let path = &self.config.cookies_file;
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed old cookie jar"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(
                path = %path.display(),
                error = %e,
                "Failed to remove old cookie jar; continuing"
            ),
        }
    }
}

#[async_trait]
impl CredentialRefresher for CurlCookieRefresher {
    async fn refresh(&self, cancel: &CancellationToken) -> RefreshOutcome {
        let Some(cmd) = self.command_line() else {
            warn!("Curl config or headers not set; skipping cookie refresh");
            return RefreshOutcome::Skipped;
        };

        info!("Refreshing cookies from {}", self.config.url);
        self.remove_stale_jar();
        debug!("Running: {}", cmd.display(&self.redactor));

        let run = run_captured_with(
            cmd.to_command(),
            cancel,
            DEFAULT_TAIL_BYTES,
            self.redactor.line_filter(),
        )
        .await;

        match run {
            Err(e) => {
                error!("Cookie refresh failed to start {}: {}", cmd.program, e);
                RefreshOutcome::Failed {
                    exit_code: None,
                    diagnostic: e.to_string(),
                }
            }
            Ok(run) if run.cancelled() => RefreshOutcome::Interrupted,
            Ok(run) if run.success() => {
                info!(path = %self.config.cookies_file.display(), "Cookies refreshed");
                RefreshOutcome::Refreshed
            }
            Ok(run) => {
                let diagnostic = self.redactor.redact(run.stderr.trim()).into_owned();
                let code = run
                    .exit_code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                error!("Cookie refresh failed ({}): {}", code, diagnostic);
                RefreshOutcome::Failed {
                    exit_code: run.exit_code(),
                    diagnostic,
                }
            }
        }
    }
}
