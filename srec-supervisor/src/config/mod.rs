//! Configuration loading.
//!
//! The config file (`settings.config`) has a `[Settings]` section and an
//! optional `[Logging]` section. Keys keep their historical PascalCase names.
//! The file may be TOML or the INI dialect of the older scripts (unquoted
//! values); anything that is not valid TOML is read as INI. It is read once
//! at startup and resolved, together with the command line, into a typed
//! [`ResolvedConfig`].

mod legacy;
mod secret;

pub use secret::Secret;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::capture::{CaptureTool, StreamlinkConfig, TwitchAuth, YtDlpConfig, tokenize_args};
use crate::credentials::{CookieRefreshConfig, KICK_COOKIE_URL};
use crate::domain::{CaptureTarget, Platform};
use crate::logging::{FileSink, FileSinkKind, LogSettings};
use crate::supervisor::FallbackPolicy;
use crate::utils::fs::resolve_against;
use crate::{Error, Result};

/// Default config file name, looked up in the base directory.
pub const CONFIG_FILE_NAME: &str = "settings.config";

const DEFAULT_STREAMLINK_ARGS: &str = "--twitch-disable-ads";
const DEFAULT_QUALITY: &str = "best";
const DEFAULT_COOKIES_FILE: &str = "kickcomcookies.txt";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_LOG_BACKUPS: usize = 5;

/// Parsed contents of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "Settings", default)]
    pub settings: SettingsSection,
    #[serde(rename = "Logging", default)]
    pub logging: LoggingSection,
}

/// `[Settings]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SettingsSection {
    pub platform: Option<Platform>,
    /// Seconds between cycles.
    #[serde(default, deserialize_with = "legacy::lenient")]
    pub retry_time: Option<u64>,
    /// Seconds between cycles for kick, preferred over `RetryTime`.
    #[serde(default, deserialize_with = "legacy::lenient")]
    pub retry_time_kick: Option<u64>,
    /// Preferred (external) storage directory.
    pub external_dir: Option<PathBuf>,
    /// Local fallback directory, default `<base>/<platform>`.
    pub fallback_dir: Option<PathBuf>,
    pub twitch_token: Option<Secret>,
    #[serde(rename = "ClientID", alias = "ClientId")]
    pub client_id: Option<String>,
    /// Extra streamlink arguments, shell-style quoting.
    pub extra_args: Option<String>,
    /// Extra yt-dlp arguments, shell-style quoting.
    pub yt_dlp_args: Option<String>,
    pub quality: Option<String>,
    pub curl_config: Option<PathBuf>,
    pub curl_headers: Option<PathBuf>,
    pub cookies_file: Option<PathBuf>,
    pub streamlink_path: Option<String>,
    pub yt_dlp_path: Option<String>,
    pub curl_path: Option<String>,
    /// Cycles between credential refreshes; 0 refreshes only on the first cycle.
    #[serde(default, deserialize_with = "legacy::lenient")]
    pub credential_refresh_cycles: Option<u32>,
    pub fallback_policy: Option<FallbackPolicy>,
}

/// `[Logging]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingSection {
    pub level: Option<String>,
    pub file: Option<FileSinkKind>,
    #[serde(default, deserialize_with = "legacy::lenient_bool")]
    pub console: Option<bool>,
    pub dir: Option<PathBuf>,
    #[serde(default, deserialize_with = "legacy::lenient")]
    pub max_bytes: Option<u64>,
    #[serde(default, deserialize_with = "legacy::lenient")]
    pub backups: Option<usize>,
}

/// Inputs from the command line that take part in resolution.
#[derive(Debug, Clone)]
pub struct Overrides<'a> {
    pub streamer: &'a str,
    pub platform: Option<Platform>,
    pub base_dir: &'a Path,
    pub verbose: bool,
}

/// Everything the supervisor needs, fully resolved.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub target: CaptureTarget,
    pub retry_interval: Duration,
    pub preferred_dir: Option<PathBuf>,
    pub fallback_dir: PathBuf,
    pub capture: CaptureTool,
    pub cookie_refresh: Option<CookieRefreshConfig>,
    pub refresh_every: u32,
    pub fallback_policy: FallbackPolicy,
    pub log: LogSettings,
}

impl AppConfig {
    /// Load and parse the config file.
    ///
    /// A missing file is an error: the supervisor refuses to start without one.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config(format!("Config not found: {}", path.display()))
            } else {
                Error::io_path("reading config", path, e)
            }
        })?;
        Self::parse(&content, path)
    }

    /// Parse config text; `origin` is only used in error messages.
    ///
    /// Text that is not valid TOML is read as INI.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let table = match toml::from_str::<toml::Table>(content) {
            Ok(table) => table,
            Err(_) => legacy::ini_to_table(content).map_err(|source| Error::IniParse {
                path: origin.to_path_buf(),
                source,
            })?,
        };

        toml::Value::Table(table)
            .try_into()
            .map_err(|source| Error::ConfigParse {
                path: origin.to_path_buf(),
                source,
            })
    }

    /// Combine the file with command-line overrides.
    pub fn resolve(&self, overrides: &Overrides<'_>) -> Result<ResolvedConfig> {
        let s = &self.settings;
        let base = overrides.base_dir;

        let platform = overrides
            .platform
            .or(s.platform)
            .unwrap_or_default();
        let target = CaptureTarget::new(platform, overrides.streamer)?;

        let retry_secs = match platform {
            Platform::Twitch => s.retry_time,
            Platform::Kick => s.retry_time_kick.or(s.retry_time),
        }
        .unwrap_or_else(|| platform.default_retry_secs());

        let preferred_dir = non_empty_path(s.external_dir.as_ref()).map(|p| resolve_against(base, p));
        let fallback_dir = non_empty_path(s.fallback_dir.as_ref())
            .map(|p| resolve_against(base, p))
            .unwrap_or_else(|| base.join(platform.fallback_subdir()));

        let cookies_file = non_empty_path(s.cookies_file.as_ref())
            .map(|p| resolve_against(base, p))
            .unwrap_or_else(|| base.join(DEFAULT_COOKIES_FILE));

        let capture = match platform {
            Platform::Twitch => {
                let extra = s.extra_args.as_deref().unwrap_or(DEFAULT_STREAMLINK_ARGS);
                let auth = match (&s.twitch_token, non_empty(s.client_id.as_deref())) {
                    (Some(token), Some(client_id)) if !token.is_empty() => Some(TwitchAuth {
                        token: token.clone(),
                        client_id: client_id.to_string(),
                    }),
                    _ => None,
                };
                CaptureTool::Streamlink(StreamlinkConfig {
                    binary: non_empty(s.streamlink_path.as_deref())
                        .unwrap_or("streamlink")
                        .to_string(),
                    quality: non_empty(s.quality.as_deref())
                        .unwrap_or(DEFAULT_QUALITY)
                        .to_string(),
                    extra_args: tokenize_args(extra)?,
                    auth,
                })
            }
            Platform::Kick => CaptureTool::YtDlp(YtDlpConfig {
                binary: non_empty(s.yt_dlp_path.as_deref())
                    .unwrap_or("yt-dlp")
                    .to_string(),
                extra_args: tokenize_args(s.yt_dlp_args.as_deref().unwrap_or_default())?,
                cookies_file: cookies_file.clone(),
            }),
        };

        let cookie_refresh = platform.uses_cookie_jar().then(|| CookieRefreshConfig {
            binary: non_empty(s.curl_path.as_deref())
                .unwrap_or("curl")
                .to_string(),
            client_config: non_empty_path(s.curl_config.as_ref()).map(|p| resolve_against(base, p)),
            headers: non_empty_path(s.curl_headers.as_ref()).map(|p| resolve_against(base, p)),
            cookies_file,
            url: KICK_COOKIE_URL.to_string(),
        });

        Ok(ResolvedConfig {
            log: self.log_settings(&target, base, overrides.verbose),
            target,
            retry_interval: Duration::from_secs(retry_secs),
            preferred_dir,
            fallback_dir,
            capture,
            cookie_refresh,
            refresh_every: s.credential_refresh_cycles.unwrap_or(0),
            fallback_policy: s.fallback_policy.unwrap_or_default(),
        })
    }

    fn log_settings(&self, target: &CaptureTarget, base: &Path, verbose: bool) -> LogSettings {
        let l = &self.logging;
        let level = if verbose {
            "debug".to_string()
        } else {
            non_empty(l.level.as_deref())
                .unwrap_or(DEFAULT_LOG_LEVEL)
                .to_string()
        };
        let file = match l.file.unwrap_or_default() {
            FileSinkKind::Rotating => FileSink::Rotating {
                max_bytes: l.max_bytes.unwrap_or(DEFAULT_LOG_MAX_BYTES),
                backups: l.backups.unwrap_or(DEFAULT_LOG_BACKUPS),
            },
            FileSinkKind::Plain => FileSink::Plain,
            FileSinkKind::None => FileSink::None,
        };

        LogSettings {
            level,
            file,
            console: l.console.unwrap_or(true),
            dir: non_empty_path(l.dir.as_ref())
                .map(|p| resolve_against(base, p))
                .unwrap_or_else(|| base.join(DEFAULT_LOG_DIR)),
            file_name: format!("{}_{}.log", target.platform(), target.streamer()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn non_empty_path(value: Option<&PathBuf>) -> Option<&PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}
