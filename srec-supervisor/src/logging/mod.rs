//! Logging setup.
//!
//! The subscriber is built from an explicit [`LogSettings`] value resolved
//! from the config file; nothing is picked up implicitly except `RUST_LOG`,
//! which overrides the configured level.
//!
//! Sinks:
//! - console (stdout)
//! - a size-capped rotating file with numbered backups, a single growing
//!   file, or no file at all

mod format;
mod rotating;

pub use format::{LineFormat, TIMESTAMP_FORMAT};
pub use rotating::SizeRotatingWriter;

use std::path::PathBuf;

use serde::Deserialize;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

use crate::utils::fs::ensure_dir_all_sync_with_op;
use crate::{Error, Result};

/// Kind of file sink, as named in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSinkKind {
    #[default]
    Rotating,
    Plain,
    None,
}

/// File sink with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSink {
    Rotating { max_bytes: u64, backups: usize },
    Plain,
    None,
}

/// Fully resolved logging options.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Filter directive, e.g. `info` or `srec_supervisor=debug,process_utils=info`.
    pub level: String,
    pub file: FileSink,
    pub console: bool,
    pub dir: PathBuf,
    pub file_name: String,
}

impl LogSettings {
    /// Path of the active log file, if a file sink is configured.
    pub fn file_path(&self) -> Option<PathBuf> {
        match self.file {
            FileSink::None => None,
            _ => Some(self.dir.join(&self.file_name)),
        }
    }
}

/// Keeps the background file writer alive; drop it last to flush.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Build the subscriber described by `settings` without installing it.
pub fn build_subscriber(
    settings: &LogSettings,
) -> Result<(impl Subscriber + Send + Sync + 'static, LoggingGuard)> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level).map_err(|e| {
            Error::Logging(format!("invalid log level {:?}: {}", settings.level, e))
        })?,
    };

    let console = settings
        .console
        .then(|| fmt::layer().event_format(LineFormat).with_writer(std::io::stdout));

    let (file, guard) = match &settings.file {
        FileSink::None => (None, None),
        sink => {
            ensure_dir_all_sync_with_op("creating log directory", &settings.dir)?;
            let (writer, guard) = match sink {
                FileSink::Rotating { max_bytes, backups } => {
                    let path = settings.dir.join(&settings.file_name);
                    let rotating = SizeRotatingWriter::open(&path, *max_bytes, *backups)
                        .map_err(|e| Error::io_path("opening log file", &path, e))?;
                    tracing_appender::non_blocking(rotating)
                }
                _ => {
                    let appender = RollingFileAppender::builder()
                        .rotation(Rotation::NEVER)
                        .filename_prefix(&settings.file_name)
                        .build(&settings.dir)
                        .map_err(|e| {
                            Error::Logging(format!(
                                "cannot open log file {}: {}",
                                settings.dir.join(&settings.file_name).display(),
                                e
                            ))
                        })?;
                    tracing_appender::non_blocking(appender)
                }
            };
            let layer = fmt::layer()
                .event_format(LineFormat)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file);

    Ok((subscriber, LoggingGuard { _file: guard }))
}

/// Build and install the process-wide subscriber.
pub fn init_logging(settings: &LogSettings) -> Result<LoggingGuard> {
    let (subscriber, guard) = build_subscriber(settings)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Logging(format!("failed to set global subscriber: {e}")))?;
    Ok(guard)
}
