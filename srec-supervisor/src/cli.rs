use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use srec_supervisor::domain::Platform;

/// Records one streamer's live stream, forever.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Streamer's channel name
    pub streamer: String,

    /// Streaming platform (overrides `Platform` in the config file)
    #[arg(short, long, value_enum)]
    pub platform: Option<Platform>,

    /// Config file path [default: <base dir>/settings.config]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory relative paths are resolved against [default: executable's directory]
    #[arg(long, env = "SREC_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

/// Outcome of command-line parsing that does not yield [`Args`].
#[derive(Debug)]
pub enum ParseFailure {
    /// No streamer given; carries the usage line.
    MissingStreamer(String),
    /// Anything else, including `--help` and `--version`.
    Clap(clap::Error),
}

impl Args {
    pub fn try_parse_from_env() -> Result<Self, ParseFailure> {
        Self::try_parse_args(std::env::args_os())
    }

    pub fn try_parse_args<I, T>(args: I) -> Result<Self, ParseFailure>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| match e.kind() {
            ErrorKind::MissingRequiredArgument => {
                ParseFailure::MissingStreamer(Self::command().render_usage().to_string())
            }
            _ => ParseFailure::Clap(e),
        })
    }
}
