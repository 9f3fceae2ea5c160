mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use srec_supervisor::capture::ProcessCaptureInvoker;
use srec_supervisor::config::{AppConfig, CONFIG_FILE_NAME, Overrides};
use srec_supervisor::credentials::{CurlCookieRefresher, RefreshSchedule};
use srec_supervisor::logging::{self, LoggingGuard};
use srec_supervisor::storage::StorageLayout;
use srec_supervisor::supervisor::Supervisor;
use srec_supervisor::utils::fs::resolve_against;
use srec_supervisor::{Error, Result, panic_hook};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{Args, ParseFailure};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse_from_env() {
        Ok(args) => args,
        Err(ParseFailure::MissingStreamer(usage)) => {
            println!("{usage}");
            return ExitCode::FAILURE;
        }
        Err(ParseFailure::Clap(e)) => e.exit(),
    };

    // Held until exit so buffered log lines are flushed.
    let mut guard = None;
    match run(args, &mut guard).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if guard.is_some() {
                error!("Startup failed: {}", e);
            }
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, guard: &mut Option<LoggingGuard>) -> Result<()> {
    let base_dir = match &args.base_dir {
        Some(dir) => dir.clone(),
        None => executable_dir()?,
    };
    let config_path = args
        .config
        .as_deref()
        .map(|p| resolve_against(&base_dir, p))
        .unwrap_or_else(|| base_dir.join(CONFIG_FILE_NAME));

    let config = AppConfig::load(&config_path)?;
    let resolved = config.resolve(&Overrides {
        streamer: &args.streamer,
        platform: args.platform,
        base_dir: &base_dir,
        verbose: args.verbose,
    })?;

    *guard = Some(logging::init_logging(&resolved.log)?);
    panic_hook::install(resolved.log.file_path());

    let target = &resolved.target;
    info!("=== Starting srec-supervisor for {} ===", target.streamer());
    info!("Stream URL: {}", target.stream_url());
    info!("Config: {}", config_path.display());

    let binary = resolved.capture.binary();
    match process_utils::probe_version(binary) {
        Some(version) => info!("Capture tool: {} ({})", binary, version),
        None => warn!("Capture tool {} did not answer --version; attempts may fail", binary),
    }

    let storage = StorageLayout::prepare(resolved.preferred_dir.as_deref(), &resolved.fallback_dir)?;

    let invoker = ProcessCaptureInvoker::new(resolved.capture.clone(), target);
    let mut supervisor = Supervisor::new(target.clone(), storage, Box::new(invoker))
        .with_retry_interval(resolved.retry_interval)
        .with_policy(resolved.fallback_policy);
    if let Some(cookie_refresh) = resolved.cookie_refresh.clone() {
        supervisor = supervisor.with_refresher(
            Box::new(CurlCookieRefresher::new(cookie_refresh)),
            RefreshSchedule::new(resolved.refresh_every),
        );
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    supervisor.run(&cancel).await;
    Ok(())
}

/// Cancel `token` on Ctrl-C or, on Unix, SIGTERM.
async fn cancel_on_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    token.cancel();
}

fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::Other(format!("{} has no parent directory", exe.display())))
}
