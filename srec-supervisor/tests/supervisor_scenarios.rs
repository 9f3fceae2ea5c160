//! End-to-end supervisor scenarios with fake tools and a fixed clock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use srec_supervisor::capture::{CaptureInvoker, ProcessCaptureInvoker};
use srec_supervisor::config::{AppConfig, Overrides, Secret};
use srec_supervisor::credentials::{CredentialRefresher, RefreshOutcome, RefreshSchedule};
use srec_supervisor::domain::{AttemptOutcome, CaptureTarget, Platform};
use srec_supervisor::storage::StorageLayout;
use srec_supervisor::supervisor::{CycleResult, FixedClock, Supervisor};
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Records every attempt and cancels the run after `stop_after` attempts.
#[derive(Clone)]
struct FakeTool {
    outcome: AttemptOutcome,
    stop_after: usize,
    cancel: CancellationToken,
    calls: Arc<Mutex<Vec<(PathBuf, Instant)>>>,
}

impl FakeTool {
    fn new(outcome: AttemptOutcome, stop_after: usize, cancel: &CancellationToken) -> Self {
        Self {
            outcome,
            stop_after,
            cancel: cancel.clone(),
            calls: Arc::default(),
        }
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl CaptureInvoker for FakeTool {
    async fn capture(&self, output: &Path, _cancel: &CancellationToken) -> AttemptOutcome {
        let mut calls = self.calls.lock().unwrap();
        calls.push((output.to_path_buf(), Instant::now()));
        if calls.len() >= self.stop_after {
            self.cancel.cancel();
        }
        self.outcome.clone()
    }
}

#[derive(Clone, Default)]
struct FakeRefresher(Arc<Mutex<u32>>);

#[async_trait]
impl CredentialRefresher for FakeRefresher {
    async fn refresh(&self, _cancel: &CancellationToken) -> RefreshOutcome {
        *self.0.lock().unwrap() += 1;
        RefreshOutcome::Refreshed
    }
}

fn fixed_clock() -> Box<FixedClock> {
    Box::new(FixedClock(
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap(),
    ))
}

fn alice(platform: Platform) -> CaptureTarget {
    CaptureTarget::new(platform, "alice").unwrap()
}

#[tokio::test(start_paused = true)]
async fn blocked_external_storage_records_only_to_fallback_every_five_seconds() {
    let base = TempDir::new().unwrap();
    // a stale regular file where the drive would be mounted
    let mount = base.path().join("media");
    std::fs::write(&mount, b"").unwrap();
    let external = mount.join("kick");

    let config = AppConfig::parse(
        &format!(
            r#"
            [Settings]
            Platform = "kick"
            RetryTime = 5
            ExternalDir = '{}'
            "#,
            external.display()
        ),
        Path::new("settings.config"),
    )
    .unwrap();
    let resolved = config
        .resolve(&Overrides {
            streamer: "alice",
            platform: None,
            base_dir: base.path(),
            verbose: false,
        })
        .unwrap();
    assert_eq!(resolved.retry_interval, Duration::from_secs(5));
    assert_eq!(resolved.preferred_dir.as_deref(), Some(external.as_path()));

    let storage =
        StorageLayout::prepare(resolved.preferred_dir.as_deref(), &resolved.fallback_dir).unwrap();
    assert!(!storage.preferred_available());
    assert!(resolved.fallback_dir.is_dir());
    assert!(mount.is_file());

    let cancel = CancellationToken::new();
    let tool = FakeTool::new(AttemptOutcome::failure(Some(1), "offline"), 4, &cancel);
    let mut supervisor = Supervisor::new(resolved.target.clone(), storage, Box::new(tool.clone()))
        .with_retry_interval(resolved.retry_interval)
        .with_clock(fixed_clock());

    let cycles = supervisor.run(&cancel).await;

    assert_eq!(cycles, 4);
    let expected = base.path().join("kick").join("alice-20240102-030405.mp4");
    assert!(tool.paths().iter().all(|p| *p == expected));

    let instants = tool.instants();
    for pair in instants.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(5));
    }
}

#[tokio::test]
async fn missing_external_parent_leaves_only_fallback() {
    let temp = TempDir::new().unwrap();
    let fallback = temp.path().join("local");
    let external = temp.path().join("unmounted").join("Videos");

    let storage = StorageLayout::prepare(Some(&external), &fallback).unwrap();

    assert!(fallback.is_dir());
    assert!(!storage.preferred_available());
    assert!(!external.exists());

    let cancel = CancellationToken::new();
    let tool = FakeTool::new(AttemptOutcome::Success, usize::MAX, &cancel);
    let mut supervisor = Supervisor::new(alice(Platform::Twitch), storage, Box::new(tool.clone()))
        .with_clock(fixed_clock());

    let report = supervisor.run_cycle(&cancel).await;

    assert_eq!(report.result, CycleResult::Succeeded);
    assert_eq!(
        tool.paths(),
        vec![fallback.join("alice-20240102-030405.mp4")]
    );
}

#[tokio::test]
async fn failed_external_attempt_retries_on_fallback_with_same_timestamp() {
    let temp = TempDir::new().unwrap();
    let external = temp.path().join("external");
    let fallback = temp.path().join("fallback");
    let storage = StorageLayout::prepare(Some(&external), &fallback).unwrap();
    assert!(storage.preferred_available());

    #[derive(Clone, Default)]
    struct PrimaryFails(Arc<Mutex<Vec<PathBuf>>>);

    #[async_trait]
    impl CaptureInvoker for PrimaryFails {
        async fn capture(&self, output: &Path, _cancel: &CancellationToken) -> AttemptOutcome {
            let mut calls = self.0.lock().unwrap();
            calls.push(output.to_path_buf());
            if calls.len() == 1 {
                AttemptOutcome::failure(Some(1), "ERROR: No space left on device")
            } else {
                AttemptOutcome::Success
            }
        }
    }

    let tool = PrimaryFails::default();
    let mut supervisor = Supervisor::new(alice(Platform::Twitch), storage, Box::new(tool.clone()))
        .with_clock(fixed_clock());

    let report = supervisor.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.result, CycleResult::Succeeded);
    assert_eq!(
        *tool.0.lock().unwrap(),
        vec![
            external.join("alice-20240102-030405.mp4"),
            fallback.join("alice-20240102-030405.mp4"),
        ]
    );
    assert!(report.context.used_fallback);
}

#[tokio::test(start_paused = true)]
async fn credentials_refresh_once_at_startup() {
    let temp = TempDir::new().unwrap();
    let storage = StorageLayout::new(None, temp.path());
    let cancel = CancellationToken::new();
    let tool = FakeTool::new(AttemptOutcome::Success, 5, &cancel);
    let refresher = FakeRefresher::default();

    let mut supervisor = Supervisor::new(alice(Platform::Kick), storage, Box::new(tool.clone()))
        .with_refresher(Box::new(refresher.clone()), RefreshSchedule::once())
        .with_retry_interval(Duration::from_secs(120))
        .with_clock(fixed_clock());

    assert_eq!(supervisor.run(&cancel).await, 5);
    assert_eq!(*refresher.0.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_interval_starts_next_cycle_immediately() {
    let temp = TempDir::new().unwrap();
    let storage = StorageLayout::new(None, temp.path());
    let cancel = CancellationToken::new();
    let tool = FakeTool::new(AttemptOutcome::failure(Some(1), "offline"), 3, &cancel);

    let mut supervisor = Supervisor::new(alice(Platform::Twitch), storage, Box::new(tool.clone()))
        .with_retry_interval(Duration::ZERO)
        .with_clock(fixed_clock());

    let start = Instant::now();
    assert_eq!(supervisor.run(&cancel).await, 3);
    assert!(tool.instants().iter().all(|t| *t == start));
}

#[test]
fn logged_capture_command_hides_twitch_token() {
    let base = TempDir::new().unwrap();
    let config = AppConfig::parse(
        r#"
        [Settings]
        TwitchToken = "abcd1234efgh"
        ClientID = "client-42"
        ExtraArgs = "--twitch-disable-ads --http-header \"Authorization=OAuth abcd1234efgh\""
        "#,
        Path::new("settings.config"),
    )
    .unwrap();
    let resolved = config
        .resolve(&Overrides {
            streamer: "alice",
            platform: None,
            base_dir: base.path(),
            verbose: false,
        })
        .unwrap();

    let invoker = ProcessCaptureInvoker::new(resolved.capture.clone(), &resolved.target);
    let line = invoker
        .command_line(Path::new("/rec/alice.mp4"))
        .display(invoker.redactor());

    assert!(!line.contains("abcd1234efgh"), "token leaked: {line}");
    assert!(line.contains(Secret::MARKER));
    assert!(line.contains("Client-ID=client-42"));
}
