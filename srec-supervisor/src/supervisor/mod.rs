//! Supervisor loop and the per-cycle retry/fallback state machine.
//!
//! A cycle is:
//! 1. refresh credentials if the schedule says so
//! 2. stamp an output file name with the current time
//! 3. attempt the primary destination, escalating to fallback on failure
//! 4. sleep for the retry interval
//!
//! Cycles repeat until the cancellation token fires. Nothing that happens
//! inside a cycle stops the loop.

mod clock;
mod policy;

pub use clock::{Clock, FixedClock, SystemClock};
pub use policy::FallbackPolicy;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::CaptureInvoker;
use crate::credentials::{CredentialRefresher, RefreshOutcome, RefreshSchedule};
use crate::domain::{AttemptOutcome, CaptureTarget};
use crate::storage::StorageLayout;
use crate::utils::filename::output_filename;

/// Per-cycle record, created fresh each cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleContext {
    pub timestamp: NaiveDateTime,
    pub output_filename: String,
    /// Destination of the most recent attempt.
    pub chosen_path: PathBuf,
    pub used_fallback: bool,
}

/// One capture attempt within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub path: PathBuf,
    pub fallback: bool,
    pub outcome: AttemptOutcome,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Succeeded,
    Failed,
    Interrupted,
}

/// Everything that happened in one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub context: CycleContext,
    /// `Some` when a refresh was due this cycle.
    pub refresh: Option<RefreshOutcome>,
    pub attempts: Vec<AttemptRecord>,
    pub result: CycleResult,
}

/// Drives capture cycles for a single streamer.
pub struct Supervisor {
    target: CaptureTarget,
    storage: StorageLayout,
    invoker: Box<dyn CaptureInvoker>,
    refresher: Option<Box<dyn CredentialRefresher>>,
    schedule: RefreshSchedule,
    retry_interval: Duration,
    policy: FallbackPolicy,
    clock: Box<dyn Clock>,
}

impl Supervisor {
    pub fn new(
        target: CaptureTarget,
        storage: StorageLayout,
        invoker: Box<dyn CaptureInvoker>,
    ) -> Self {
        let retry_interval = Duration::from_secs(target.platform().default_retry_secs());
        Self {
            target,
            storage,
            invoker,
            refresher: None,
            schedule: RefreshSchedule::once(),
            retry_interval,
            policy: FallbackPolicy::default(),
            clock: Box::new(SystemClock),
        }
    }

    /// Refresh credentials with `refresher` on the given schedule.
    pub fn with_refresher(
        mut self,
        refresher: Box<dyn CredentialRefresher>,
        schedule: RefreshSchedule,
    ) -> Self {
        self.refresher = Some(refresher);
        self.schedule = schedule;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Run cycles until `cancel` fires. Returns the number of cycles started.
    pub async fn run(&mut self, cancel: &CancellationToken) -> u64 {
        let mut cycles = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            cycles += 1;
            let report = self.run_cycle(cancel).await;
            if report.result == CycleResult::Interrupted {
                break;
            }

            info!("Sleeping {}s", self.retry_interval.as_secs());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }

        info!("Stopped by user");
        cycles
    }

    /// Run one cycle to completion.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleReport {
        let refresh = self.refresh_if_due(cancel).await;

        let timestamp = self.clock.now();
        let filename = output_filename(self.target.streamer(), timestamp);
        let destinations = self.storage.destinations(&filename);
        let fallback = destinations.fallback;

        let mut report = CycleReport {
            context: CycleContext {
                timestamp,
                output_filename: filename,
                chosen_path: destinations.primary.clone().unwrap_or_else(|| fallback.clone()),
                used_fallback: destinations.primary.is_none(),
            },
            refresh,
            attempts: Vec::with_capacity(2),
            result: CycleResult::Interrupted,
        };

        if cancel.is_cancelled() {
            return report;
        }

        if let Some(primary) = destinations.primary {
            let outcome = self.attempt(&primary, false, cancel).await;
            let escalate = self.policy.should_fall_back(&outcome) && primary != fallback;
            let class = outcome.failure_class();
            report.attempts.push(AttemptRecord {
                path: primary,
                fallback: false,
                outcome,
            });

            if !escalate {
                report.result = cycle_result(&report.attempts);
                if report.result == CycleResult::Failed {
                    error!(
                        "Cycle failed for {}; not falling back (policy: {})",
                        report.context.output_filename,
                        self.policy.as_str()
                    );
                }
                return report;
            }

            match class {
                Some(class) if class.is_storage() => {
                    warn!("Switching to fallback due to {} error", class)
                }
                _ => warn!("Switching to fallback: {}", fallback.display()),
            }
        } else {
            debug!("External storage unavailable; recording to fallback only");
        }

        report.context.chosen_path = fallback.clone();
        report.context.used_fallback = true;

        let outcome = self.attempt(&fallback, true, cancel).await;
        report.attempts.push(AttemptRecord {
            path: fallback,
            fallback: true,
            outcome,
        });
        report.result = cycle_result(&report.attempts);
        if report.result == CycleResult::Failed {
            error!(
                "Cycle failed: all attempts for {} failed",
                report.context.output_filename
            );
        }

        report
    }

    async fn refresh_if_due(&mut self, cancel: &CancellationToken) -> Option<RefreshOutcome> {
        if self.refresher.is_none() || !self.schedule.tick() {
            return None;
        }
        let refresher = self.refresher.as_ref()?;

        let outcome = refresher.refresh(cancel).await;
        match &outcome {
            RefreshOutcome::Refreshed => debug!("Credentials refreshed"),
            RefreshOutcome::Skipped => {}
            RefreshOutcome::Failed { .. } => {
                warn!("Continuing with existing credentials after refresh failure")
            }
            RefreshOutcome::Interrupted => debug!("Credential refresh interrupted"),
        }
        Some(outcome)
    }

    async fn attempt(
        &self,
        path: &Path,
        fallback: bool,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let location = if fallback { "fallback" } else { "external" };
        info!("Recording {} to {} ({})", self.target.streamer(), path.display(), location);

        let outcome = self.invoker.capture(path, cancel).await;
        match &outcome {
            AttemptOutcome::Success => info!("Recording finished: {}", path.display()),
            AttemptOutcome::ToolFailure {
                exit_code,
                diagnostic,
            } => {
                let code = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
                error!(
                    "Recording to {} failed (exit code {}): {}",
                    path.display(),
                    code,
                    diagnostic.trim_end()
                );
            }
            AttemptOutcome::Interrupted => info!("Recording interrupted: {}", path.display()),
        }
        outcome
    }
}

fn cycle_result(attempts: &[AttemptRecord]) -> CycleResult {
    match attempts.last().map(|a| &a.outcome) {
        Some(AttemptOutcome::Success) => CycleResult::Succeeded,
        Some(AttemptOutcome::ToolFailure { .. }) => CycleResult::Failed,
        Some(AttemptOutcome::Interrupted) | None => CycleResult::Interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Platform;
    use crate::storage::StorageOption;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct ScriptedInvoker {
        outcomes: Arc<Mutex<VecDeque<AttemptOutcome>>>,
        calls: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl ScriptedInvoker {
        fn new(outcomes: impl IntoIterator<Item = AttemptOutcome>) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> Vec<PathBuf> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CaptureInvoker for ScriptedInvoker {
        async fn capture(&self, output: &Path, _cancel: &CancellationToken) -> AttemptOutcome {
            self.calls.lock().unwrap().push(output.to_path_buf());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(AttemptOutcome::Success)
        }
    }

    #[derive(Clone, Default)]
    struct CountingRefresher(Arc<Mutex<u32>>);

    #[async_trait]
    impl CredentialRefresher for CountingRefresher {
        async fn refresh(&self, _cancel: &CancellationToken) -> RefreshOutcome {
            *self.0.lock().unwrap() += 1;
            RefreshOutcome::Refreshed
        }
    }

    fn clock() -> Box<dyn Clock> {
        Box::new(FixedClock(
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
        ))
    }

    fn layout(preferred_writable: Option<bool>) -> StorageLayout {
        StorageLayout::new(
            preferred_writable.map(|writable| StorageOption {
                path: PathBuf::from("/mnt/ext"),
                writable,
            }),
            "/home/rec/kick",
        )
    }

    fn supervisor(layout: StorageLayout, invoker: &ScriptedInvoker) -> Supervisor {
        let target = CaptureTarget::new(Platform::Kick, "alice").unwrap();
        Supervisor::new(target, layout, Box::new(invoker.clone())).with_clock(clock())
    }

    #[test]
    fn test_defaults_follow_platform() {
        let invoker = ScriptedInvoker::default();
        let s = supervisor(layout(None), &invoker);
        assert_eq!(s.retry_interval(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_primary_success_is_single_attempt() {
        let invoker = ScriptedInvoker::new([AttemptOutcome::Success]);
        let mut s = supervisor(layout(Some(true)), &invoker);

        let report = s.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.result, CycleResult::Succeeded);
        assert_eq!(
            invoker.calls(),
            vec![PathBuf::from("/mnt/ext/alice-20240102-030405.mp4")]
        );
        assert!(!report.context.used_fallback);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_with_same_name() {
        let invoker = ScriptedInvoker::new([
            AttemptOutcome::failure(Some(1), "No space left on device"),
            AttemptOutcome::Success,
        ]);
        let mut s = supervisor(layout(Some(true)), &invoker);

        let report = s.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.result, CycleResult::Succeeded);
        assert_eq!(
            invoker.calls(),
            vec![
                PathBuf::from("/mnt/ext/alice-20240102-030405.mp4"),
                PathBuf::from("/home/rec/kick/alice-20240102-030405.mp4"),
            ]
        );
        assert!(report.context.used_fallback);
        assert_eq!(
            report.context.chosen_path,
            PathBuf::from("/home/rec/kick/alice-20240102-030405.mp4")
        );
    }

    #[tokio::test]
    async fn test_both_attempts_fail() {
        let invoker = ScriptedInvoker::new([
            AttemptOutcome::failure(Some(1), "offline"),
            AttemptOutcome::failure(Some(1), "offline"),
        ]);
        let mut s = supervisor(layout(Some(true)), &invoker);

        let report = s.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.result, CycleResult::Failed);
        assert_eq!(report.attempts.len(), 2);
        assert!(report.attempts[1].fallback);
    }

    #[tokio::test]
    async fn test_unavailable_preferred_skips_primary() {
        for preferred in [None, Some(false)] {
            let invoker = ScriptedInvoker::new([AttemptOutcome::failure(Some(1), "offline")]);
            let mut s = supervisor(layout(preferred), &invoker);

            let report = s.run_cycle(&CancellationToken::new()).await;

            assert_eq!(report.result, CycleResult::Failed);
            assert_eq!(
                invoker.calls(),
                vec![PathBuf::from("/home/rec/kick/alice-20240102-030405.mp4")]
            );
        }
    }

    #[tokio::test]
    async fn test_storage_errors_policy_keeps_non_storage_failures_on_primary() {
        let invoker = ScriptedInvoker::new([AttemptOutcome::failure(Some(1), "stream offline")]);
        let mut s =
            supervisor(layout(Some(true)), &invoker).with_policy(FallbackPolicy::StorageErrorsOnly);

        let report = s.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.result, CycleResult::Failed);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_primary_does_not_fall_back() {
        let invoker = ScriptedInvoker::new([AttemptOutcome::Interrupted]);
        let mut s = supervisor(layout(Some(true)), &invoker);

        let report = s.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.result, CycleResult::Interrupted);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_same_primary_and_fallback_is_not_retried() {
        let invoker = ScriptedInvoker::new([AttemptOutcome::failure(Some(1), "offline")]);
        let layout = StorageLayout::new(
            Some(StorageOption {
                path: PathBuf::from("/home/rec/kick"),
                writable: true,
            }),
            "/home/rec/kick",
        );
        let mut s = supervisor(layout, &invoker);

        let report = s.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.result, CycleResult::Failed);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_runs_on_schedule() {
        let invoker = ScriptedInvoker::default();
        let refresher = CountingRefresher::default();
        let mut s = supervisor(layout(None), &invoker)
            .with_refresher(Box::new(refresher.clone()), RefreshSchedule::new(2));
        let cancel = CancellationToken::new();

        let mut due = Vec::new();
        for _ in 0..5 {
            due.push(s.run_cycle(&cancel).await.refresh.is_some());
        }

        assert_eq!(due, vec![true, false, true, false, true]);
        assert_eq!(*refresher.0.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_attempt() {
        let invoker = ScriptedInvoker::default();
        let mut s = supervisor(layout(Some(true)), &invoker);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = s.run_cycle(&cancel).await;

        assert_eq!(report.result, CycleResult::Interrupted);
        assert!(invoker.calls().is_empty());
        assert_eq!(s.run(&cancel).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_during_sleep() {
        let invoker = ScriptedInvoker::default();
        let mut s = supervisor(layout(None), &invoker).with_retry_interval(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(75)).await;
            stopper.cancel();
        });

        let cycles = s.run(&cancel).await;

        // cycles start at t=0, 30 and 60; cancelled while sleeping towards 90
        assert_eq!(cycles, 3);
        assert_eq!(invoker.calls().len(), 3);
    }
}
