//! # Progress Reporting
//!
//! Periodic progress telemetry and the next-item threshold.
//!
//! ## Overview
//!
//! - [`ReportingContext`] holds the per-item threshold and its fired flag.
//! - [`ProgressReporter`] is a cancellable ticker. Each tick is delivered to
//!   the session tagged with a generation; ticks from a cancelled reporter
//!   are rejected by [`ProgressReporter::is_current`].
//! - [`ReportQueue`] sends start/progress/stopped reports in order on a
//!   single worker task. Failures are logged and dropped.

use crate::model::{PlayableItem, Ticks};
use crate::service::{MediaService, PlaybackReport};
use core_runtime::config::PlaybackConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ============================================================================
// Reporting Context
// ============================================================================

/// Next-item threshold bookkeeping for the current item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportingContext {
    threshold: Option<Ticks>,
    fired: bool,
}

impl ReportingContext {
    pub fn for_item(item: &PlayableItem, config: &PlaybackConfig) -> Self {
        Self {
            threshold: item
                .runtime
                .and_then(|runtime| Self::compute_threshold(runtime, config)),
            fired: false,
        }
    }

    /// Position at which the next item is announced, `None` for short items.
    pub fn compute_threshold(runtime: Ticks, config: &PlaybackConfig) -> Option<Ticks> {
        let min = Ticks::from_millis(config.threshold_min_runtime_ms as i64);
        let long = Ticks::from_millis(config.threshold_long_runtime_ms as i64);

        if runtime <= min {
            None
        } else if runtime > long {
            Some(runtime - Ticks::from_millis(config.threshold_long_offset_ms as i64))
        } else {
            Some(runtime - Ticks::from_millis(config.threshold_short_offset_ms as i64))
        }
    }

    pub fn threshold(&self) -> Option<Ticks> {
        self.threshold
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Returns `true` exactly once per item, the first time `position`
    /// reaches the threshold while a next item exists.
    pub fn should_fire(&mut self, position: Ticks, has_next: bool) -> bool {
        match self.threshold {
            Some(threshold) if has_next && !self.fired && position >= threshold => {
                self.fired = true;
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Progress Reporter
// ============================================================================

/// Cancellable periodic ticker. The first tick fires immediately.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    generation: u64,
    token: Option<CancellationToken>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh ticker, cancelling any previous one. Returns its
    /// generation.
    pub fn start<T, F>(&mut self, interval: Duration, tx: mpsc::UnboundedSender<T>, make: F) -> u64
    where
        T: Send + 'static,
        F: Fn(u64) -> T + Send + 'static,
    {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(make(generation)).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(generation, "Progress reporter stopped");
        });

        self.token = Some(token);
        generation
    }

    /// Cancel the ticker. Ticks already queued become stale.
    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            self.generation += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.token.is_some() && generation == self.generation
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Report Queue
// ============================================================================

#[derive(Debug)]
enum ReportJob {
    Start(PlaybackReport),
    Progress(PlaybackReport),
    Stopped(PlaybackReport),
}

impl ReportJob {
    fn kind(&self) -> &'static str {
        match self {
            ReportJob::Start(_) => "start",
            ReportJob::Progress(_) => "progress",
            ReportJob::Stopped(_) => "stopped",
        }
    }
}

/// Ordered, fire-and-forget telemetry.
pub struct ReportQueue {
    tx: Option<mpsc::UnboundedSender<ReportJob>>,
    worker: Option<JoinHandle<()>>,
}

impl ReportQueue {
    pub fn new(service: Arc<dyn MediaService>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ReportJob>();

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let kind = job.kind();
                let result = match &job {
                    ReportJob::Start(report) => service.report_start(report).await,
                    ReportJob::Progress(report) => service.report_progress(report).await,
                    ReportJob::Stopped(report) => service.report_stopped(report).await,
                };
                if let Err(e) = result {
                    warn!(report = kind, error = %e, "Playback report failed");
                }
            }
        });

        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    pub fn start(&self, report: PlaybackReport) {
        self.push(ReportJob::Start(report));
    }

    pub fn progress(&self, report: PlaybackReport) {
        self.push(ReportJob::Progress(report));
    }

    pub fn stopped(&self, report: PlaybackReport) {
        self.push(ReportJob::Stopped(report));
    }

    fn push(&self, job: ReportJob) {
        match &self.tx {
            Some(tx) => {
                if tx.send(job).is_err() {
                    warn!("Report worker gone, dropping report");
                }
            }
            None => debug!(report = job.kind(), "Report queue closed, dropping report"),
        }
    }

    /// Stop accepting reports and wait for queued ones to be sent.
    pub async fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Report worker terminated abnormally");
            }
        }
    }
}
