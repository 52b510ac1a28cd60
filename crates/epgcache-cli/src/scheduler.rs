//! Refresh cycle (fetch, transform, store) and its hourly driver.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use epgcache_api::{ChannelSet, FetchWindow, Guide, GuideSource, UpstreamError};
use epgcache_store::{CacheStore, StoreError};
use epgcache_xmltv::{XmltvError, transform};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::instrument;

use crate::schedule::RefreshSchedule;

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per cycle, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_attempt`-th failure (1-based), doubling each time.
    #[must_use]
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let factor = 2_u32
            .checked_pow(failed_attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

/// Phase of the refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// No cycle running; the last one succeeded (or none ran yet).
    #[default]
    Idle,
    /// Calling the upstream API.
    Fetching,
    /// Building and serializing the XMLTV document.
    Transforming,
    /// Persisting the artifact.
    Storing,
    /// No cycle running; the last one failed.
    Failed,
}

/// Snapshot of the scheduler's bookkeeping, served by `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// Current phase.
    pub state: CycleState,
    /// End of the last successful cycle.
    pub last_success: Option<DateTime<Utc>>,
    /// End of the last failed cycle.
    pub last_failure: Option<DateTime<Utc>>,
    /// Error of the last failed cycle.
    pub last_error: Option<String>,
    /// Failed cycles since the last success.
    pub consecutive_failures: u32,
    /// Ticks dropped because a cycle was already running.
    pub cycles_skipped: u64,
    /// Programmes in the last published artifact.
    pub last_programmes: usize,
    /// Records dropped by the last successful cycle.
    pub last_rejected: usize,
    /// Next scheduled tick.
    pub next_run: Option<DateTime<Utc>>,
}

/// Shared, lock-protected [`SchedulerStatus`].
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<SchedulerStatus>,
}

impl StatusBoard {
    /// Returns a copy of the current status.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut SchedulerStatus)) {
        let mut status = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    fn set_state(&self, state: CycleState) {
        self.update(|s| s.state = state);
    }
}

/// Why a cycle did not publish.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// Upstream failed permanently, or transiently on every attempt.
    #[error("upstream fetch failed after {attempts} attempt(s): {source}")]
    Upstream {
        /// Attempts made.
        attempts: u32,
        /// Last upstream error.
        source: UpstreamError,
    },
    /// The upstream listing held none of the requested channels.
    #[error("upstream returned no channels")]
    EmptyGuide,
    /// The document could not be serialized.
    #[error(transparent)]
    Serialize(#[from] XmltvError),
    /// The artifact could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    StoreTask(#[from] tokio::task::JoinError),
}

/// Counts of a published cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// Channels in the artifact.
    pub channels: usize,
    /// Programmes in the artifact.
    pub programmes: usize,
    /// Records dropped (undecodable, malformed or on unknown channels).
    pub rejected: usize,
    /// Artifact size.
    pub bytes: usize,
}

/// Result of [`RefreshScheduler::run_cycle`].
#[derive(Debug)]
pub enum CycleOutcome {
    /// A new artifact was published.
    Published(CycleSummary),
    /// Another cycle was running; nothing was done.
    Skipped,
    /// The cycle failed; the previous artifact is still served.
    Failed(CycleError),
}

/// Fixed inputs of every cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    /// Channels to fetch.
    pub channels: ChannelSet,
    /// How far back from the cycle start to keep programmes.
    pub past: Option<TimeDelta>,
    /// How far ahead of the cycle start to keep programmes.
    pub future: Option<TimeDelta>,
    /// Transient failure handling.
    pub retry: RetryPolicy,
}

/// Runs refresh cycles, at most one at a time.
#[derive(Debug)]
pub struct RefreshScheduler<S> {
    source: S,
    store: Arc<dyn CacheStore>,
    options: RefreshOptions,
    running: tokio::sync::Mutex<()>,
    status: Arc<StatusBoard>,
}

impl<S> RefreshScheduler<S>
where
    S: GuideSource + Send + Sync + 'static,
{
    /// Creates a scheduler publishing into `store`.
    pub fn new(source: S, store: Arc<dyn CacheStore>, options: RefreshOptions) -> Self {
        Self {
            source,
            store,
            options,
            running: tokio::sync::Mutex::new(()),
            status: Arc::new(StatusBoard::default()),
        }
    }

    /// Status shared with the HTTP endpoint.
    #[must_use]
    pub fn status(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.status)
    }

    /// Runs one fetch, transform and store cycle.
    ///
    /// Returns [`CycleOutcome::Skipped`] without doing anything if another
    /// cycle is in progress. Failures are logged and recorded in the status;
    /// they never touch the published artifact.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("Refresh cycle already running, skipping tick");
            self.status
                .update(|s| s.cycles_skipped = s.cycles_skipped.saturating_add(1));
            return CycleOutcome::Skipped;
        };

        match self.execute_cycle().await {
            Ok(summary) => {
                self.status.update(|s| {
                    s.state = CycleState::Idle;
                    s.last_success = Some(Utc::now());
                    s.last_error = None;
                    s.consecutive_failures = 0;
                    s.last_programmes = summary.programmes;
                    s.last_rejected = summary.rejected;
                });
                tracing::info!(
                    channels = summary.channels,
                    programmes = summary.programmes,
                    rejected = summary.rejected,
                    bytes = summary.bytes,
                    "Refresh cycle completed"
                );
                CycleOutcome::Published(summary)
            }
            Err(e) => {
                let mut failures = 0;
                self.status.update(|s| {
                    s.state = CycleState::Failed;
                    s.last_failure = Some(Utc::now());
                    s.last_error = Some(e.to_string());
                    s.consecutive_failures = s.consecutive_failures.saturating_add(1);
                    failures = s.consecutive_failures;
                });
                tracing::error!(
                    error = %e,
                    consecutive_failures = failures,
                    "Refresh cycle failed, keeping previous artifact"
                );
                CycleOutcome::Failed(e)
            }
        }
    }

    async fn execute_cycle(&self) -> Result<CycleSummary, CycleError> {
        self.status.set_state(CycleState::Fetching);
        let window = FetchWindow::around(Utc::now(), self.options.past, self.options.future);
        let guide = self.fetch_with_retry(&window).await?;
        if guide.channels.is_empty() {
            return Err(CycleError::EmptyGuide);
        }

        self.status.set_state(CycleState::Transforming);
        let skipped = guide.skipped_assets;
        let (document, report) = transform(guide.programmes, &guide.channels);
        let xml = document.to_xml()?;

        self.status.set_state(CycleState::Storing);
        let store = Arc::clone(&self.store);
        let artifact = tokio::task::spawn_blocking(move || store.write(Bytes::from(xml))).await??;

        Ok(CycleSummary {
            channels: document.channels().len(),
            programmes: report.accepted,
            rejected: report.rejected.len().saturating_add(skipped),
            bytes: artifact.len(),
        })
    }

    async fn fetch_with_retry(&self, window: &FetchWindow) -> Result<Guide, CycleError> {
        let retry = &self.options.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            match self.source.fetch(&self.options.channels, window).await {
                Ok(guide) => return Ok(guide),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = retry.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        ?delay,
                        error = %e,
                        "Transient upstream error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    return Err(CycleError::Upstream {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Drives cycles forever: one per schedule tick, one per `trigger`
    /// notification, and optionally one immediately.
    pub async fn run(
        self: Arc<Self>,
        schedule: RefreshSchedule,
        trigger: Arc<Notify>,
        refresh_on_start: bool,
    ) {
        if refresh_on_start {
            tracing::info!("Running initial refresh");
            self.spawn_cycle();
        }

        // Last tick target; never fire the same target twice if the clock
        // reads slightly early on wake-up.
        let mut last_target: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let from = last_target.map_or(now, |t| t.max(now));
            let next = schedule.next_after(from);
            self.status.update(|s| s.next_run = Some(next));
            let wait = next.signed_duration_since(now).to_std().unwrap_or_default();
            tracing::debug!(next_run = %next, "Next refresh scheduled");

            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    last_target = Some(next);
                    tracing::info!(tick = %next, "Scheduled refresh");
                }
                () = trigger.notified() => {
                    tracing::info!("Refresh requested");
                }
            }
            self.spawn_cycle();
        }
    }

    fn spawn_cycle(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_cycle().await;
        });
    }
}
