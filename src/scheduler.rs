//! Gather scheduler.
//!
//! Drives the gather → archive → upload → health pipeline once per period.
//! The period and destination are re-read from the support source every
//! cycle and polled while sleeping, so changes take effect without a restart.
//! Ticks are anchored to the start of the previous cycle and never drift.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveBuilder, ArchiveId, ArchiveLimits, DiskRecorder};
use crate::collector::CollectorSet;
use crate::config::{FieldFallback, SupportConfig, SupportSource, format_period};
use crate::health::{HealthState, HealthTracker, Transition};
use crate::status::{StatusHandle, StatusPublisher, status_channel};
use crate::uploader::{UploadAttempt, Uploader};

/// How often the support source is polled while waiting for the next tick.
pub const DEFAULT_CONFIG_POLL: Duration = Duration::from_secs(30);

/// Shortest timeout given to a single collector or upload.
pub const MIN_OPERATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-operation timeout for a cycle running every `interval`.
///
/// Capped at half the interval so a hung operation cannot eat into the next
/// tick, but never below [`MIN_OPERATION_TIMEOUT`].
pub fn bounded_timeout(configured: Duration, interval: Duration) -> Duration {
    configured.min(interval / 2).max(MIN_OPERATION_TIMEOUT)
}

/// Next tick for a cycle that started at `tick`.
fn deadline_after(tick: Instant, interval: Duration) -> Instant {
    tick.checked_add(interval)
        .unwrap_or_else(|| tick + Duration::from_secs(100 * 365 * 24 * 60 * 60))
}

/// What a single cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Configuration the cycle ran with.
    pub config: SupportConfig,
    /// Whether the cycle announced a new gather period.
    pub announced: bool,
    /// Archive built this cycle.
    pub archive_id: ArchiveId,
    /// Records in the archive, manifest excluded.
    pub records: usize,
    /// Collectors that failed or timed out.
    pub failed_collectors: Vec<String>,
    /// The upload attempt.
    pub attempt: UploadAttempt,
    /// Degraded flag flip caused by this cycle, if any.
    pub transition: Option<Transition>,
    /// Health after the attempt.
    pub health: HealthState,
}

/// The single gather worker.
pub struct Scheduler {
    source: Arc<dyn SupportSource>,
    collectors: CollectorSet,
    builder: ArchiveBuilder,
    recorder: Option<DiskRecorder>,
    uploader: Uploader,
    health: HealthTracker,
    status: StatusPublisher,
    config_poll: Duration,

    last_good: Option<SupportConfig>,
    source_failing: bool,
    fallbacks: Vec<FieldFallback>,
    announced: Option<Duration>,
    endpoint: Option<String>,
    cycles: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("source", &self.source.describe())
            .field("collectors", &self.collectors)
            .field("health", &self.health.state())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(source: Arc<dyn SupportSource>, collectors: CollectorSet, uploader: Uploader) -> Self {
        let (status, _) = status_channel();
        Self {
            source,
            collectors,
            builder: ArchiveBuilder::default(),
            recorder: None,
            uploader,
            health: HealthTracker::new(),
            status,
            config_poll: DEFAULT_CONFIG_POLL,
            last_good: None,
            source_failing: false,
            fallbacks: Vec::new(),
            announced: None,
            endpoint: None,
            cycles: 0,
        }
    }

    /// Set archive size limits.
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.builder = ArchiveBuilder::new(limits);
        self
    }

    /// Write every archive to disk before uploading it.
    pub fn with_recorder(mut self, recorder: DiskRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Replace the health tracker.
    pub fn with_health(mut self, health: HealthTracker) -> Self {
        self.health = health;
        self
    }

    /// Set how often configuration is polled between ticks.
    pub fn with_config_poll(mut self, poll: Duration) -> Self {
        self.config_poll = poll.max(Duration::from_millis(10));
        self
    }

    /// A read handle on the published status.
    pub fn status(&self) -> StatusHandle {
        self.status.subscribe()
    }

    /// Current upload health.
    pub fn health(&self) -> HealthState {
        self.health.state()
    }

    /// Completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until `cancel` fires.
    ///
    /// The first cycle starts immediately. A running cycle is never
    /// interrupted; cancellation is observed between cycles and while asleep.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(source = %self.source.describe(), "Starting gather scheduler");

        while !cancel.is_cancelled() {
            let tick = Instant::now();
            let report = self.run_cycle().await;

            let mut interval = report.config.interval;
            let mut deadline = deadline_after(tick, interval);
            loop {
                let wake = Instant::now()
                    .checked_add(self.config_poll)
                    .map_or(deadline, |poll| poll.min(deadline));
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep_until(wake) => {}
                }
                if Instant::now() >= deadline {
                    break;
                }

                let config = self.read_config().await;
                if config.interval != interval {
                    self.apply(&config);
                    interval = config.interval;
                    deadline = deadline_after(tick, interval);
                }
            }
        }

        tracing::info!(cycles = self.cycles, "Gather scheduler stopped");
    }

    /// Run one gather → archive → upload → health cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let config = self.read_config().await;
        let announced = self.apply(&config);

        let collector_limit = bounded_timeout(self.collectors.timeout(), config.interval);
        let outputs = self.collectors.gather_within(collector_limit).await;
        let failed_collectors: Vec<String> = outputs
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.source.clone())
            .collect();

        let archive = Arc::new(self.builder.build(outputs));

        let attempt = match archive.encode() {
            Ok(payload) => {
                if let Some(recorder) = &self.recorder {
                    if let Err(e) = recorder.record(&archive, &payload).await {
                        tracing::warn!(
                            archive_id = %archive.id(),
                            error = %e,
                            "Unable to record archive to disk"
                        );
                    }
                }
                let upload_limit = bounded_timeout(self.uploader.timeout(), config.interval);
                self.uploader
                    .upload_within(&archive, &payload, &config, upload_limit)
                    .await
            }
            Err(e) => {
                tracing::error!(archive_id = %archive.id(), error = %e, "Unable to encode archive");
                UploadAttempt::local_failure(archive.id(), format!("unable to encode archive: {e}"))
            }
        };

        let transition = self.health.record(&attempt);
        let health = self.health.state();
        self.cycles += 1;

        let cycles = self.cycles;
        let published_attempt = attempt.clone();
        let published_archive = Arc::clone(&archive);
        self.status.update(move |status| {
            status.health = health;
            status.cycles = cycles;
            status.last_upload = Some(published_attempt);
            status.latest_archive = Some(published_archive);
        });

        tracing::debug!(
            cycle = cycles,
            archive_id = %archive.id(),
            records = archive.len(),
            failed_collectors = failed_collectors.len(),
            outcome = %attempt.outcome,
            consecutive_failures = health.consecutive_failures,
            "Gather cycle complete"
        );

        CycleReport {
            config,
            announced,
            archive_id: archive.id(),
            records: archive.len(),
            failed_collectors,
            attempt,
            transition,
            health,
        }
    }

    /// Read the support configuration, falling back to the last known-good
    /// one when the source is unreadable.
    async fn read_config(&mut self) -> SupportConfig {
        match self.source.load().await {
            Ok(bundle) => {
                if self.source_failing {
                    tracing::info!(source = %self.source.describe(), "Support configuration readable again");
                    self.source_failing = false;
                }

                let (config, fallbacks) = match bundle {
                    Some(bundle) => SupportConfig::from_bundle(&bundle),
                    None => (SupportConfig::default(), Vec::new()),
                };
                if fallbacks != self.fallbacks {
                    for fallback in &fallbacks {
                        tracing::warn!(
                            field = fallback.field,
                            reason = %fallback.reason,
                            "Ignoring invalid support configuration value, using default"
                        );
                    }
                    self.fallbacks = fallbacks;
                }

                self.last_good = Some(config.clone());
                config
            }
            Err(e) => {
                let config = self.last_good.clone();
                if !self.source_failing {
                    self.source_failing = true;
                    if config.is_some() {
                        tracing::warn!(
                            source = %self.source.describe(),
                            error = %e,
                            "Unable to read support configuration, keeping last known good"
                        );
                    } else {
                        tracing::warn!(
                            source = %self.source.describe(),
                            error = %e,
                            "Unable to read support configuration, using built-in defaults"
                        );
                    }
                }
                config.unwrap_or_default()
            }
        }
    }

    /// Make `config` effective. Returns whether a new period was announced.
    fn apply(&mut self, config: &SupportConfig) -> bool {
        if self.endpoint.as_deref() != Some(config.endpoint.as_str()) {
            if let Some(previous) = &self.endpoint {
                tracing::info!(from = %previous, to = %config.endpoint, "Upload endpoint changed");
            }
            self.endpoint = Some(config.endpoint.clone());
        }

        let announced = self.announced != Some(config.interval);
        if announced {
            tracing::info!("Gathering cluster info every {}", format_period(config.interval));
            self.announced = Some(config.interval);
        }

        let interval = config.interval;
        let endpoint = config.endpoint.clone();
        self.status.update(move |status| {
            status.interval = Some(interval);
            status.endpoint = Some(endpoint);
        });

        announced
    }
}
