//! Insights Operator - periodic cluster data gathering
//!
//! This crate gathers diagnostic data from a set of collectors, packages it
//! into an archive, uploads the archive to a remote ingress and tracks upload
//! health. It can be embedded as a library or run as the standalone
//! `insights-operator` binary.
//!
//! # Architecture
//!
//! - **Config**: process configuration (YAML) and the support bundle
//!   (endpoint, interval, credential) re-read every cycle
//! - **Collectors**: pluggable data sources run concurrently per cycle
//! - **Archive**: immutable per-cycle bundle, tar.gz encoding, disk retention
//! - **Uploader**: one classified upload attempt per cycle
//! - **Health**: consecutive failure counter with a degraded threshold
//! - **Scheduler**: the drift-free gather loop tying it together
//! - **Server**: read-only status endpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use insights_operator::{CollectorSet, DirectorySource, OperatorInfoCollector, Scheduler, Uploader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(DirectorySource::new("/var/run/secrets/support"));
//! let collectors = CollectorSet::default().with(OperatorInfoCollector::new());
//! let uploader = Uploader::new(Duration::from_secs(60))?;
//!
//! let scheduler = Scheduler::new(source, collectors, uploader);
//! scheduler.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod collector;
pub mod config;
pub mod health;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod uploader;

pub use archive::{Archive, ArchiveBuilder, ArchiveError, ArchiveId, DiskRecorder, Record};
pub use collector::{
    Collector, CollectorError, CollectorSet, FileCollector, FileCollectorConfig,
    OperatorInfoCollector,
};
pub use config::{
    AppConfig, ConfigError, Credential, DirectorySource, MemorySource, SupportConfig,
    SupportSource,
};
pub use health::{DEGRADED_THRESHOLD, HealthState, HealthTracker, Transition};
pub use scheduler::{CycleReport, Scheduler};
pub use status::{OperatorStatus, StatusHandle};
pub use uploader::{UploadAttempt, UploadOutcome, Uploader};
