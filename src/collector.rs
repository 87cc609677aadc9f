//! Collector Layer
//!
//! Pluggable data sources feeding the archive. Every cycle the
//! [`CollectorSet`] runs all collectors concurrently and joins their results
//! before the archive is built.
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait for implementing data sources
//! - [`CollectorSet`]: Concurrent execution with per-collector timeout
//! - [`FileCollector`]: Harvests files below a directory (pod logs, events)
//! - [`OperatorInfoCollector`]: The agent's own metadata
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use insights_operator::collector::{CollectorSet, FileCollector, FileCollectorConfig};
//!
//! # async fn run() {
//! let logs = FileCollectorConfig::new(
//!     "monitoring-logs",
//!     "/var/log/pods/openshift-monitoring",
//!     "config/pod/openshift-monitoring/logs",
//! )
//! .with_extensions(["log"]);
//!
//! let set = CollectorSet::new(Duration::from_secs(30)).with(FileCollector::new(logs));
//! let outputs = set.gather().await;
//! # }
//! ```

pub mod files;
mod operator;
mod set;
mod traits;

pub use files::{FileCollector, FileCollectorConfig};
pub use operator::{OPERATOR_INFO_PATH, OperatorInfoCollector};
pub use set::{CollectorOutput, CollectorSet, DEFAULT_COLLECTOR_TIMEOUT};
pub use traits::{Collector, CollectorError, DEFAULT_PRIORITY};
