//! Core collector traits and types.

use std::time::Duration;

use thiserror::Error;

use crate::archive::Record;

/// Priority assigned to collectors that do not declare one.
///
/// Lower priorities are truncated first when an archive exceeds its limits.
pub const DEFAULT_PRIORITY: u32 = 10;

/// Errors that can occur during a gather.
///
/// A collector error only removes that collector's records from the archive;
/// it never aborts the cycle.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Filesystem or network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The collector did not finish within its timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The data source is not available right now.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Failed to serialize gathered data.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The collector task panicked.
    #[error("collector panicked: {0}")]
    Panicked(String),
}

/// A pluggable data source contributing records to an archive.
///
/// Collectors are read-only against their source and share no mutable state,
/// so a [`CollectorSet`](super::CollectorSet) runs them concurrently. New data
/// sources are added by implementing this trait; the scheduler never changes.
///
/// # Example
///
/// ```rust
/// use insights_operator::archive::Record;
/// use insights_operator::collector::{Collector, CollectorError};
///
/// struct ClusterVersion;
///
/// #[async_trait::async_trait]
/// impl Collector for ClusterVersion {
///     fn name(&self) -> &str {
///         "cluster-version"
///     }
///
///     async fn gather(&self) -> Result<Vec<Record>, CollectorError> {
///         Ok(vec![Record::new("config/version.json", r#"{"version":"4.3"}"#)])
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Unique source name; also the archive ordering key.
    fn name(&self) -> &str;

    /// Static truncation weight. Higher survives longer.
    fn priority(&self) -> u32 {
        DEFAULT_PRIORITY
    }

    /// Produce this collector's records for one cycle.
    async fn gather(&self) -> Result<Vec<Record>, CollectorError>;
}
