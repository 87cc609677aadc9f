//! Concurrent execution of all registered collectors for one cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::archive::Record;
use crate::collector::{Collector, CollectorError};

/// Default per-collector timeout (1 minute).
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of one collector in one cycle.
#[derive(Debug)]
pub struct CollectorOutput {
    /// Collector name.
    pub source: String,
    /// Collector truncation weight.
    pub priority: u32,
    /// Wall time spent in the collector.
    pub duration: Duration,
    /// Records, or the collector-local error.
    pub result: Result<Vec<Record>, CollectorError>,
}

impl CollectorOutput {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// The set of collectors run by every gather cycle.
#[derive(Clone)]
pub struct CollectorSet {
    collectors: Vec<Arc<dyn Collector>>,
    timeout: Duration,
}

impl Default for CollectorSet {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR_TIMEOUT)
    }
}

impl std::fmt::Debug for CollectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorSet")
            .field("collectors", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CollectorSet {
    /// Create an empty set with the given per-collector timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            collectors: Vec::new(),
            timeout,
        }
    }

    /// Register a collector.
    pub fn register<C: Collector>(&mut self, collector: C) {
        self.collectors.push(Arc::new(collector));
    }

    /// Register a collector, builder style.
    pub fn with<C: Collector>(mut self, collector: C) -> Self {
        self.register(collector);
        self
    }

    /// Names of all registered collectors, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collectors.iter().map(|c| c.name().to_string()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Configured per-collector timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every collector with the configured timeout.
    pub async fn gather(&self) -> Vec<CollectorOutput> {
        self.gather_within(self.timeout).await
    }

    /// Run every collector concurrently, each bounded by `timeout`.
    ///
    /// Returns only after every collector has finished, failed or timed out.
    /// Output is ordered by source name regardless of completion order.
    pub async fn gather_within(&self, timeout: Duration) -> Vec<CollectorOutput> {
        let tasks = self.collectors.iter().map(|collector| {
            let collector = Arc::clone(collector);
            let source = collector.name().to_string();
            let priority = collector.priority();
            let handle = tokio::spawn(async move {
                let start = Instant::now();
                let result = match tokio::time::timeout(timeout, collector.gather()).await {
                    Ok(result) => result,
                    Err(_) => Err(CollectorError::Timeout(timeout)),
                };
                (result, start.elapsed())
            });
            async move {
                let (result, duration) = match handle.await {
                    Ok(done) => done,
                    Err(e) => (Err(CollectorError::Panicked(e.to_string())), Duration::ZERO),
                };
                CollectorOutput {
                    source,
                    priority,
                    duration,
                    result,
                }
            }
        });

        let mut outputs = futures::future::join_all(tasks).await;
        outputs.sort_by(|a, b| a.source.cmp(&b.source));

        for output in &outputs {
            match &output.result {
                Ok(records) => tracing::debug!(
                    collector = %output.source,
                    records = records.len(),
                    duration_ms = output.duration.as_millis(),
                    "Collector finished"
                ),
                Err(e) => tracing::warn!(
                    collector = %output.source,
                    error = %e,
                    duration_ms = output.duration.as_millis(),
                    "Collector failed, continuing without its records"
                ),
            }
        }

        outputs
    }
}
