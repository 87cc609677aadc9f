//! Read-only status surface for external reporters.
//!
//! The scheduler publishes an [`OperatorStatus`] snapshot after every cycle.
//! Readers hold a [`StatusHandle`] and never see a mutable reference; a
//! snapshot may lag the running cycle by at most one cycle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::sync::watch;

use crate::archive::Archive;
use crate::config::format_period;
use crate::health::HealthState;
use crate::uploader::UploadAttempt;

/// Condition type reported for upload health.
pub const DEGRADED_CONDITION: &str = "Degraded";

/// Tri-state condition status, as cluster operators report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// The degraded signal, rendered as an operator condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

/// Everything an external reporter may read.
#[derive(Debug, Clone, Default)]
pub struct OperatorStatus {
    /// Upload health.
    pub health: HealthState,
    /// Gather period currently in effect.
    pub interval: Option<Duration>,
    /// Upload endpoint currently in effect.
    pub endpoint: Option<String>,
    /// Completed cycles since start.
    pub cycles: u64,
    /// Most recent upload attempt.
    pub last_upload: Option<UploadAttempt>,
    /// Most recently built archive, kept for inspection.
    pub latest_archive: Option<Arc<Archive>>,
}

impl OperatorStatus {
    /// The `Degraded` condition derived from the health state.
    pub fn degraded_condition(&self) -> Condition {
        if self.cycles == 0 && self.last_upload.is_none() {
            return Condition {
                kind: DEGRADED_CONDITION,
                status: ConditionStatus::Unknown,
                reason: "Initializing".to_string(),
                message: "No gather cycle has completed yet".to_string(),
            };
        }

        if self.health.degraded {
            let detail = self
                .last_upload
                .as_ref()
                .map(|a| format!(": {}", a.detail))
                .unwrap_or_default();
            Condition {
                kind: DEGRADED_CONDITION,
                status: ConditionStatus::True,
                reason: "UploadFailed".to_string(),
                message: format!(
                    "Reporting was not successful for the last {} attempts{}",
                    self.health.consecutive_failures, detail
                ),
            }
        } else {
            Condition {
                kind: DEGRADED_CONDITION,
                status: ConditionStatus::False,
                reason: "AsExpected".to_string(),
                message: match self.interval {
                    Some(interval) => {
                        format!("Gathering cluster info every {}", format_period(interval))
                    }
                    None => String::new(),
                },
            }
        }
    }
}

/// Write side, owned by the scheduler.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<OperatorStatus>,
}

impl StatusPublisher {
    /// Apply `update` to the published snapshot.
    pub fn update(&self, update: impl FnOnce(&mut OperatorStatus)) {
        self.tx.send_modify(update);
    }

    /// A new read handle.
    pub fn subscribe(&self) -> StatusHandle {
        StatusHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side, cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<OperatorStatus>,
}

impl StatusHandle {
    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> OperatorStatus {
        self.rx.borrow().clone()
    }

    /// The degraded signal.
    pub fn is_degraded(&self) -> bool {
        self.rx.borrow().health.degraded
    }

    /// The most recently built archive.
    pub fn latest_archive(&self) -> Option<Arc<Archive>> {
        self.rx.borrow().latest_archive.clone()
    }

    /// Wait for the next published snapshot.
    ///
    /// Returns `false` once the scheduler has gone away.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Create a connected publisher and handle.
pub fn status_channel() -> (StatusPublisher, StatusHandle) {
    let (tx, rx) = watch::channel(OperatorStatus::default());
    (StatusPublisher { tx }, StatusHandle { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_unknown_before_first_cycle() {
        let condition = OperatorStatus::default().degraded_condition();
        assert_eq!(condition.status, ConditionStatus::Unknown);
        assert_eq!(condition.kind, DEGRADED_CONDITION);
    }

    #[test]
    fn test_condition_follows_health() {
        let mut status = OperatorStatus {
            cycles: 1,
            interval: Some(Duration::from_secs(180)),
            ..Default::default()
        };
        let condition = status.degraded_condition();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, "AsExpected");
        assert_eq!(condition.message, "Gathering cluster info every 3m0s");

        status.health = HealthState {
            consecutive_failures: 5,
            degraded: true,
        };
        let condition = status.degraded_condition();
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.reason, "UploadFailed");
        assert!(condition.message.contains("last 5 attempts"));
    }

    #[tokio::test]
    async fn test_handle_sees_published_updates() {
        let (publisher, handle) = status_channel();
        let mut watcher = publisher.subscribe();
        assert!(!handle.is_degraded());

        publisher.update(|s| {
            s.cycles = 1;
            s.health.degraded = true;
        });

        assert!(watcher.changed().await);
        assert!(handle.is_degraded());
        assert_eq!(handle.snapshot().cycles, 1);
        assert!(handle.latest_archive().is_none());
    }
}
