//! Upload health tracking.
//!
//! A bounded state machine over consecutive upload outcomes:
//!
//! - `Healthy`: fewer than [`DEGRADED_THRESHOLD`] consecutive failures
//! - `Degraded`: at least that many, until the next success
//!
//! Retryable and fatal failures share one counter. A single success resets it.

use serde::Serialize;

use crate::uploader::{UploadAttempt, UploadOutcome};

/// Consecutive non-successful uploads that mark the agent degraded.
pub const DEGRADED_THRESHOLD: u32 = 5;

/// Snapshot of the upload health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthState {
    /// Non-successful uploads since the last success.
    pub consecutive_failures: u32,
    /// Whether the threshold has been reached.
    pub degraded: bool,
}

/// Edge reported when the degraded flag flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Healthy to degraded.
    Degraded,
    /// Degraded to healthy.
    Recovered,
}

/// Owner of the [`HealthState`]. Only the scheduler mutates it.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    state: HealthState,
    threshold: u32,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::with_threshold(DEGRADED_THRESHOLD)
    }

    /// Tracker with a custom threshold (at least 1).
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            state: HealthState::default(),
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn is_degraded(&self) -> bool {
        self.state.degraded
    }

    /// Apply a completed upload attempt.
    pub fn record(&mut self, attempt: &UploadAttempt) -> Option<Transition> {
        self.observe(attempt.outcome)
    }

    /// Apply an upload outcome and report a flip of the degraded flag.
    pub fn observe(&mut self, outcome: UploadOutcome) -> Option<Transition> {
        if outcome.is_success() {
            let was_degraded = self.state.degraded;
            self.state = HealthState::default();
            if was_degraded {
                tracing::info!("Upload succeeded, clearing degraded condition");
                return Some(Transition::Recovered);
            }
            return None;
        }

        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        if !self.state.degraded && self.state.consecutive_failures >= self.threshold {
            self.state.degraded = true;
            tracing::error!(
                "Number of last upload failures {} exceeded than threshold {}. Marking as degraded.",
                self.state.consecutive_failures,
                self.threshold
            );
            return Some(Transition::Degraded);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::uploader::UploadOutcome::{FatalFailure as F, RetryableFailure as R, Success as S};

    #[test]
    fn test_initial_state_is_healthy() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.state(), HealthState::default());
        assert_eq!(tracker.threshold(), DEGRADED_THRESHOLD);
        assert!(!tracker.is_degraded());
    }

    #[rstest]
    #[case::four_failures(&[R, R, R, R], 4, false)]
    #[case::five_failures(&[R, R, R, R, R], 5, true)]
    #[case::mixed_failures_share_counter(&[R, F, R, F, F], 5, true)]
    #[case::success_resets(&[R, R, R, R, S, R], 1, false)]
    #[case::recovery_after_degraded(&[R, R, R, R, R, R, S], 0, false)]
    #[case::failures_after_recovery(&[F, F, F, F, F, S, R, R, R, R], 4, false)]
    #[case::degraded_again(&[F, F, F, F, F, S, R, R, R, R, R], 5, true)]
    #[case::only_success(&[S, S], 0, false)]
    fn test_outcome_sequences(
        #[case] outcomes: &[UploadOutcome],
        #[case] failures: u32,
        #[case] degraded: bool,
    ) {
        let mut tracker = HealthTracker::new();
        for outcome in outcomes {
            tracker.observe(*outcome);
        }
        assert_eq!(
            tracker.state(),
            HealthState {
                consecutive_failures: failures,
                degraded,
            }
        );
    }

    #[test]
    fn test_threshold_crossing_reported_once() {
        let mut tracker = HealthTracker::new();
        let transitions: Vec<_> = (0..10).filter_map(|_| tracker.observe(R)).collect();
        assert_eq!(transitions, vec![Transition::Degraded]);
        assert_eq!(tracker.state().consecutive_failures, 10);
    }

    #[test]
    fn test_recovery_reported_on_success() {
        let mut tracker = HealthTracker::with_threshold(2);
        assert_eq!(tracker.observe(F), None);
        assert_eq!(tracker.observe(F), Some(Transition::Degraded));
        assert_eq!(tracker.observe(S), Some(Transition::Recovered));
        assert_eq!(tracker.observe(S), None);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut tracker = HealthTracker::with_threshold(0);
        assert_eq!(tracker.threshold(), 1);
        assert_eq!(tracker.observe(R), Some(Transition::Degraded));
    }
}
