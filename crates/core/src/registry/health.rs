//! Health status transitions driven by consecutive outcomes.
//!
//! - `unknown | degraded | failed -> healthy` after `success_threshold`
//!   consecutive successes.
//! - `unknown | healthy | degraded -> failed` after `failure_threshold`
//!   consecutive failures.
//! - An outcome that breaks a run of the opposite outcome moves the status to
//!   `degraded` until one of the thresholds is reached.

use serde::{Deserialize, Serialize};

use crate::models::HealthStatus;

const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Thresholds for health transitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Consecutive successes needed to become healthy.
    pub success_threshold: u32,
    /// Consecutive failures needed to become failed.
    pub failure_threshold: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Consecutive-outcome streaks of one source. In-memory only.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HealthTracker {
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl HealthTracker {
    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Records a success and returns the resulting status.
    pub fn on_success(&mut self, current: HealthStatus, policy: &HealthPolicy) -> HealthStatus {
        let broke_failure_run = self.consecutive_failures > 0;
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);

        if self.consecutive_successes >= policy.success_threshold.max(1) {
            HealthStatus::Healthy
        } else if broke_failure_run {
            HealthStatus::Degraded
        } else {
            current
        }
    }

    /// Records a failure and returns the resulting status.
    pub fn on_failure(&mut self, current: HealthStatus, policy: &HealthPolicy) -> HealthStatus {
        let broke_success_run = self.consecutive_successes > 0;
        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures >= policy.failure_threshold.max(1) {
            HealthStatus::Failed
        } else if broke_success_run || current == HealthStatus::Healthy {
            HealthStatus::Degraded
        } else {
            current
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn apply(outcomes: &[bool], policy: &HealthPolicy) -> Vec<HealthStatus> {
        let mut tracker = HealthTracker::default();
        let mut status = HealthStatus::Unknown;
        outcomes
            .iter()
            .map(|ok| {
                status = if *ok {
                    tracker.on_success(status, policy)
                } else {
                    tracker.on_failure(status, policy)
                };
                status
            })
            .collect()
    }

    #[test]
    fn test_unknown_becomes_healthy_after_threshold() {
        let statuses = apply(&[true, true], &HealthPolicy::default());
        assert_eq!(statuses, vec![HealthStatus::Unknown, HealthStatus::Healthy]);
    }

    #[test]
    fn test_single_failure_after_successes_degrades() {
        let statuses = apply(&[true, true, false], &HealthPolicy::default());
        assert_eq!(statuses[2], HealthStatus::Degraded);
    }

    #[test]
    fn test_failure_threshold_fails_healthy_source() {
        let statuses = apply(&[true, true, false, false, false], &HealthPolicy::default());
        assert_eq!(
            statuses[2..],
            [HealthStatus::Degraded, HealthStatus::Degraded, HealthStatus::Failed]
        );
    }

    #[test]
    fn test_single_success_after_failures_degrades_then_recovers() {
        let statuses = apply(&[false, false, false, true, true], &HealthPolicy::default());
        assert_eq!(statuses[2], HealthStatus::Failed);
        assert_eq!(statuses[3], HealthStatus::Degraded);
        assert_eq!(statuses[4], HealthStatus::Healthy);
    }

    proptest! {
        #[test]
        fn prop_threshold_runs_decide_status(
            outcomes in proptest::collection::vec(any::<bool>(), 1..40)
        ) {
            let policy = HealthPolicy::default();
            let statuses = apply(&outcomes, &policy);
            for i in 0..outcomes.len() {
                let success_run = outcomes[..=i].iter().rev().take_while(|o| **o).count() as u32;
                let failure_run = outcomes[..=i].iter().rev().take_while(|o| !**o).count() as u32;
                if success_run >= policy.success_threshold {
                    prop_assert_eq!(statuses[i], HealthStatus::Healthy);
                }
                if failure_run >= policy.failure_threshold {
                    prop_assert_eq!(statuses[i], HealthStatus::Failed);
                }
                if statuses[i] == HealthStatus::Healthy {
                    prop_assert!(outcomes[i]);
                }
            }
        }
    }
}
