use std::time::Duration;

use crate::positioning::domain::position_evaluator::PositionThresholds;
use crate::shared::constants::{COUNTDOWN_SECS, POLL_INTERVAL};

/// Per-screen configuration of the capture pipeline.
///
/// The identity-check screen and the proctoring snapshot screen share one
/// pipeline and differ only in this policy.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturePolicy {
    pub allow_skip: bool,
    pub allow_recapture: bool,
    pub countdown_secs: u32,
    pub poll_interval: Duration,
    pub mirrored: bool,
    pub thresholds: PositionThresholds,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::identity_check()
    }
}

impl CapturePolicy {
    /// Candidate photo before the test: must be captured, may be retaken.
    pub fn identity_check() -> Self {
        Self {
            allow_skip: false,
            allow_recapture: true,
            countdown_secs: COUNTDOWN_SECS,
            poll_interval: POLL_INTERVAL,
            mirrored: true,
            thresholds: PositionThresholds::default(),
        }
    }

    /// Snapshot taken during proctoring: may be skipped, never retaken.
    pub fn proctoring_snapshot() -> Self {
        Self {
            allow_skip: true,
            allow_recapture: false,
            ..Self::identity_check()
        }
    }

    pub fn with_skip(mut self, allow: bool) -> Self {
        self.allow_skip = allow;
        self
    }

    pub fn with_recapture(mut self, allow: bool) -> Self {
        self.allow_recapture = allow;
        self
    }

    /// Countdown length in ticks; zero is raised to one.
    pub fn with_countdown_secs(mut self, secs: u32) -> Self {
        self.countdown_secs = secs.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    pub fn with_thresholds(mut self, thresholds: PositionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}
