use std::collections::HashMap;
use std::time::Instant;

use crate::capture::domain::capture_event::{CaptureEvent, CaptureObserver};
use crate::capture::domain::capture_state::CapturePhase;

/// Observer that writes session events to the `log` facade and keeps
/// per-stage timings for an end-of-session summary.
pub struct LoggingCaptureObserver {
    timings: HashMap<&'static str, Vec<f64>>,
    phase_entries: HashMap<CapturePhase, usize>,
    countdowns_cancelled: usize,
    start_time: Instant,
}

impl LoggingCaptureObserver {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            phase_entries: HashMap::new(),
            countdowns_cancelled: 0,
            start_time: Instant::now(),
        }
    }

    fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    fn times_entered(&self, phase: CapturePhase) -> usize {
        self.phase_entries.get(&phase).copied().unwrap_or(0)
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.phase_entries.is_empty() {
            return None;
        }

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let polls = self.timings_for("detect").map_or(0, <[f64]>::len);
        let mut lines = vec![format!(
            "Capture session summary ({polls} polls, {elapsed:.1}s):"
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {stage:8}: avg {avg_ms:6.1}ms  max {:6.1}ms  ({} runs)",
                durations.iter().cloned().fold(0.0, f64::max),
                durations.len()
            ));
        }
        if self.countdowns_cancelled > 0 {
            lines.push(format!(
                "  Countdowns cancelled: {}",
                self.countdowns_cancelled
            ));
        }
        let failed = self.times_entered(CapturePhase::Failed);
        if failed > 0 {
            lines.push(format!("  Failures: {failed}"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for LoggingCaptureObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureObserver for LoggingCaptureObserver {
    fn on_event(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::PhaseChanged { from, to } => {
                *self.phase_entries.entry(*to).or_default() += 1;
                log::info!("Capture phase: {from} -> {to}");
            }
            CaptureEvent::Guidance(message) => log::info!("Guidance: {message}"),
            CaptureEvent::CountdownStarted(secs) => log::info!("Hold still: capturing in {secs}"),
            CaptureEvent::CountdownTick(remaining) => log::debug!("Countdown: {remaining}"),
            CaptureEvent::CountdownCancelled => {
                self.countdowns_cancelled += 1;
                log::info!("Countdown cancelled");
            }
            CaptureEvent::Captured(artifact) => log::info!(
                "Photo captured ({} bytes): {}",
                artifact.image_blob.len(),
                artifact.preview_url
            ),
            CaptureEvent::Uploaded => log::info!("Photo uploaded"),
            CaptureEvent::Failed(reason) => log::warn!("Capture problem: {reason}"),
            CaptureEvent::NavigateForward(reason) => log::info!("Continuing: {reason:?}"),
            CaptureEvent::Timing { stage, duration_ms } => {
                self.timings.entry(*stage).or_default().push(*duration_ms);
            }
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
