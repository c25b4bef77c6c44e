//! Per-step timing with baseline-relative regression detection
//!
//! Steps are compared to the baseline by position. A scenario whose steps are
//! reordered keeps comparing against the old order until its baseline is
//! deleted.

use super::state::{PerformanceReport, StepTiming};
use crate::report::types::round2;
use crate::store::{PerformanceBaseline, PerformanceBaselines};
use std::collections::HashMap;
use std::time::Instant;

/// Slowdown percentage above which a step is a regression
pub const REGRESSION_THRESHOLD_PERCENT: f64 = 20.0;

pub struct PerformanceTracker {
    scenario: String,
    store: PerformanceBaselines,
    baseline: Option<PerformanceBaseline>,
    timers: HashMap<usize, Instant>,
    report: PerformanceReport,
}

impl PerformanceTracker {
    /// Load the scenario's baseline, if any, for the duration of the run
    pub fn new(scenario: &str, store: PerformanceBaselines) -> Self {
        let baseline = store.load(scenario);
        log::info!(
            "PerformanceTracker initialized for '{}'. Baseline {}.",
            scenario,
            if baseline.is_some() { "found" } else { "not found" }
        );
        Self {
            scenario: scenario.to_string(),
            store,
            baseline,
            timers: HashMap::new(),
            report: PerformanceReport::default(),
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// `index` is 0-based
    pub fn start_step(&mut self, index: usize) {
        self.timers.insert(index, Instant::now());
    }

    /// Record the step's duration; no-op for a step that was never started
    pub fn stop_step(&mut self, index: usize) -> Option<&StepTiming> {
        let started = self.timers.remove(&index)?;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        Some(self.record(index, duration_ms))
    }

    pub(crate) fn record(&mut self, index: usize, duration_ms: f64) -> &StepTiming {
        let baseline_ms = self
            .baseline
            .as_ref()
            .and_then(|b| b.steps.get(index))
            .map(|s| s.duration_ms);

        let (regression, slowdown_percent) = detect_regression(duration_ms, baseline_ms);
        if regression {
            self.report.has_regression = true;
            log::warn!(
                "Step {} of '{}' is {:.2}% slower than baseline",
                index + 1,
                self.scenario,
                slowdown_percent.unwrap_or_default()
            );
        }

        self.report.steps.push(StepTiming {
            step: index + 1,
            duration_ms: round2(duration_ms),
            baseline_ms,
            regression,
            slowdown_percent,
        });
        &self.report.steps[self.report.steps.len() - 1]
    }

    /// Total the run and, when the scenario had no baseline, persist this run
    /// as the new one. A failed save is logged and does not affect the report.
    pub fn finalize(mut self) -> PerformanceReport {
        self.report.total_duration_ms = round2(self.report.steps.iter().map(|s| s.duration_ms).sum());

        if self.baseline.is_none() {
            log::info!("Creating initial performance baseline for '{}'.", self.scenario);
            if let Err(e) = self.store.save(&self.scenario, &self.report) {
                log::error!("Error saving baseline for '{}': {:#}", self.scenario, e);
            }
        }

        self.report
    }
}

/// `(is_regression, slowdown_percent)`; comparison needs a positive baseline
/// and a positive current duration
pub fn detect_regression(current_ms: f64, baseline_ms: Option<f64>) -> (bool, Option<f64>) {
    let baseline_ms = match baseline_ms {
        Some(b) if b > 0.0 && current_ms > 0.0 => b,
        _ => return (false, None),
    };
    let percent = (current_ms - baseline_ms) / baseline_ms * 100.0;
    (percent > REGRESSION_THRESHOLD_PERCENT, Some(round2(percent)))
}
