use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one scenario run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// The scenario could not be run at all (missing scenario or data file)
    Error,
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScenarioStatus::Passed => "PASSED",
            ScenarioStatus::Failed => "FAILED",
            ScenarioStatus::Error => "ERROR",
        })
    }
}

/// Timing of one executed step
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StepTiming {
    /// 1-based step number
    pub step: usize,
    pub duration_ms: f64,
    pub baseline_ms: Option<f64>,
    pub regression: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slowdown_percent: Option<f64>,
}

/// Per-scenario performance summary; also the persisted baseline shape
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceReport {
    pub total_duration_ms: f64,
    pub steps: Vec<StepTiming>,
    pub has_regression: bool,
}

/// System state captured when a step fails
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Diagnostics {
    pub screenshots: Vec<PathBuf>,
    pub network_available: bool,
    /// "12.5%" or "N/A"
    pub cpu_usage: String,
    pub ram_usage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioResult {
    pub name: String,
    pub status: ScenarioStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_executed: Option<usize>,

    /// 1-based index of the failing step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// First diagnostic screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceReport>,
}

impl ScenarioResult {
    fn empty(name: &str, status: ScenarioStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            steps_executed: None,
            failed_step: None,
            step_description: None,
            error: None,
            screenshot: None,
            diagnostics: None,
            performance: None,
        }
    }

    pub fn passed(name: &str, steps_executed: usize, performance: PerformanceReport) -> Self {
        Self {
            steps_executed: Some(steps_executed),
            performance: Some(performance),
            ..Self::empty(name, ScenarioStatus::Passed)
        }
    }

    pub fn failed(
        name: &str,
        failed_step: usize,
        step_description: String,
        error: String,
        diagnostics: Diagnostics,
        performance: PerformanceReport,
    ) -> Self {
        Self {
            failed_step: Some(failed_step),
            step_description: Some(step_description),
            error: Some(error),
            screenshot: diagnostics.screenshots.first().cloned(),
            diagnostics: Some(diagnostics),
            performance: Some(performance),
            ..Self::empty(name, ScenarioStatus::Failed)
        }
    }

    pub fn error(name: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(name, ScenarioStatus::Error)
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    pub fn has_regression(&self) -> bool {
        self.performance
            .as_ref()
            .map(|p| p.has_regression)
            .unwrap_or(false)
    }
}
