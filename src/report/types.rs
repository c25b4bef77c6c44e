use crate::runner::state::ScenarioResult;
use serde::{Deserialize, Serialize};

/// One suite run, as written to the execution report file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    /// ISO-8601 local time
    pub timestamp: String,
    pub framework_version: String,
    pub summary: ReportSummary,
    pub tests: Vec<ScenarioResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    /// Everything that did not pass, ERROR results included
    pub failed: usize,
    /// Percentage rounded to two decimals; 100 for an empty run
    pub success_rate: f64,
}

impl ReportSummary {
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.is_passed()).count();
        let success_rate = if total == 0 {
            100.0
        } else {
            round2(passed as f64 / total as f64 * 100.0)
        };
        Self {
            total,
            passed,
            failed: total - passed,
            success_rate,
        }
    }
}

impl ExecutionReport {
    pub fn new(tests: Vec<ScenarioResult>) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            framework_version: env!("CARGO_PKG_VERSION").to_string(),
            summary: ReportSummary::from_results(&tests),
            tests,
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
