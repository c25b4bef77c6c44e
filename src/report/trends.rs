//! Failure patterns across archived execution reports

use super::types::ExecutionReport;
use crate::runner::state::ScenarioStatus;
use crate::store::ReportStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of most recent archived reports analyzed
pub const TREND_WINDOW: usize = 10;
const TOP_FAILURES: usize = 3;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TrendReport {
    NoHistory { summary: String },
    Analysis(TrendAnalysis),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendAnalysis {
    /// How many reports were analyzed
    pub analysis_window: usize,
    pub flaky_tests: Vec<FlakyTest>,
    pub top_failures: Vec<FailureCount>,
    pub persistent_perf_regressions: Vec<RegressionCount>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlakyTest {
    pub name: String,
    /// Newest first
    pub history: Vec<ScenarioStatus>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureCount {
    pub name: String,
    pub fail_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegressionCount {
    pub name: String,
    pub regression_count: usize,
}

/// Analyze the archive behind `store`
pub fn analyze(store: &ReportStore) -> TrendReport {
    log::info!("Starting trend analysis...");
    let report = analyze_reports(&store.history(TREND_WINDOW));
    log::info!("Trend analysis complete.");
    report
}

/// `reports` are expected newest first
pub fn analyze_reports(reports: &[ExecutionReport]) -> TrendReport {
    if reports.is_empty() {
        return TrendReport::NoHistory {
            summary: "No historical data to analyze.".to_string(),
        };
    }

    let mut histories: BTreeMap<&str, Vec<ScenarioStatus>> = BTreeMap::new();
    let mut failures: BTreeMap<&str, usize> = BTreeMap::new();
    let mut regressions: BTreeMap<&str, usize> = BTreeMap::new();

    for test in reports.iter().flat_map(|r| r.tests.iter()) {
        if test.name.is_empty() {
            continue;
        }
        histories.entry(&test.name).or_default().push(test.status);
        if test.status == ScenarioStatus::Failed {
            *failures.entry(&test.name).or_default() += 1;
        }
        if test.has_regression() {
            *regressions.entry(&test.name).or_default() += 1;
        }
    }

    let flaky_tests = histories
        .into_iter()
        .filter(|(_, history)| {
            history.len() > 2
                && history.contains(&ScenarioStatus::Passed)
                && history.contains(&ScenarioStatus::Failed)
        })
        .map(|(name, history)| FlakyTest {
            name: name.to_string(),
            history,
        })
        .collect();

    let mut ranked: Vec<(&str, usize)> = failures.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let top_failures = ranked
        .into_iter()
        .take(TOP_FAILURES)
        .map(|(name, fail_count)| FailureCount {
            name: name.to_string(),
            fail_count,
        })
        .collect();

    let persistent_perf_regressions = regressions
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, regression_count)| RegressionCount {
            name: name.to_string(),
            regression_count,
        })
        .collect();

    TrendReport::Analysis(TrendAnalysis {
        analysis_window: reports.len(),
        flaky_tests,
        top_failures,
        persistent_perf_regressions,
    })
}
