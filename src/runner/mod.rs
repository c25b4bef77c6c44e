pub mod actions;
pub mod context;
pub mod diagnostics;
pub mod events;
pub mod executor;
pub mod performance;
pub mod state;
pub mod visual;

use crate::driver::image_matcher::{NccMatcher, TemplateMatcher};
use crate::driver::ocr::{OcrEngine, TextRecognizer};
use crate::driver::{DesktopDriver, SystemDesktop, UiTree, UnavailableUiTree};
use crate::parser::data::{load_rows, substitute_steps};
use crate::parser::Step;
use crate::report::types::ExecutionReport;
use crate::store::{ReportStore, RunGuard, ScenarioStore};
use crate::utils::config::Config;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

pub use events::{ConsoleEventListener, EventEmitter, TestEvent};
pub use executor::ScenarioExecutor;
pub use state::*;

/// External capabilities the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub driver: Arc<dyn DesktopDriver>,
    pub matcher: Arc<dyn TemplateMatcher>,
    /// `None` when the host has no OCR; text actions then fail
    pub ocr: Option<Arc<dyn TextRecognizer>>,
    pub ui: Arc<dyn UiTree>,
}

impl Collaborators {
    /// Probe the host for the real backends
    pub fn detect(config: &Config) -> Self {
        let driver = SystemDesktop::detect();
        let ocr = OcrEngine::detect(&config.ocr_language);
        log::info!(
            "Desktop driver: {}, OCR: {}",
            driver.platform_name(),
            ocr.as_ref().map(|o| o.backend_name()).unwrap_or("none")
        );

        Self {
            driver: Arc::new(driver),
            matcher: Arc::new(NccMatcher::default()),
            ocr: ocr.map(|engine| Arc::new(engine) as Arc<dyn TextRecognizer>),
            ui: Arc::new(UnavailableUiTree::default()),
        }
    }
}

/// Runs scenarios one after another and publishes the report.
///
/// Suite runs hold the run lock for their whole duration, report writing
/// included, so two processes never interleave on the same baseline and
/// report files.
pub struct SuiteRunner {
    config: Config,
    collaborators: Collaborators,
    executor: ScenarioExecutor,
    scenarios: ScenarioStore,
    reports: ReportStore,
    emitter: EventEmitter,
}

impl SuiteRunner {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let emitter = EventEmitter::default();
        Self {
            executor: ScenarioExecutor::new(collaborators.clone(), config.clone(), emitter.clone()),
            scenarios: ScenarioStore::new(config.scenarios_file()),
            reports: ReportStore::new(&config.report_file, config.history_dir()),
            collaborators,
            config,
            emitter,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TestEvent> {
        self.emitter.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn scenarios(&self) -> &ScenarioStore {
        &self.scenarios
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    /// Run every scenario, or only `names` (`"all"` selects every scenario).
    /// Requested names that do not exist yield an ERROR result each.
    pub async fn run_suite(&self, names: Option<&[String]>) -> Result<ExecutionReport> {
        let _guard = RunGuard::acquire(&self.config.lock_file())?;
        log::info!("Standard test suite run initiated.");

        let scenarios = self.scenarios.load()?;
        let run_all = names.map_or(true, |n| n.is_empty() || n.iter().any(|s| s == "all"));

        let selected: Vec<(String, Option<Vec<Step>>)> = if run_all {
            scenarios.into_iter().map(|(name, steps)| (name, Some(steps))).collect()
        } else {
            let mut seen = std::collections::HashSet::new();
            names
                .unwrap_or_default()
                .iter()
                .filter(|name| seen.insert(name.as_str()))
                .map(|name| (name.clone(), scenarios.get(name).cloned()))
                .collect()
        };

        self.emitter.emit(TestEvent::SuiteStarted {
            scenario_count: selected.len(),
        });

        let mut results = Vec::with_capacity(selected.len());
        for (name, steps) in selected {
            let result = match steps {
                Some(steps) => self.executor.run_scenario(&name, &steps).await,
                None => {
                    log::error!("Scenario '{}' not found.", name);
                    ScenarioResult::error(&name, "Scenario not found.")
                }
            };
            results.push(result);
        }

        Ok(self.publish(results))
    }

    /// Replay one scenario per CSV row, substituting `{column}` placeholders.
    /// Iterations are named `<scenario>_[row_<n>]`.
    pub async fn run_data_driven(&self, scenario: &str, data_file: &Path) -> Result<ExecutionReport> {
        let _guard = RunGuard::acquire(&self.config.lock_file())?;
        log::info!(
            "Data-driven test for '{}' with '{}' initiated.",
            scenario,
            data_file.display()
        );

        let results = match self.data_driven_results(scenario, data_file).await? {
            Ok(results) => results,
            Err(message) => {
                log::error!("{}", message);
                vec![ScenarioResult::error(scenario, message)]
            }
        };
        Ok(self.publish(results))
    }

    async fn data_driven_results(
        &self,
        scenario: &str,
        data_file: &Path,
    ) -> Result<std::result::Result<Vec<ScenarioResult>, String>> {
        let base_steps = match self.scenarios.load()?.remove(scenario) {
            Some(steps) => steps,
            None => return Ok(Err("Base scenario not found.".to_string())),
        };
        if !data_file.is_file() {
            return Ok(Err(format!("Data file not found: {}", data_file.display())));
        }
        let rows = match load_rows(data_file) {
            Ok(rows) => rows,
            Err(e) => return Ok(Err(format!("Failed to process CSV: {:#}", e))),
        };

        self.emitter.emit(TestEvent::SuiteStarted {
            scenario_count: rows.len(),
        });

        let mut results = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let name = format!("{}_[row_{}]", scenario, i + 1);
            let steps = substitute_steps(&base_steps, row);
            results.push(self.executor.run_scenario(&name, &steps).await);
        }
        Ok(Ok(results))
    }

    /// Run one stored scenario without writing a suite report
    pub async fn run_named(&self, name: &str) -> Result<ScenarioResult> {
        let _guard = RunGuard::acquire(&self.config.lock_file())?;
        let steps = self.scenarios.get(name)?;
        Ok(self.executor.run_scenario(name, &steps).await)
    }

    /// Run a single action outside of any scenario, under the run lock
    pub async fn run_single_action(&self, step: &Step) -> Result<()> {
        let _guard = RunGuard::acquire(&self.config.lock_file())?;
        log::info!("Single action: {}", step.describe());
        let mut dispatcher = actions::ActionDispatcher::new(&self.collaborators, &self.config);
        dispatcher.dispatch(step).await
    }

    /// Format results into a report and persist it (archive-then-replace).
    /// A failed write is logged; the report is still returned.
    fn publish(&self, results: Vec<ScenarioResult>) -> ExecutionReport {
        let report = ExecutionReport::new(results);
        if let Err(e) = self.reports.write(&report) {
            log::error!("Failed to write report: {:#}", e);
        }
        self.emitter.emit(TestEvent::SuiteFinished {
            summary: report.summary.clone(),
        });
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::HarnessError;
    use crate::driver::testing::{text_fragment, MockDriver, MockMatcher, MockOcr, MockUiTree};

    pub(crate) fn test_config(root: &Path) -> Config {
        let mut config = Config::rooted_at(root);
        config.time_unit_ms = 10;
        config.network_probe.host = "127.0.0.1".into();
        config.network_probe.port = 9;
        config.network_probe.timeout_secs = 0.5;
        config
    }

    pub(crate) fn mock_collaborators(driver: Arc<MockDriver>) -> Collaborators {
        Collaborators {
            driver,
            matcher: Arc::new(MockMatcher::default()),
            ocr: Some(Arc::new(MockOcr::always(vec![
                text_fragment("Hello alice", 10, 10),
                text_fragment("Hello bob", 10, 30),
                text_fragment("Hello carol", 10, 50),
            ]))),
            ui: Arc::new(MockUiTree::default()),
        }
    }

    fn runner(root: &Path) -> (SuiteRunner, Arc<MockDriver>) {
        let driver = Arc::new(MockDriver::new(16, 16));
        let runner = SuiteRunner::new(test_config(root), mock_collaborators(driver.clone()));
        (runner, driver)
    }

    #[tokio::test]
    async fn test_data_driven_suite_substitutes_each_row() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, driver) = runner(dir.path());
        runner
            .scenarios()
            .upsert(
                "greet",
                vec![Step::new("assert-text", "Hello {name}"), Step::new("type", "{name}")],
            )
            .unwrap();
        let csv = dir.path().join("users.csv");
        std::fs::write(&csv, "name\nalice\nbob\ncarol\n").unwrap();

        let report = runner.run_data_driven("greet", &csv).await.unwrap();

        let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["greet_[row_1]", "greet_[row_2]", "greet_[row_3]"]);
        assert!(report.tests.iter().all(|t| t.is_passed()));
        assert_eq!(driver.typed(), vec!["alice", "bob", "carol"]);
        assert!(runner.reports().load_current().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_data_driven_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _) = runner(dir.path());

        let report = runner
            .run_data_driven("ghost", &dir.path().join("x.csv"))
            .await
            .unwrap();
        assert_eq!(report.tests.len(), 1);
        assert_eq!(report.tests[0].status, ScenarioStatus::Error);
        assert_eq!(report.tests[0].error.as_deref(), Some("Base scenario not found."));

        runner.scenarios().upsert("greet", vec![Step::new("wait", "0")]).unwrap();
        let report = runner
            .run_data_driven("greet", &dir.path().join("x.csv"))
            .await
            .unwrap();
        assert!(report.tests[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Data file not found"));
        assert_eq!(report.summary.failed, 1);
    }

    #[tokio::test]
    async fn test_suite_runs_subset_and_reports_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, driver) = runner(dir.path());
        runner.scenarios().upsert("a", vec![Step::new("type", "a")]).unwrap();
        runner.scenarios().upsert("b", vec![Step::new("type", "b")]).unwrap();

        let names = vec!["b".to_string(), "nope".to_string(), "b".to_string()];
        let report = runner.run_suite(Some(names.as_slice())).await.unwrap();

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.tests[1].status, ScenarioStatus::Error);
        assert_eq!(driver.typed(), vec!["b"]);

        let all = runner.run_suite(None).await.unwrap();
        assert_eq!(all.summary.total, 2);
        assert_eq!(all.summary.success_rate, 100.0);
        assert_eq!(runner.reports().history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_suite_refuses_to_run_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _) = runner(dir.path());
        let _held = RunGuard::acquire(&runner.config().lock_file()).unwrap();

        let err = runner.run_suite(None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::RunInProgress(_))
        ));
    }

    #[tokio::test]
    async fn test_single_action_respects_run_lock() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, driver) = runner(dir.path());
        let step = Step::new("assert-visuals", "home");

        let held = RunGuard::acquire(&runner.config().lock_file()).unwrap();
        let err = runner.run_single_action(&step).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::RunInProgress(_))
        ));
        assert!(!runner.config().visual_baselines_dir().join("home.png").exists());
        assert_eq!(driver.captures(), 0);

        drop(held);
        runner.run_single_action(&step).await.unwrap();
        assert!(runner.config().visual_baselines_dir().join("home.png").is_file());
        assert!(!runner.config().lock_file().exists());
    }

    #[tokio::test]
    async fn test_run_named_missing_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _) = runner(dir.path());
        let err = runner.run_named("ghost").await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
