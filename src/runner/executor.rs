use super::actions::ActionDispatcher;
use super::context::RunContext;
use super::diagnostics::DiagnosticsCollector;
use super::events::{EventEmitter, TestEvent};
use super::performance::PerformanceTracker;
use super::state::ScenarioResult;
use super::Collaborators;
use crate::parser::Step;
use crate::store::PerformanceBaselines;
use crate::utils::config::Config;

/// Runs scenarios step by step, stopping at the first failing step.
///
/// Each run gets a fresh action dispatcher, so UI-tree session state never
/// leaks from one scenario into the next.
pub struct ScenarioExecutor {
    collaborators: Collaborators,
    config: Config,
    baselines: PerformanceBaselines,
    diagnostics: DiagnosticsCollector,
    emitter: EventEmitter,
}

impl ScenarioExecutor {
    pub fn new(collaborators: Collaborators, config: Config, emitter: EventEmitter) -> Self {
        Self {
            baselines: PerformanceBaselines::new(config.performance_baselines_dir()),
            diagnostics: DiagnosticsCollector::new(
                RunContext::from_config(&config),
                config.network_probe.clone(),
            ),
            collaborators,
            config,
            emitter,
        }
    }

    pub async fn run_scenario(&self, name: &str, steps: &[Step]) -> ScenarioResult {
        log::info!("--- Running Test: {} ---", name);
        self.emitter.emit(TestEvent::ScenarioStarted {
            name: name.to_string(),
            step_count: steps.len(),
        });

        let mut tracker = PerformanceTracker::new(name, self.baselines.clone());
        let mut dispatcher = ActionDispatcher::new(&self.collaborators, &self.config);

        for (i, step) in steps.iter().enumerate() {
            log::info!(
                "  Executing Step {}/{}: {} -> '{}'",
                i + 1,
                steps.len(),
                step.action,
                step.target
            );
            self.emitter.emit(TestEvent::StepStarted {
                scenario: name.to_string(),
                index: i + 1,
                description: step.describe(),
            });

            tracker.start_step(i);
            let outcome = dispatcher.dispatch(step).await;
            let timing = tracker.stop_step(i).cloned().unwrap_or_default();

            if let Err(e) = outcome {
                let error = format!("{:#}", e);
                log::error!("  >> STEP {} FAILED: {}", i + 1, error);
                self.emitter.emit(TestEvent::StepFailed {
                    scenario: name.to_string(),
                    index: i + 1,
                    error: error.clone(),
                    duration_ms: timing.duration_ms,
                });

                let diagnostics = self
                    .diagnostics
                    .collect(self.collaborators.driver.as_ref(), name, i)
                    .await;
                self.emitter.emit(TestEvent::Log {
                    message: format!(
                        "diagnostics: {} screenshot(s), network {}, cpu {}, ram {}",
                        diagnostics.screenshots.len(),
                        if diagnostics.network_available { "up" } else { "down" },
                        diagnostics.cpu_usage,
                        diagnostics.ram_usage
                    ),
                });
                let performance = tracker.finalize();
                let result = ScenarioResult::failed(
                    name,
                    i + 1,
                    step.describe(),
                    error,
                    diagnostics,
                    performance,
                );
                self.finished(&result);
                return result;
            }

            self.emitter.emit(TestEvent::StepPassed {
                scenario: name.to_string(),
                index: i + 1,
                duration_ms: timing.duration_ms,
                regression: timing.regression,
            });
        }

        let result = ScenarioResult::passed(name, steps.len(), tracker.finalize());
        log::info!("--- Successfully completed scenario: '{}' ---", name);
        self.finished(&result);
        result
    }

    fn finished(&self, result: &ScenarioResult) {
        self.emitter.emit(TestEvent::ScenarioFinished {
            name: result.name.clone(),
            status: result.status,
            has_regression: result.has_regression(),
            duration_ms: result
                .performance
                .as_ref()
                .map(|p| p.total_duration_ms)
                .unwrap_or_default(),
        });
    }
}
