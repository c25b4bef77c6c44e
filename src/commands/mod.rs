//! Command dispatcher: structured instruction payloads to suite operations
//!
//! Every outcome, including malformed input and unknown commands, is a
//! [`CommandResponse`]. Nothing here returns an error to the caller.

pub mod record;
pub mod status;
pub mod watcher;

use crate::parser::Step;
use crate::report::types::ExecutionReport;
use crate::runner::SuiteRunner;
use crate::store::{PerformanceBaselines, VisualBaselines};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub use status::StatusReport;

/// `{command, params}` as read from an instruction file or the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Instruction {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub params: Value,
}

impl Instruction {
    pub fn new(command: impl Into<String>, params: Value) -> Self {
        Self {
            command: command.into(),
            params,
        }
    }

    /// Non-empty string parameter
    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CommandResponse {
    /// Suite commands answer with the report they produced
    Report(ExecutionReport),
    Outcome(CommandOutcome),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    fn completed(message: impl Into<String>) -> Self {
        Self::Outcome(CommandOutcome {
            status: OutcomeStatus::Completed,
            command: None,
            message: message.into(),
            data: None,
        })
    }

    fn error(message: impl Into<String>) -> Self {
        Self::Outcome(CommandOutcome {
            status: OutcomeStatus::Error,
            command: None,
            message: message.into(),
            data: None,
        })
    }

    /// Whether the command did what it was asked. A report counts as success
    /// even when tests inside it failed.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Report(_) => true,
            Self::Outcome(outcome) => outcome.status == OutcomeStatus::Completed,
        }
    }
}

pub struct CommandDispatcher {
    runner: SuiteRunner,
}

impl CommandDispatcher {
    pub fn new(runner: SuiteRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &SuiteRunner {
        &self.runner
    }

    pub async fn dispatch(&self, instruction: &Instruction) -> CommandResponse {
        log::info!(
            "Executing '{}' with params: {}",
            instruction.command,
            instruction.params
        );

        match instruction.command.as_str() {
            "run_tests" => self.run_tests(instruction).await,
            "run_tests_with_data" => self.run_tests_with_data(instruction).await,
            "create_scenario" => self.create_scenario(instruction),
            "update_baseline" | "delete_visual_baseline" => self.delete_visual_baseline(instruction),
            "delete_performance_baseline" | "create_performance_baseline" => {
                self.delete_performance_baseline(instruction)
            }
            "get_status" => self.get_status(),
            other => {
                log::error!("Unknown command received: {}", other);
                CommandResponse::Outcome(CommandOutcome {
                    status: OutcomeStatus::Error,
                    command: Some(other.to_string()),
                    message: "Unknown command.".to_string(),
                    data: None,
                })
            }
        }
    }

    async fn run_tests(&self, instruction: &Instruction) -> CommandResponse {
        let names: Vec<String> = match instruction.params.get("scenarios") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(name)) => vec![name.clone()],
            _ => vec!["all".to_string()],
        };

        match self.runner.run_suite(Some(names.as_slice())).await {
            Ok(report) => CommandResponse::Report(report),
            Err(e) => {
                log::error!("Suite run failed: {:#}", e);
                CommandResponse::error(format!("{:#}", e))
            }
        }
    }

    async fn run_tests_with_data(&self, instruction: &Instruction) -> CommandResponse {
        let (Some(scenario), Some(data_file)) = (
            instruction.param("scenario_name"),
            instruction.param("data_file"),
        ) else {
            return CommandResponse::error("Missing 'scenario_name' or 'data_file'.");
        };

        match self.runner.run_data_driven(scenario, Path::new(data_file)).await {
            Ok(report) => CommandResponse::Report(report),
            Err(e) => {
                log::error!("Data-driven run failed: {:#}", e);
                CommandResponse::error(format!("{:#}", e))
            }
        }
    }

    fn create_scenario(&self, instruction: &Instruction) -> CommandResponse {
        let steps = instruction
            .params
            .get("steps")
            .filter(|v| v.as_array().map_or(false, |a| !a.is_empty()));
        let (Some(name), Some(steps)) = (instruction.param("name"), steps) else {
            return CommandResponse::error("Missing 'name' or 'steps'.");
        };

        let steps: Vec<Step> = match serde_json::from_value(steps.clone()) {
            Ok(steps) => steps,
            Err(e) => return CommandResponse::error(format!("Invalid 'steps': {}", e)),
        };

        match self.runner.scenarios().upsert(name, steps) {
            Ok(()) => CommandResponse::completed(format!("Scenario '{}' processed.", name)),
            Err(e) => {
                log::error!("Failed to save scenario '{}': {:#}", name, e);
                CommandResponse::error(format!("Scenario '{}' could not be saved: {:#}", name, e))
            }
        }
    }

    fn delete_visual_baseline(&self, instruction: &Instruction) -> CommandResponse {
        let Some(name) = instruction.param("visual_test_name") else {
            return CommandResponse::error("Missing 'visual_test_name'.");
        };

        let baselines = VisualBaselines::new(self.runner.config().visual_baselines_dir());
        match baselines.delete(name) {
            Ok(()) => CommandResponse::completed(format!("Baseline '{}' processed.", name)),
            Err(e) => {
                log::error!("Failed to delete visual baseline '{}': {:#}", name, e);
                CommandResponse::error(format!("Baseline '{}' could not be deleted: {:#}", name, e))
            }
        }
    }

    /// The next run of the scenario records a fresh baseline
    fn delete_performance_baseline(&self, instruction: &Instruction) -> CommandResponse {
        let Some(name) = instruction.param("scenario_name") else {
            return CommandResponse::error("Missing 'scenario_name'.");
        };

        let baselines = PerformanceBaselines::new(self.runner.config().performance_baselines_dir());
        match baselines.delete(name) {
            Ok(()) => CommandResponse::completed(format!(
                "Performance baseline for '{}' reset; the next run records a new one.",
                name
            )),
            Err(e) => {
                log::error!("Failed to delete performance baseline '{}': {:#}", name, e);
                CommandResponse::error(format!(
                    "Performance baseline for '{}' could not be deleted: {:#}",
                    name, e
                ))
            }
        }
    }

    fn get_status(&self) -> CommandResponse {
        let status = StatusReport::gather(self.runner.config());
        match serde_json::to_value(&status) {
            Ok(data) => CommandResponse::Outcome(CommandOutcome {
                status: OutcomeStatus::Completed,
                command: None,
                message: "Status gathered.".to_string(),
                data: Some(data),
            }),
            Err(e) => CommandResponse::error(format!("Failed to get status: {}", e)),
        }
    }
}
