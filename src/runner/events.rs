use super::state::ScenarioStatus;
use crate::report::types::ReportSummary;
use tokio::sync::broadcast;

/// Execution events for real-time console output
#[derive(Debug, Clone)]
pub enum TestEvent {
    SuiteStarted {
        scenario_count: usize,
    },
    SuiteFinished {
        summary: ReportSummary,
    },

    ScenarioStarted {
        name: String,
        step_count: usize,
    },
    ScenarioFinished {
        name: String,
        status: ScenarioStatus,
        has_regression: bool,
        duration_ms: f64,
    },

    StepStarted {
        scenario: String,
        /// 1-based
        index: usize,
        description: String,
    },
    StepPassed {
        scenario: String,
        index: usize,
        duration_ms: f64,
        regression: bool,
    },
    StepFailed {
        scenario: String,
        index: usize,
        error: String,
        duration_ms: f64,
    },

    Log {
        message: String,
    },
}

/// Event emitter for broadcasting test events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    /// Nobody listening is fine
    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let interactive = std::io::stdout().is_terminal();
        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::SuiteStarted { scenario_count } => {
                    println!(
                        "\n{} Suite started: {} scenario(s)",
                        "▶".green().bold(),
                        scenario_count
                    );
                }

                TestEvent::SuiteFinished { summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Suite finished", "■".blue().bold());
                    println!(
                        "  {} passed, {} failed of {} ({}%)",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.total,
                        summary.success_rate
                    );
                }

                TestEvent::ScenarioStarted { name, step_count } => {
                    println!(
                        "\n  {} Scenario: {} ({} steps)",
                        "→".blue(),
                        name.white().bold(),
                        step_count
                    );
                }

                TestEvent::ScenarioFinished {
                    name,
                    status,
                    has_regression,
                    duration_ms,
                } => {
                    let status_str = match status {
                        ScenarioStatus::Passed => "PASSED".green().bold(),
                        ScenarioStatus::Failed => "FAILED".red().bold(),
                        ScenarioStatus::Error => "ERROR".yellow().bold(),
                    };
                    println!("  {} {} [{}] {:.0}ms", "←".blue(), name, status_str, duration_ms);
                    if has_regression {
                        println!("    {}", "PERFORMANCE REGRESSION DETECTED".yellow());
                    }
                }

                TestEvent::StepStarted {
                    index, description, ..
                } => {
                    step_text = format!("[{}] {}... ", index, description.dimmed());
                    let pb = if interactive {
                        ProgressBar::new_spinner()
                    } else {
                        ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
                    };
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("      {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    pb.set_message(step_text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                TestEvent::StepPassed {
                    duration_ms,
                    regression,
                    ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let slow = if regression {
                        format!(" {}", "slow".yellow())
                    } else {
                        String::new()
                    };
                    println!("      {} {}({:.0}ms){}", "✓".green(), step_text, duration_ms, slow);
                }

                TestEvent::StepFailed {
                    error, duration_ms, ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("      {} {}({:.0}ms)", "✗".red(), step_text, duration_ms);
                    println!("        {}", error.red());
                }

                TestEvent::Log { message } => match &spinner {
                    Some(pb) => pb.println(format!("        {}", message)),
                    None => println!("        {}", message),
                },
            }
        }
    }
}
