use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use desktop_harness::commands::record::{self, RecordOutcome};
use desktop_harness::commands::{watcher, CommandDispatcher, StatusReport};
use desktop_harness::parser::{Step, Timeout};
use desktop_harness::report::{self, junit, TrendReport};
use desktop_harness::runner::{Collaborators, ConsoleEventListener, SuiteRunner};
use desktop_harness::store::KnowledgeBase;
use desktop_harness::utils::{config::Config, logger};

#[derive(Parser)]
#[command(name = "desktop-harness")]
#[command(version)]
#[command(about = "Desktop GUI test automation with self-healing locators", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single action, e.g. `action wait-for-text Ready 5`
    Action {
        /// Action name (find-image, type, wait-for-text, ...)
        name: String,

        /// Target: object name, text, path or seconds
        arg: String,

        /// Timeout for wait-for-* actions
        arg2: Option<String>,
    },

    /// Run one stored scenario and print its result
    RunScenario { name: String },

    /// Known images, scenarios and the recent log
    Status,

    /// Run scenarios and write the execution report
    Suite {
        /// Scenario names (comma-separated); all when omitted
        #[arg(short, long, value_delimiter = ',')]
        scenarios: Option<Vec<String>>,
    },

    /// Replay a scenario once per CSV row
    DataSuite { scenario: String, data_file: PathBuf },

    /// Execute one instruction payload file and print the response
    Dispatch { payload: PathBuf },

    /// Poll the instructions file until Ctrl+C
    Watch,

    /// Run the full suite periodically until Ctrl+C
    Schedule {
        /// Seconds between runs
        #[arg(short, long, default_value = "3600")]
        interval: u64,
    },

    /// Capture a screen region and store it in the knowledge base
    Learn {
        name: String,

        /// x,y,width,height
        #[arg(long, value_parser = parse_region)]
        region: Region,

        /// Replace an existing object with the same name
        #[arg(long)]
        force: bool,
    },

    /// Record a scenario step by step from stdin
    Record {
        name: String,

        /// Replace an existing scenario without asking
        #[arg(long)]
        force: bool,
    },

    /// List stored scenarios
    Scenarios,

    /// Failure and performance trends over archived reports
    Trends,

    /// Export the current execution report
    Report {
        #[command(subcommand)]
        format: ReportFormat,
    },
}

#[derive(Subcommand)]
enum ReportFormat {
    /// JUnit XML
    Junit {
        /// Output file (defaults to <reports_dir>/junit.xml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Region {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn parse_region(value: &str) -> Result<Region, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid region '{}': {}", value, e))?;
    match parts.as_slice() {
        [x, y, width, height] if *width > 0 && *height > 0 => Ok(Region {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => Err(format!("region must be x,y,width,height, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    if let Err(e) = logger::init(&config.log_file) {
        eprintln!("{} logging to {} disabled: {:#}", "⚠".yellow(), config.log_file.display(), e);
    }

    let success = run(cli.command, config).await?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs a command with the console listener attached; `false` maps to exit 1
async fn run(command: Commands, config: Config) -> anyhow::Result<bool> {
    let runner = SuiteRunner::new(config.clone(), Collaborators::detect(&config));
    let listener = tokio::spawn(ConsoleEventListener::listen(runner.subscribe()));
    let dispatcher = CommandDispatcher::new(runner);

    let result = execute(command, &config, &dispatcher).await;

    // Closing the channel lets the listener drain and exit
    drop(dispatcher);
    let _ = tokio::time::timeout(Duration::from_secs(2), listener).await;
    result
}

async fn execute(
    command: Commands,
    config: &Config,
    dispatcher: &CommandDispatcher,
) -> anyhow::Result<bool> {
    let runner = dispatcher.runner();

    match command {
        Commands::Action { name, arg, arg2 } => {
            let mut step = Step::new(name.as_str(), arg);
            step.timeout = arg2.map(Timeout::Text);
            match runner.run_single_action(&step).await {
                Ok(()) => {
                    println!("{} {}", "✓".green(), step.describe());
                    Ok(true)
                }
                Err(e) => {
                    println!("{} {}: {:#}", "✗".red(), step.describe(), e);
                    Ok(false)
                }
            }
        }

        Commands::RunScenario { name } => {
            let result = runner.run_named(&name).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.is_passed())
        }

        Commands::Status => {
            print!("{}", StatusReport::gather(config));
            Ok(true)
        }

        Commands::Suite { scenarios } => {
            let report = runner.run_suite(scenarios.as_deref()).await?;
            println!(
                "{} Report written to {}",
                "📊".to_string().blue(),
                config.report_file.display()
            );
            Ok(report.summary.failed == 0)
        }

        Commands::DataSuite {
            scenario,
            data_file,
        } => {
            let report = runner.run_data_driven(&scenario, &data_file).await?;
            Ok(report.summary.failed == 0)
        }

        Commands::Dispatch { payload } => {
            let instruction = watcher::read_instruction(&payload)?
                .ok_or_else(|| anyhow::anyhow!("{} is empty", payload.display()))?;
            let response = dispatcher.dispatch(&instruction).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(response.is_success())
        }

        Commands::Watch => {
            let stop = stop_on_ctrl_c()?;
            watcher::watch(dispatcher, stop).await;
            Ok(true)
        }

        Commands::Schedule { interval } => {
            let stop = stop_on_ctrl_c()?;
            let interval = Duration::from_secs(interval.max(1));
            log::info!("Scheduler started: full suite every {}s", interval.as_secs());
            while !stop.load(Ordering::SeqCst) {
                if let Err(e) = runner.run_suite(None).await {
                    log::error!("Scheduled run failed: {:#}", e);
                }
                let started = std::time::Instant::now();
                while started.elapsed() < interval && !stop.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
            log::info!("Scheduler stopped.");
            Ok(true)
        }

        Commands::Learn {
            name,
            region,
            force,
        } => {
            let image = runner
                .collaborators()
                .driver
                .capture_region(region.x, region.y, region.width, region.height)
                .await?;
            let kb = KnowledgeBase::new(config.knowledge_base_file(), config.images_dir());
            let path = kb.learn(&name, &image, force)?;
            println!("{} Learned '{}' → {}", "✓".green(), name, path.display());
            Ok(true)
        }

        Commands::Record { name, force } => {
            let stdin = std::io::stdin();
            let outcome = record::record(
                runner.scenarios(),
                &name,
                force,
                stdin.lock(),
                std::io::stdout(),
            )?;
            Ok(outcome != RecordOutcome::Declined)
        }

        Commands::Scenarios => {
            let scenarios = runner.scenarios().load()?;
            if scenarios.is_empty() {
                println!("No scenarios stored.");
            }
            for (name, steps) in &scenarios {
                println!("{} ({} steps)", name.bold(), steps.len());
                for (i, step) in steps.iter().enumerate() {
                    println!("  {}. {}", i + 1, step.describe());
                }
            }
            Ok(true)
        }

        Commands::Trends => {
            let trends: TrendReport = report::analyze(runner.reports());
            println!("{}", serde_json::to_string_pretty(&trends)?);
            Ok(true)
        }

        Commands::Report {
            format: ReportFormat::Junit { output },
        } => {
            let current = runner.reports().load_current()?.ok_or_else(|| {
                anyhow::anyhow!("No execution report at {}", config.report_file.display())
            })?;
            let output = output.unwrap_or_else(|| config.reports_dir.join("junit.xml"));
            junit::write_report(&current, &output)?;
            println!("{} JUnit report: {}", "📊".to_string().blue(), output.display());
            Ok(true)
        }
    }
}

fn stop_on_ctrl_c() -> anyhow::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = stop.clone();
    ctrlc::set_handler(move || {
        println!("\n{} Stopping after the current run...", "⏹".yellow());
        handler_flag.store(true, Ordering::SeqCst);
    })?;
    Ok(stop)
}
