//! Instruction-file polling loop

use super::{CommandDispatcher, CommandResponse, Instruction};
use crate::error::HarnessError;
use crate::store::{remove_if_exists, write_json};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Read a pending instruction. A missing or blank file yields `None`.
pub fn read_instruction(path: &Path) -> Result<Option<Instruction>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HarnessError::persistence(path, e).into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    let instruction = serde_json::from_str(&content)
        .with_context(|| format!("Invalid instruction file {}", path.display()))?;
    Ok(Some(instruction))
}

/// Handle the pending instruction file, if any.
///
/// The response is written to the last-response file and the instruction file
/// is removed, malformed ones included.
pub async fn poll_once(dispatcher: &CommandDispatcher) -> Result<Option<CommandResponse>> {
    let config = dispatcher.runner().config();
    let path = &config.instructions_file;
    if !path.exists() {
        return Ok(None);
    }
    log::info!("Found instructions file.");

    let response = match read_instruction(path) {
        Ok(Some(instruction)) => dispatcher.dispatch(&instruction).await,
        Ok(None) => {
            remove_if_exists(path)?;
            return Ok(None);
        }
        Err(e) => {
            log::error!("{:#}", e);
            CommandResponse::error(format!("{:#}", e))
        }
    };

    let response_file = config.last_response_file();
    write_json(&response_file, &response)?;
    log::info!("Response written to {}", response_file.display());

    if remove_if_exists(path)? {
        log::info!("Instructions file cleaned up.");
    }
    Ok(Some(response))
}

/// Poll until `stop` is raised. A failed poll is logged and the loop goes on.
pub async fn watch(dispatcher: &CommandDispatcher, stop: Arc<AtomicBool>) {
    let config = dispatcher.runner().config();
    let interval = Duration::from_secs(config.watch_interval_secs.max(1));
    log::info!(
        "Command interface v{} started. Watching {} for instructions...",
        env!("CARGO_PKG_VERSION"),
        config.instructions_file.display()
    );

    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = poll_once(dispatcher).await {
            log::error!("Instruction poll failed: {:#}", e);
        }
        sleep_unless_stopped(interval, &stop).await;
    }
    log::info!("Instruction watcher stopped.");
}

async fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let step = Duration::from_millis(200);
    let mut waited = Duration::ZERO;
    while waited < total && !stop.load(Ordering::SeqCst) {
        tokio::time::sleep(step).await;
        waited += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::OutcomeStatus;
    use crate::driver::testing::MockDriver;
    use crate::runner::tests::{mock_collaborators, test_config};
    use crate::runner::SuiteRunner;

    fn dispatcher(root: &Path) -> CommandDispatcher {
        let driver = Arc::new(MockDriver::new(16, 16));
        CommandDispatcher::new(SuiteRunner::new(test_config(root), mock_collaborators(driver)))
    }

    #[test]
    fn test_read_instruction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instructions.json");
        assert!(read_instruction(&path).unwrap().is_none());

        std::fs::write(&path, "  ").unwrap();
        assert!(read_instruction(&path).unwrap().is_none());

        std::fs::write(&path, r#"{"command": "get_status"}"#).unwrap();
        let instruction = read_instruction(&path).unwrap().unwrap();
        assert_eq!(instruction.command, "get_status");
        assert!(instruction.params.is_null());
    }

    #[tokio::test]
    async fn test_poll_dispatches_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path());
        let config = dispatcher.runner().config().clone();

        assert!(poll_once(&dispatcher).await.unwrap().is_none());

        std::fs::write(
            &config.instructions_file,
            r#"{"command": "create_scenario", "params": {"name": "smoke", "steps": [{"action": "wait", "target": "0"}]}}"#,
        )
        .unwrap();
        let response = poll_once(&dispatcher).await.unwrap().unwrap();

        assert!(response.is_success());
        assert!(!config.instructions_file.exists());
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(config.last_response_file()).unwrap())
                .unwrap();
        assert_eq!(written["message"], "Scenario 'smoke' processed.");
    }

    #[tokio::test]
    async fn test_malformed_instruction_is_answered_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path());
        let config = dispatcher.runner().config().clone();
        std::fs::write(&config.instructions_file, "{not json").unwrap();

        let response = poll_once(&dispatcher).await.unwrap().unwrap();

        let CommandResponse::Outcome(outcome) = response else {
            panic!("expected an outcome");
        };
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.message.contains("Invalid instruction file"));
        assert!(!config.instructions_file.exists());
    }

    #[tokio::test]
    async fn test_watch_stops_when_flag_is_raised() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path());
        let stop = Arc::new(AtomicBool::new(true));
        tokio::time::timeout(Duration::from_secs(2), watch(&dispatcher, stop))
            .await
            .unwrap();
    }
}
