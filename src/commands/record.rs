//! Interactive scenario recording: one `action target [timeout]` line per step

use crate::parser::{Action, Step};
use crate::store::ScenarioStore;
use anyhow::{bail, Result};
use colored::Colorize;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Saved { steps: usize },
    /// The name exists and overwriting was declined
    Declined,
    /// `done` before any step; nothing written
    Empty,
}

/// Parse one recorded line. Blank lines yield `None`.
///
/// `wait-for-*` actions take the last word as their timeout; the target of
/// every action is the remaining text with surrounding quotes removed.
pub fn parse_step_line(line: &str) -> Result<Option<Step>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((action, rest)) = parts.split_first() else {
        return Ok(None);
    };
    let action = Action::from(*action);

    if action.uses_timeout() {
        let Some((timeout, target)) = rest.split_last() else {
            bail!("Invalid command format. Usage: {} \"target\" <seconds>", action);
        };
        let secs: f64 = match timeout.parse() {
            Ok(secs) if secs >= 0.0 => secs,
            _ => bail!("Invalid timeout '{}'", timeout),
        };
        return Ok(Some(Step::new(action, unquote(&target.join(" "))).with_timeout(secs)));
    }

    Ok(Some(Step::new(action, unquote(&rest.join(" ")))))
}

fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// Record a scenario from `input` until `done` or end of input.
///
/// An existing scenario is only replaced when `force` is set or the user
/// answers `y` to the overwrite prompt.
pub fn record<R: BufRead, W: Write>(
    store: &ScenarioStore,
    name: &str,
    force: bool,
    mut input: R,
    mut out: W,
) -> Result<RecordOutcome> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Scenario name cannot be empty.");
    }
    log::info!("Starting new scenario recording '{}'.", name);

    let mut line = String::new();
    if !force && store.load()?.contains_key(name) {
        write!(out, "Scenario '{}' already exists. Overwrite? (y/n): ", name)?;
        out.flush()?;
        input.read_line(&mut line)?;
        if !line.trim().eq_ignore_ascii_case("y") {
            log::error!("User chose not to overwrite '{}'.", name);
            return Ok(RecordOutcome::Declined);
        }
    }

    let names: Vec<&str> = Action::ALL.iter().map(|a| a.name()).collect();
    writeln!(out, "\n{}", "--- Add steps to your scenario ---".bold())?;
    writeln!(out, "Actions: {}", names.join(", "))?;
    writeln!(out, "Usage: action \"target\" OR wait-for-* \"target\" <seconds>")?;
    writeln!(out, "Type 'done' when you are finished.")?;

    let mut steps = Vec::new();
    loop {
        write!(out, "Step {}: ", steps.len() + 1)?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let entry = line.trim();
        if entry.eq_ignore_ascii_case("done") {
            break;
        }

        match parse_step_line(entry) {
            Ok(Some(step)) => {
                if let Action::Unknown(action) = &step.action {
                    writeln!(out, "  {} unknown action '{}', it will fail when run", "⚠".yellow(), action)?;
                }
                writeln!(out, "  -> Step added: {}", step.describe())?;
                steps.push(step);
            }
            Ok(None) => {}
            Err(e) => writeln!(out, "  {} {}", "✗".red(), e)?,
        }
    }

    if steps.is_empty() {
        writeln!(out, "No steps recorded; '{}' not saved.", name)?;
        return Ok(RecordOutcome::Empty);
    }

    let count = steps.len();
    store.upsert(name, steps)?;
    writeln!(out, "\nScenario '{}' saved!", name)?;
    Ok(RecordOutcome::Saved { steps: count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Timeout;
    use std::io::Cursor;

    fn store(dir: &tempfile::TempDir) -> ScenarioStore {
        ScenarioStore::new(dir.path().join("scenarios.json"))
    }

    #[test]
    fn test_parse_step_line() {
        let step = parse_step_line("find-text \"Save As\"").unwrap().unwrap();
        assert_eq!(step, Step::new("find-text", "Save As"));

        let step = parse_step_line("wait-for-text 'Ready now' 5").unwrap().unwrap();
        assert_eq!(step.target, "Ready now");
        assert_eq!(step.timeout, Some(Timeout::Seconds(5.0)));

        assert!(parse_step_line("   ").unwrap().is_none());
        assert!(parse_step_line("wait-for-image").is_err());
        assert!(parse_step_line("wait-for-image logo soon").is_err());
    }

    #[test]
    fn test_record_until_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let input = Cursor::new("type user1\n\nwait-for-text Welcome 3\nwait-for-image\ndone\ntype ignored\n");
        let mut out = Vec::new();

        let outcome = record(&store, "login", false, input, &mut out).unwrap();

        assert_eq!(outcome, RecordOutcome::Saved { steps: 2 });
        let steps = store.get("login").unwrap();
        assert_eq!(steps[0], Step::new("type", "user1"));
        assert_eq!(steps[1], Step::new("wait-for-text", "Welcome").with_timeout(3.0));
        assert!(String::from_utf8(out).unwrap().contains("Invalid command format"));
    }

    #[test]
    fn test_existing_scenario_needs_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.upsert("login", vec![Step::new("type", "old")]).unwrap();

        let outcome = record(&store, "login", false, Cursor::new("n\ntype new\ndone\n"), Vec::new())
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Declined);
        assert_eq!(store.get("login").unwrap()[0].target, "old");

        record(&store, "login", false, Cursor::new("y\ntype new\ndone\n"), Vec::new()).unwrap();
        assert_eq!(store.get("login").unwrap()[0].target, "new");

        record(&store, "login", true, Cursor::new("type forced\n"), Vec::new()).unwrap();
        assert_eq!(store.get("login").unwrap()[0].target, "forced");
    }

    #[test]
    fn test_nothing_recorded_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let outcome = record(&store, "empty", false, Cursor::new("done\n"), Vec::new()).unwrap();
        assert_eq!(outcome, RecordOutcome::Empty);
        assert!(store.load().unwrap().is_empty());
    }
}
