use super::types::ExecutionReport;
use crate::runner::state::{ScenarioResult, ScenarioStatus};
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(result: &ScenarioResult) -> f64 {
    result
        .performance
        .as_ref()
        .map(|p| p.total_duration_ms / 1000.0)
        .unwrap_or(0.0)
}

/// Render an execution report as JUnit XML
pub fn generate_junit_xml(report: &ExecutionReport) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let tests = report.tests.len().to_string();
    let failures = report
        .tests
        .iter()
        .filter(|t| t.status == ScenarioStatus::Failed)
        .count()
        .to_string();
    let errors = report
        .tests
        .iter()
        .filter(|t| t.status == ScenarioStatus::Error)
        .count()
        .to_string();
    let time = report.tests.iter().map(seconds).sum::<f64>().to_string();

    let mut suites = BytesStart::new("testsuites");
    suites.push_attribute(("name", "desktop-harness-run"));
    suites.push_attribute(("tests", tests.as_str()));
    suites.push_attribute(("failures", failures.as_str()));
    suites.push_attribute(("errors", errors.as_str()));
    suites.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites))?;

    let mut suite = BytesStart::new("testsuite");
    suite.push_attribute(("name", "scenarios"));
    suite.push_attribute(("tests", tests.as_str()));
    suite.push_attribute(("failures", failures.as_str()));
    suite.push_attribute(("errors", errors.as_str()));
    suite.push_attribute(("time", time.as_str()));
    suite.push_attribute(("timestamp", report.timestamp.as_str()));
    writer.write_event(Event::Start(suite))?;

    for result in &report.tests {
        write_test_case(&mut writer, result)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_test_case<W: std::io::Write>(writer: &mut Writer<W>, result: &ScenarioResult) -> Result<()> {
    let mut case = BytesStart::new("testcase");
    case.push_attribute(("name", result.name.as_str()));
    case.push_attribute(("classname", "scenarios"));
    case.push_attribute(("time", seconds(result).to_string().as_str()));
    writer.write_event(Event::Start(case))?;

    let message = result.error.as_deref().unwrap_or("Unknown error");
    match result.status {
        ScenarioStatus::Passed => {}
        ScenarioStatus::Failed => {
            let mut failure = BytesStart::new("failure");
            failure.push_attribute(("message", message));
            failure.push_attribute(("type", "StepFailure"));
            writer.write_event(Event::Start(failure))?;

            let mut body = String::new();
            if let (Some(step), Some(description)) = (result.failed_step, &result.step_description) {
                body.push_str(&format!("Step {}: {}\n", step, description));
            }
            if let Some(diagnostics) = &result.diagnostics {
                body.push_str(&format!(
                    "CPU: {}, RAM: {}, Network: {}\n",
                    diagnostics.cpu_usage,
                    diagnostics.ram_usage,
                    if diagnostics.network_available { "OK" } else { "FAIL" }
                ));
            }
            body.push_str(message);
            writer.write_event(Event::Text(BytesText::new(&body)))?;
            writer.write_event(Event::End(BytesEnd::new("failure")))?;
        }
        ScenarioStatus::Error => {
            let mut error = BytesStart::new("error");
            error.push_attribute(("message", message));
            writer.write_event(Event::Empty(error))?;
        }
    }

    if result.has_regression() {
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new("PERFORMANCE REGRESSION DETECTED")))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

pub fn write_report(report: &ExecutionReport, path: &Path) -> Result<()> {
    let xml = generate_junit_xml(report)?;
    std::fs::write(path, xml).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Generated JUnit report: {}", path.display());
    Ok(())
}
