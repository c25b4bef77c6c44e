//! Tabular data for data-driven suites

use super::types::{Step, Timeout};
use crate::error::HarnessError;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// One CSV row keyed by header
pub type DataRow = HashMap<String, String>;

/// Read every row of a CSV file with a header line
pub fn load_rows(path: &Path) -> Result<Vec<DataRow>> {
    if !path.is_file() {
        return Err(HarnessError::InvalidInput(format!(
            "Data file not found: {}",
            path.display()
        ))
        .into());
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open data file {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize().enumerate() {
        let row: DataRow =
            record.with_context(|| format!("Failed to parse CSV row {}", i + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("valid placeholder pattern"))
}

/// Replace `{column}` placeholders; unknown columns are left as written
pub fn substitute(text: &str, row: &DataRow) -> String {
    placeholder()
        .replace_all(text, |caps: &regex::Captures| match row.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Copy of `steps` with every string parameter substituted from `row`
pub fn substitute_steps(steps: &[Step], row: &DataRow) -> Vec<Step> {
    steps
        .iter()
        .map(|step| Step {
            action: step.action.clone(),
            target: substitute(&step.target, row),
            timeout: step.timeout.as_ref().map(|timeout| match timeout {
                Timeout::Text(text) => Timeout::Text(substitute(text, row)),
                other => other.clone(),
            }),
        })
        .collect()
}
