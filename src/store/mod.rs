//! Flat-file persistence
//!
//! Every store is a JSON document (or a directory of them) that is read whole
//! and replaced whole. Writes go through a sibling temp file and a rename so
//! a crash never leaves a half-written document behind.

pub mod baselines;
pub mod knowledge_base;
pub mod lock;
pub mod reports;
pub mod scenarios;

use crate::error::HarnessError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub use baselines::{PerformanceBaseline, PerformanceBaselines, VisualBaselines};
pub use knowledge_base::KnowledgeBase;
pub use lock::RunGuard;
pub use reports::ReportStore;
pub use scenarios::ScenarioStore;

/// Read a JSON document, treating a missing or empty file as the default value
pub(crate) fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(HarnessError::persistence(path, e).into()),
    };
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Replace a JSON document atomically (pretty-printed)
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HarnessError::persistence(parent, e))?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let temp = path.with_extension("json.tmp");
    std::fs::write(&temp, json).map_err(|e| HarnessError::persistence(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| HarnessError::persistence(path, e))?;
    Ok(())
}

/// Remove a file; a file that is already gone counts as removed
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HarnessError::persistence(path, e).into()),
    }
}
